//! Time units used by the configuration API.

pub type Hertz = fugit::HertzU32;
