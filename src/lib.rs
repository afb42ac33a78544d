//! Software UART driven by a 16-bit timer's input-capture and
//! output-compare hardware.
//!
//! Reception latches a timestamp for every edge on the RX pin and
//! reconstructs frames by walking bit centers between captures;
//! transmission renders frames by chaining output-compare matches that
//! set or clear the TX pin at the right tick. Software only bookkeeps
//! state between interrupts, so the bit-timing jitter is bounded by the
//! platform's interrupt latency rather than by any polled delay loop.
//!
//! The hardware surface is the [CaptureCompareTimer] trait; a port
//! implements it for a concrete timer peripheral and the two UART pins.
//! [SoftUart] is the foreground half. The interrupt half are the
//! [on_capture_interrupt], [on_compare_a_interrupt] and
//! [on_compare_b_interrupt] free functions, which the user calls from the
//! platform's interrupt handlers with a second handle to the same timer.
//! The [asynch] module layers `embedded-io-async` streams on top.
//!
//! The timer peripheral is a shared singleton, and so is the transceiver:
//! constructing a second [SoftUart] while one is live fails with
//! [ConfigError::AlreadyInUse].
#![no_std]

pub mod asynch;
pub mod frame;
mod ring;
mod rx;
mod state;
pub mod time;
pub mod timer;
mod tx;
mod uart;

pub use asynch::AsyncSoftUart;
pub use frame::{DataBits, FrameConfig, Parity, Stopbits};
pub use rx::{on_capture_interrupt, on_compare_b_interrupt};
pub use state::{RX_BUFFER_SIZE, TX_BUFFER_SIZE};
pub use time::Hertz;
pub use timer::{CaptureCompareTimer, CaptureEdge, CompareAction, Prescale};
pub use tx::on_compare_a_interrupt;
pub use uart::{ConfigError, SoftUart};
