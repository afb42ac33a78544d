//! Hardware abstraction for the timer that clocks the transceiver.
//!
//! The driver core never touches registers; everything it needs from the
//! platform is collected in the [CaptureCompareTimer] trait. A port
//! implements the trait for a concrete free-running 16-bit timer with one
//! input-capture unit (wired to the RX pin) and two output-compare units,
//! where compare A drives the TX pin.

/// Timer input clock prescaler.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescale {
    Div1,
    Div8,
}

/// Edge polarity the input-capture unit is armed for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureEdge {
    Rising,
    Falling,
}

/// Pin effect of a compare-A match.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompareAction {
    /// Drive the TX pin high on match.
    Set,
    /// Drive the TX pin low on match.
    Clear,
    /// Leave the TX pin alone on match.
    None,
}

/// A free-running 16-bit timer with an input-capture unit and two
/// output-compare units.
///
/// The transceiver owns the timer exclusively between construction and
/// [crate::SoftUart::stop]. Implementations must arrange for edges on the
/// RX pin to latch the running counter into the capture register in
/// hardware, and for compare-A matches to act on the TX pin in hardware;
/// the interrupt handlers only bookkeep state between those events.
pub trait CaptureCompareTimer {
    /// Run the counter freely from the input clock divided by `prescale`.
    fn configure(&mut self, prescale: Prescale);

    /// Configure the RX pin as an input with its pull-up enabled.
    fn configure_rx_pin(&mut self);

    /// Configure the TX pin as an output driven high, the idle line level.
    fn configure_tx_pin(&mut self);

    fn enable_capture_interrupt(&mut self);
    fn disable_capture_interrupt(&mut self);
    fn enable_compare_a_interrupt(&mut self);
    fn disable_compare_a_interrupt(&mut self);
    fn enable_compare_b_interrupt(&mut self);
    fn disable_compare_b_interrupt(&mut self);

    /// Select which RX pin edge latches the counter into the capture
    /// register.
    fn set_capture_edge(&mut self, edge: CaptureEdge);

    /// Select the pin effect of the next compare-A match.
    fn set_compare_a_action(&mut self, action: CompareAction);

    /// Program the compare-A comparand.
    fn set_compare_a(&mut self, tick: u16);

    /// Read back the compare-A comparand.
    fn compare_a(&self) -> u16;

    /// Program the compare-B comparand.
    fn set_compare_b(&mut self, tick: u16);

    /// Read the free-running counter.
    fn counter(&self) -> u16;

    /// Read the capture register latched by the most recent armed edge.
    fn capture(&self) -> u16;
}
