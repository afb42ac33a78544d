//! Foreground half of the transceiver.
//!
//! [SoftUart] owns the timer between construction and [SoftUart::stop].
//! Construction resolves the bit timing and frame format, parks the TX
//! pin high and arms the capture unit for a start edge; afterwards the
//! interrupt handlers in [crate::tx] and [crate::rx] run the wire and the
//! foreground only exchanges bytes with them through the rings.

use core::convert::Infallible;

use portable_atomic::Ordering;

use crate::frame::FrameConfig;
use crate::state::STATE;
use crate::time::Hertz;
use crate::timer::{CaptureCompareTimer, CaptureEdge, Prescale};
use crate::tx;

/// Upper bound (exclusive) on timer ticks per bit.
///
/// `ticks_per_bit * 37 / 4` must fit in 16 bits and a single bit period
/// must stay inside one timer wrap, otherwise the signed capture-target
/// comparisons in the receiver lose their meaning. At 16 MHz this works
/// out to a minimum of roughly 283 baud.
const MAX_TICKS_PER_BIT: u32 = 7085;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The requested bit period is not representable in timer ticks even
    /// with the /8 prescaler.
    #[error("bit period of {0} clock cycles is out of timer range")]
    BitPeriodOutOfRange(u32),
    /// Another instance already owns the timer.
    #[error("the transceiver is already in use")]
    AlreadyInUse,
}

/// Software UART transceiver on a capture/compare timer.
pub struct SoftUart<Timer: CaptureCompareTimer> {
    timer: Timer,
}

impl<Timer: CaptureCompareTimer> SoftUart<Timer> {
    /// Claim the timer, configure bit timing and frame format, and start
    /// the receiver.
    ///
    /// `bit_cycles` is the length of one bit on the wire counted in timer
    /// input clocks. Short periods run the timer unprescaled; longer ones
    /// fall back to the /8 prescaler, and periods out of range even then
    /// are rejected without touching any hardware.
    pub fn new(
        mut timer: Timer,
        bit_cycles: u32,
        frame: FrameConfig,
    ) -> Result<Self, ConfigError> {
        let mut ticks = bit_cycles;
        let prescale = if ticks < MAX_TICKS_PER_BIT {
            Prescale::Div1
        } else {
            ticks /= 8;
            if ticks < MAX_TICKS_PER_BIT {
                Prescale::Div8
            } else {
                return Err(ConfigError::BitPeriodOutOfRange(bit_cycles));
            }
        };
        if STATE.in_use.swap(true, Ordering::Acquire) {
            return Err(ConfigError::AlreadyInUse);
        }

        timer.configure(prescale);
        STATE.ticks_per_bit.store(ticks as u16, Ordering::Relaxed);
        STATE
            .rx_stop_ticks
            .store((ticks * 37 / 4) as u16, Ordering::Relaxed);
        STATE.store_bit_counts(frame.bit_counts());

        STATE.rx_state.store(0, Ordering::Relaxed);
        STATE.rx_byte.store(0, Ordering::Relaxed);
        STATE.rx_bit.store(0, Ordering::Relaxed);
        STATE.rx_parity.store(0, Ordering::Relaxed);
        STATE.rx_target.store(0, Ordering::Relaxed);
        STATE.rx_buffer.reset();
        STATE.tx_state.store(0, Ordering::Relaxed);
        STATE.tx_byte.store(0, Ordering::Relaxed);
        STATE.tx_bit.store(0, Ordering::Relaxed);
        STATE.tx_parity.store(0, Ordering::Relaxed);
        STATE.tx_buffer.reset();

        timer.configure_rx_pin();
        timer.configure_tx_pin();
        timer.set_capture_edge(CaptureEdge::Falling);
        timer.enable_capture_interrupt();
        Ok(SoftUart { timer })
    }

    /// Calls [Self::new] with the bit period computed from a reference
    /// clock and a baud rate.
    pub fn new_with_baudrate(
        timer: Timer,
        ref_clk: Hertz,
        baudrate: Hertz,
        frame: FrameConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(timer, ref_clk.raw() / baudrate.raw(), frame)
    }

    /// Queue one byte for transmission, spinning until the TX ring has
    /// room. Bytes appear on the wire in call order.
    pub fn write_byte(&mut self, byte: u8) {
        while self.try_write_byte(byte).is_err() {
            core::hint::spin_loop();
        }
    }

    /// Queue one byte for transmission without blocking.
    ///
    /// When the transmitter is idle this starts the frame directly and
    /// the byte never enters the ring; the critical section covers the
    /// check so a compare-A match cannot slip between the idle test and
    /// the kick.
    pub fn try_write_byte(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        critical_section::with(|_| {
            if STATE.tx_state.load(Ordering::Relaxed) != 0 {
                if STATE.tx_buffer.push(byte) {
                    Ok(())
                } else {
                    Err(nb::Error::WouldBlock)
                }
            } else {
                tx::start_byte(&mut self.timer, byte);
                Ok(())
            }
        })
    }

    /// Spin until the transmitter has gone idle.
    pub fn flush_output(&mut self) {
        while self.try_flush().is_err() {
            core::hint::spin_loop();
        }
    }

    /// Succeeds once the transmitter has gone idle.
    pub fn try_flush(&mut self) -> nb::Result<(), Infallible> {
        if STATE.tx_state.load(Ordering::Relaxed) != 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(())
    }

    /// Take the next received byte, or [nb::Error::WouldBlock] when the
    /// ring is empty.
    pub fn read(&mut self) -> nb::Result<u8, Infallible> {
        STATE.rx_buffer.pop().ok_or(nb::Error::WouldBlock)
    }

    /// Byte at the receive ring's tail slot without consuming anything,
    /// or [nb::Error::WouldBlock] when the ring is empty.
    pub fn peek(&mut self) -> nb::Result<u8, Infallible> {
        STATE.rx_buffer.peek().ok_or(nb::Error::WouldBlock)
    }

    /// Number of received bytes waiting in the ring.
    pub fn available(&self) -> u8 {
        STATE.rx_buffer.available()
    }

    /// Discard everything received but not yet read.
    pub fn flush_input(&mut self) {
        STATE.rx_buffer.drain();
    }

    /// Whether a handler has flagged a servicing delay. The flag is
    /// monotonic and currently never raised.
    pub fn timing_error(&self) -> bool {
        STATE.timing_error.load(Ordering::Relaxed)
    }

    /// Shut the transceiver down and hand the timer back.
    ///
    /// Disables the capture and both compare interrupts and discards
    /// unread input. A byte mid-transmission is cut off wherever its
    /// current bit happens to be.
    pub fn stop(mut self) -> Timer {
        self.timer.disable_compare_b_interrupt();
        self.timer.disable_capture_interrupt();
        STATE.rx_buffer.drain();
        self.timer.disable_compare_a_interrupt();
        STATE.in_use.store(false, Ordering::Release);
        self.timer
    }
}

impl<Timer: CaptureCompareTimer> embedded_io::ErrorType for SoftUart<Timer> {
    type Error = Infallible;
}

impl<Timer: CaptureCompareTimer> embedded_hal_nb::serial::ErrorType for SoftUart<Timer> {
    type Error = Infallible;
}

impl<Timer: CaptureCompareTimer> embedded_hal_nb::serial::Read<u8> for SoftUart<Timer> {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        SoftUart::read(self)
    }
}

impl<Timer: CaptureCompareTimer> embedded_hal_nb::serial::Write<u8> for SoftUart<Timer> {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.try_write_byte(word)
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        self.try_flush()
    }
}

impl<Timer: CaptureCompareTimer> embedded_io::Read for SoftUart<Timer> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        while STATE.rx_buffer.is_empty() {
            core::hint::spin_loop();
        }
        let mut read = 0;
        for byte in buf.iter_mut() {
            match STATE.rx_buffer.pop() {
                Some(b) => {
                    *byte = b;
                    read += 1;
                }
                None => break,
            }
        }
        Ok(read)
    }
}

impl<Timer: CaptureCompareTimer> embedded_io::Write for SoftUart<Timer> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write_byte(buf[0]);
        let mut written = 1;
        for &byte in &buf[1..] {
            match self.try_write_byte(byte) {
                Ok(()) => written += 1,
                Err(nb::Error::WouldBlock) => break,
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_output();
        Ok(())
    }
}
