//! Process-wide transceiver state shared between the foreground API and
//! the interrupt handlers.
//!
//! The timer peripheral is a singleton, so the state is one as well.
//! Every field crossing the interrupt boundary is an atomic; handoff of a
//! field between the two sides happens only at the explicit state
//! transitions described in [crate::tx] and [crate::rx].

use portable_atomic::{AtomicBool, AtomicU8, AtomicU16, Ordering};
use static_assertions::const_assert;

use crate::frame::BitCounts;
use crate::ring::Ring;

/// Slots in the receive ring. One slot is sacrificed, so up to 79 bytes
/// buffer between the capture interrupt and the foreground.
pub const RX_BUFFER_SIZE: usize = 80;
/// Slots in the transmit ring; holds up to 67 queued bytes plus the one
/// in flight.
pub const TX_BUFFER_SIZE: usize = 68;

// Ring indices are 8-bit.
const_assert!(RX_BUFFER_SIZE <= 255);
const_assert!(TX_BUFFER_SIZE <= 255);

pub(crate) struct SoftUartState {
    /// Construction guard; the timer is a shared singleton.
    pub in_use: AtomicBool,

    /// Ticks per bit cell; zero until configured.
    pub ticks_per_bit: AtomicU16,
    /// Offset from a start edge to the stop-bit fallback compare,
    /// `ticks_per_bit * 37 / 4`.
    pub rx_stop_ticks: AtomicU16,

    pub data_bits: AtomicU8,
    pub stop_bits: AtomicU8,
    pub parity: AtomicU8,
    pub total_bits: AtomicU8,
    pub almost_total_bits: AtomicU8,

    /// 0 = waiting for a start edge, otherwise the walk position within
    /// the frame.
    pub rx_state: AtomicU8,
    /// Shift register the frame is assembled in.
    pub rx_byte: AtomicU8,
    /// 0x00 or 0x80: the level held on the line since the last captured
    /// edge, pre-shifted to the bit the walk ORs in.
    pub rx_bit: AtomicU8,
    /// Snapshot of the level at the parity bit's center.
    pub rx_parity: AtomicU8,
    /// Tick of the next bit center.
    pub rx_target: AtomicU16,

    /// 0 = idle, 1..=data_bits = data bit pending, then parity, stop
    /// pending, stop in flight.
    pub tx_state: AtomicU8,
    pub tx_byte: AtomicU8,
    /// Current TX pin level as 0 or 1.
    pub tx_bit: AtomicU8,
    pub tx_parity: AtomicU8,

    /// Reserved: set once a handler detects that it serviced an event too
    /// late, never cleared.
    pub timing_error: AtomicBool,

    pub rx_buffer: Ring<RX_BUFFER_SIZE>,
    pub tx_buffer: Ring<TX_BUFFER_SIZE>,
}

impl SoftUartState {
    const fn new() -> Self {
        SoftUartState {
            in_use: AtomicBool::new(false),
            ticks_per_bit: AtomicU16::new(0),
            rx_stop_ticks: AtomicU16::new(0),
            data_bits: AtomicU8::new(0),
            stop_bits: AtomicU8::new(0),
            parity: AtomicU8::new(0),
            total_bits: AtomicU8::new(0),
            almost_total_bits: AtomicU8::new(0),
            rx_state: AtomicU8::new(0),
            rx_byte: AtomicU8::new(0),
            rx_bit: AtomicU8::new(0),
            rx_parity: AtomicU8::new(0),
            rx_target: AtomicU16::new(0),
            tx_state: AtomicU8::new(0),
            tx_byte: AtomicU8::new(0),
            tx_bit: AtomicU8::new(0),
            tx_parity: AtomicU8::new(0),
            timing_error: AtomicBool::new(false),
            rx_buffer: Ring::new(),
            tx_buffer: Ring::new(),
        }
    }

    /// Bit counts resolved at configuration time, reloaded for one
    /// interrupt invocation.
    pub fn bit_counts(&self) -> BitCounts {
        BitCounts {
            data_bits: self.data_bits.load(Ordering::Relaxed),
            parity: self.parity.load(Ordering::Relaxed),
            stop_bits: self.stop_bits.load(Ordering::Relaxed),
            total_bits: self.total_bits.load(Ordering::Relaxed),
            almost_total_bits: self.almost_total_bits.load(Ordering::Relaxed),
        }
    }

    pub fn store_bit_counts(&self, counts: BitCounts) {
        self.data_bits.store(counts.data_bits, Ordering::Relaxed);
        self.stop_bits.store(counts.stop_bits, Ordering::Relaxed);
        self.parity.store(counts.parity, Ordering::Relaxed);
        self.total_bits.store(counts.total_bits, Ordering::Relaxed);
        self.almost_total_bits
            .store(counts.almost_total_bits, Ordering::Relaxed);
    }
}

pub(crate) static STATE: SoftUartState = SoftUartState::new();
