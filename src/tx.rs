//! Transmit state machine, clocked by compare-A matches.
//!
//! A frame is rendered by chaining output-compare matches: each match
//! either flips the TX pin at a bit boundary or, when consecutive bits
//! share a polarity, the handler walks forward until it finds the next
//! transition and programs a single match for it. The number of compare
//! events per byte is therefore bounded by the number of level
//! transitions, not the number of bit cells.
//!
//! `tx_state` encodes the phase: 0 idle, `1..=data_bits` data bit pending,
//! `data_bits + 1` parity pending, `data_bits + 2` stop pending,
//! `data_bits + 3` stop bit(s) in flight.

use portable_atomic::Ordering;

use crate::frame::{PARITY_EVEN, PARITY_NONE, parity_even_bit};
use crate::state::STATE;
use crate::timer::{CaptureCompareTimer, CompareAction};

/// Ticks between the foreground kick and the start bit's falling edge.
const START_DELAY_TICKS: u16 = 16;

fn store_tx_parity(byte: u8) {
    let parity = STATE.parity.load(Ordering::Relaxed);
    if parity != PARITY_NONE {
        let bit = parity_even_bit(byte) == (parity == PARITY_EVEN);
        STATE.tx_parity.store(bit as u8, Ordering::Relaxed);
    }
}

/// Begin a frame from the foreground. Caller must hold a critical section
/// and have observed `tx_state == 0`.
pub(crate) fn start_byte<Timer: CaptureCompareTimer>(timer: &mut Timer, byte: u8) {
    let s = &STATE;
    s.tx_state.store(1, Ordering::Relaxed);
    s.tx_byte.store(byte, Ordering::Relaxed);
    s.tx_bit.store(0, Ordering::Relaxed);
    store_tx_parity(byte);
    timer.enable_compare_a_interrupt();
    timer.set_compare_a_action(CompareAction::Clear);
    timer.set_compare_a(timer.counter().wrapping_add(START_DELAY_TICKS));
}

/// Service routine for compare-A matches.
///
/// Call this from the platform's compare-A interrupt handler with a timer
/// handle for the peripheral passed to [crate::SoftUart::new].
pub fn on_compare_a_interrupt<Timer: CaptureCompareTimer>(timer: &mut Timer) {
    let s = &STATE;
    let counts = s.bit_counts();
    let ticks_per_bit = s.ticks_per_bit.load(Ordering::Relaxed);
    let mut state = s.tx_state.load(Ordering::Relaxed);
    let mut byte = s.tx_byte.load(Ordering::Relaxed);
    let mut target = timer.compare_a();

    // Emit data bits, coalescing runs of equal polarity into a single
    // programmed edge.
    while state < counts.data_bits + 1 {
        target = target.wrapping_add(ticks_per_bit);
        let bit = byte & 1;
        byte >>= 1;
        state += 1;
        if bit != s.tx_bit.load(Ordering::Relaxed) {
            timer.set_compare_a_action(if bit != 0 {
                CompareAction::Set
            } else {
                CompareAction::Clear
            });
            timer.set_compare_a(target);
            s.tx_bit.store(bit, Ordering::Relaxed);
            s.tx_byte.store(byte, Ordering::Relaxed);
            s.tx_state.store(state, Ordering::Relaxed);
            // TODO: set timing_error when `target` has already slipped
            // behind the counter.
            return;
        }
    }

    if (counts.parity == PARITY_NONE && state == counts.data_bits + 1)
        || state == counts.data_bits + 2
    {
        // Data and parity are out; raise the line for the stop bit(s) and
        // come back when they are over.
        s.tx_state.store(counts.data_bits + 3, Ordering::Relaxed);
        timer.set_compare_a_action(CompareAction::Set);
        timer.set_compare_a(target.wrapping_add(counts.stop_bits as u16 * ticks_per_bit));
        return;
    } else if state == counts.data_bits + 1 {
        s.tx_state.store(counts.data_bits + 2, Ordering::Relaxed);
        let parity_bit = s.tx_parity.load(Ordering::Relaxed);
        if parity_bit != s.tx_bit.load(Ordering::Relaxed) {
            timer.set_compare_a_action(if parity_bit != 0 {
                CompareAction::Set
            } else {
                CompareAction::Clear
            });
            s.tx_bit.store(parity_bit, Ordering::Relaxed);
        }
        timer.set_compare_a(target.wrapping_add(ticks_per_bit));
        return;
    }

    // Stop bit(s) over: go idle or chain the next queued byte with its
    // start bit one bit period out.
    match s.tx_buffer.pop() {
        None => {
            s.tx_state.store(0, Ordering::Relaxed);
            timer.set_compare_a_action(CompareAction::None);
            timer.disable_compare_a_interrupt();
        }
        Some(next) => {
            s.tx_state.store(1, Ordering::Relaxed);
            s.tx_byte.store(next, Ordering::Relaxed);
            s.tx_bit.store(0, Ordering::Relaxed);
            store_tx_parity(next);
            timer.set_compare_a_action(CompareAction::Clear);
            timer.set_compare_a(target.wrapping_add(ticks_per_bit));
        }
    }
    crate::asynch::wake_tx();
}
