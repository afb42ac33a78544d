//! Receive state machine: the input-capture edge walk and the compare-B
//! stop-bit fallback.
//!
//! The line idles high and a start bit is a falling edge. Every armed
//! edge latches the counter into the capture register; between two
//! consecutive edges the line held one known polarity. The capture
//! handler walks bit centers from `rx_target` in steps of `ticks_per_bit`
//! until the captured tick is no longer reached, assigning the held
//! polarity to each position it passes. When the tail of a frame produces
//! no further edges, the compare-B match scheduled `rx_stop_ticks` after
//! the start edge finishes the frame from the inferred level instead.

use portable_atomic::Ordering;

use crate::frame::{PARITY_EVEN, PARITY_NONE, parity_even_bit};
use crate::state::STATE;
use crate::timer::{CaptureCompareTimer, CaptureEdge};

/// Service routine for input-capture events.
///
/// Call this from the platform's capture interrupt handler with a timer
/// handle for the peripheral passed to [crate::SoftUart::new].
pub fn on_capture_interrupt<Timer: CaptureCompareTimer>(timer: &mut Timer) {
    let s = &STATE;
    let capture = timer.capture();

    // Re-arm for the opposite edge. The updated `rx_bit` is the level the
    // line held in the region this edge just closed, pre-shifted for the
    // walk below; the previous value tells a start edge apart from a
    // mid-frame edge.
    let prev_bit = s.rx_bit.load(Ordering::Relaxed);
    let held = if prev_bit != 0 {
        timer.set_capture_edge(CaptureEdge::Falling);
        0x00
    } else {
        timer.set_capture_edge(CaptureEdge::Rising);
        0x80
    };
    s.rx_bit.store(held, Ordering::Relaxed);

    let state = s.rx_state.load(Ordering::Relaxed);
    if state == 0 {
        if prev_bit == 0 {
            // Falling edge on an idle line: a start bit. Aim at the
            // center of data bit 0 and schedule the stop-bit fallback in
            // case no further edges arrive.
            let ticks_per_bit = s.ticks_per_bit.load(Ordering::Relaxed);
            timer.set_compare_b(capture.wrapping_add(s.rx_stop_ticks.load(Ordering::Relaxed)));
            timer.enable_compare_b_interrupt();
            s.rx_target.store(
                capture
                    .wrapping_add(ticks_per_bit)
                    .wrapping_add(ticks_per_bit / 2),
                Ordering::Relaxed,
            );
            s.rx_state.store(1, Ordering::Relaxed);
        }
        return;
    }

    let counts = s.bit_counts();
    let ticks_per_bit = s.ticks_per_bit.load(Ordering::Relaxed);
    let mut state = state;
    let mut target = s.rx_target.load(Ordering::Relaxed);
    let mut byte = s.rx_byte.load(Ordering::Relaxed);
    loop {
        // Signed 16-bit difference: negative means the next bit center is
        // still in the future and belongs to a later edge.
        let offset = capture.wrapping_sub(target) as i16;
        if offset < 0 {
            break;
        }
        if state >= 1 && state <= counts.data_bits {
            byte = (byte >> 1) | held;
        } else if counts.parity != PARITY_NONE && state == counts.almost_total_bits {
            s.rx_parity.store(held, Ordering::Relaxed);
        }
        target = target.wrapping_add(ticks_per_bit);
        state += 1;
        if state >= counts.total_bits {
            // Frame complete. A parity frame is only admitted when the
            // sampled parity bit matches the parity of the assembled
            // byte.
            timer.disable_compare_b_interrupt();
            let parity_ok = counts.parity == PARITY_NONE
                || (parity_even_bit(byte) == (counts.parity == PARITY_EVEN))
                    == (s.rx_parity.load(Ordering::Relaxed) != 0);
            if parity_ok && s.rx_buffer.push(byte) {
                crate::asynch::wake_rx();
            }
            s.rx_byte.store(byte, Ordering::Relaxed);
            timer.set_capture_edge(CaptureEdge::Falling);
            s.rx_bit.store(0, Ordering::Relaxed);
            s.rx_state.store(0, Ordering::Relaxed);
            return;
        }
    }
    s.rx_byte.store(byte, Ordering::Relaxed);
    s.rx_target.store(target, Ordering::Relaxed);
    s.rx_state.store(state, Ordering::Relaxed);
    // TODO: set timing_error when the handler ran more than a bit period
    // behind the captured edge.
}

/// Service routine for compare-B matches.
///
/// Fires `rx_stop_ticks` after a start edge, only when no capture
/// completed the frame first: the remaining bits all share the polarity
/// of the last region, so they are filled in from the held level. No
/// parity check is performed on this path.
pub fn on_compare_b_interrupt<Timer: CaptureCompareTimer>(timer: &mut Timer) {
    let s = &STATE;
    timer.disable_compare_b_interrupt();
    timer.set_capture_edge(CaptureEdge::Falling);

    let counts = s.bit_counts();
    let mut state = s.rx_state.load(Ordering::Relaxed);
    let mut byte = s.rx_byte.load(Ordering::Relaxed);
    // The level held since the last edge is the opposite of the one the
    // capture unit is armed for.
    let bit = s.rx_bit.load(Ordering::Relaxed) ^ 0x80;
    while state < counts.data_bits + 1 {
        byte = (byte >> 1) | bit;
        state += 1;
    }
    s.rx_byte.store(byte, Ordering::Relaxed);
    if s.rx_buffer.push(byte) {
        crate::asynch::wake_rx();
    }
    s.rx_state.store(0, Ordering::Relaxed);
    s.rx_bit.store(0, Ordering::Relaxed);
}
