//! Async byte-stream access on top of the interrupt handlers.
//!
//! [AsyncSoftUart] implements [embedded_io_async::Read] and
//! [embedded_io_async::Write]. The interrupt handlers wake the pending
//! futures whenever a byte is enqueued on the receive side or the
//! transmitter finishes a frame; no executor integration beyond the
//! wakers is required, and the interrupt half stays the plain
//! [on_capture_interrupt](crate::on_capture_interrupt) /
//! [on_compare_a_interrupt](crate::on_compare_a_interrupt) /
//! [on_compare_b_interrupt](crate::on_compare_b_interrupt) handlers.

use core::convert::Infallible;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;

use crate::state::STATE;
use crate::timer::CaptureCompareTimer;
use crate::uart::SoftUart;

static RX_WAKER: AtomicWaker = AtomicWaker::new();
static TX_WAKER: AtomicWaker = AtomicWaker::new();

/// Called by the receive handlers after a byte was enqueued.
pub(crate) fn wake_rx() {
    RX_WAKER.wake();
}

/// Called by the compare-A handler when a frame ends, which is when ring
/// space frees up and when the transmitter can go idle.
pub(crate) fn wake_tx() {
    TX_WAKER.wake();
}

/// Asynchronous wrapper around [SoftUart].
pub struct AsyncSoftUart<Timer: CaptureCompareTimer>(SoftUart<Timer>);

impl<Timer: CaptureCompareTimer> AsyncSoftUart<Timer> {
    pub fn new(uart: SoftUart<Timer>) -> Self {
        AsyncSoftUart(uart)
    }

    pub fn release(self) -> SoftUart<Timer> {
        self.0
    }
}

impl<Timer: CaptureCompareTimer> embedded_io::ErrorType for AsyncSoftUart<Timer> {
    type Error = Infallible;
}

impl<Timer: CaptureCompareTimer> embedded_io_async::Read for AsyncSoftUart<Timer> {
    /// Wait until at least one byte has been received, then drain as much
    /// of the ring as fits into `buf`.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        poll_fn(|cx| {
            RX_WAKER.register(cx.waker());
            if STATE.rx_buffer.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
        let mut read = 0;
        while read < buf.len() {
            match STATE.rx_buffer.pop() {
                Some(byte) => {
                    buf[read] = byte;
                    read += 1;
                }
                None => break,
            }
        }
        Ok(read)
    }
}

impl<Timer: CaptureCompareTimer> embedded_io_async::Write for AsyncSoftUart<Timer> {
    /// Wait for TX ring space, then queue as much of `buf` as fits
    /// without further waiting.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        poll_fn(|cx| {
            TX_WAKER.register(cx.waker());
            match self.0.try_write_byte(buf[0]) {
                Ok(()) => Poll::Ready(()),
                Err(nb::Error::WouldBlock) => Poll::Pending,
            }
        })
        .await;
        let mut written = 1;
        for &byte in &buf[1..] {
            match self.0.try_write_byte(byte) {
                Ok(()) => written += 1,
                Err(nb::Error::WouldBlock) => break,
            }
        }
        Ok(written)
    }

    /// Wait until the transmitter has gone idle.
    async fn flush(&mut self) -> Result<(), Self::Error> {
        poll_fn(|cx| {
            TX_WAKER.register(cx.waker());
            match self.0.try_flush() {
                Ok(()) => Poll::Ready(()),
                Err(nb::Error::WouldBlock) => Poll::Pending,
            }
        })
        .await;
        Ok(())
    }
}
