//! Loopback test bench: a tick-accurate model of a free-running 16-bit
//! timer with capture and compare units, its TX pin wired back to its RX
//! pin.
//!
//! The bench advances the model one timer tick at a time. Compare-A
//! matches act on the TX pin the way the hardware unit would, line
//! changes latch the capture register when they match the armed edge, and
//! pending events are dispatched to the crate's interrupt handlers in the
//! hardware's priority order (capture, compare A, compare B).

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use softuart_timer::{
    CaptureCompareTimer, CaptureEdge, CompareAction, FrameConfig, Prescale, SoftUart,
    on_capture_interrupt, on_compare_a_interrupt, on_compare_b_interrupt,
};

/// Timer ticks per bit used by most tests: 1667 ticks at 16 MHz is about
/// 9600 baud.
pub const BIT: u64 = 1667;

/// The driver state is a process-wide singleton, so tests take this lock
/// to keep the harness from running them concurrently.
pub fn lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct TimerModel {
    pub now: u64,
    pub prescale: Option<Prescale>,
    pub ocr_a: u16,
    pub ocr_b: u16,
    pub action_a: CompareAction,
    pub tx_pin: bool,
    pub rx_line: bool,
    pub capture_reg: u16,
    pub armed_edge: CaptureEdge,
    pub capture_irq: bool,
    pub compare_a_irq: bool,
    pub compare_b_irq: bool,
    /// Forced RX line levels as half-open tick windows.
    pub faults: Vec<(u64, u64, bool)>,
    /// Absolute tick of every dispatched compare-A match.
    pub compare_a_log: Vec<u64>,
    /// TX pin transitions as (tick, new level).
    pub edge_log: Vec<(u64, bool)>,
}

impl TimerModel {
    fn new() -> Self {
        TimerModel {
            now: 0,
            prescale: None,
            ocr_a: 0,
            ocr_b: 0,
            action_a: CompareAction::None,
            tx_pin: true,
            rx_line: true,
            capture_reg: 0,
            armed_edge: CaptureEdge::Falling,
            capture_irq: false,
            compare_a_irq: false,
            compare_b_irq: false,
            faults: Vec::new(),
            compare_a_log: Vec::new(),
            edge_log: Vec::new(),
        }
    }

    fn fault_level(&self, now: u64) -> Option<bool> {
        self.faults
            .iter()
            .find(|f| now >= f.0 && now < f.1)
            .map(|f| f.2)
    }
}

/// Handle onto the shared timer model. Cloning mirrors how a port steals
/// a second register handle for its interrupt handlers.
#[derive(Clone)]
pub struct SimTimer(Rc<RefCell<TimerModel>>);

impl CaptureCompareTimer for SimTimer {
    fn configure(&mut self, prescale: Prescale) {
        self.0.borrow_mut().prescale = Some(prescale);
    }

    fn configure_rx_pin(&mut self) {}

    fn configure_tx_pin(&mut self) {
        self.0.borrow_mut().tx_pin = true;
    }

    fn enable_capture_interrupt(&mut self) {
        self.0.borrow_mut().capture_irq = true;
    }

    fn disable_capture_interrupt(&mut self) {
        self.0.borrow_mut().capture_irq = false;
    }

    fn enable_compare_a_interrupt(&mut self) {
        self.0.borrow_mut().compare_a_irq = true;
    }

    fn disable_compare_a_interrupt(&mut self) {
        self.0.borrow_mut().compare_a_irq = false;
    }

    fn enable_compare_b_interrupt(&mut self) {
        self.0.borrow_mut().compare_b_irq = true;
    }

    fn disable_compare_b_interrupt(&mut self) {
        self.0.borrow_mut().compare_b_irq = false;
    }

    fn set_capture_edge(&mut self, edge: CaptureEdge) {
        self.0.borrow_mut().armed_edge = edge;
    }

    fn set_compare_a_action(&mut self, action: CompareAction) {
        self.0.borrow_mut().action_a = action;
    }

    fn set_compare_a(&mut self, tick: u16) {
        self.0.borrow_mut().ocr_a = tick;
    }

    fn compare_a(&self) -> u16 {
        self.0.borrow().ocr_a
    }

    fn set_compare_b(&mut self, tick: u16) {
        self.0.borrow_mut().ocr_b = tick;
    }

    fn counter(&self) -> u16 {
        self.0.borrow().now as u16
    }

    fn capture(&self) -> u16 {
        self.0.borrow().capture_reg
    }
}

pub struct Bench {
    pub model: Rc<RefCell<TimerModel>>,
    isr_timer: SimTimer,
}

impl Bench {
    /// Advance the model by one timer tick and service whatever fired.
    pub fn step(&mut self) {
        let mut pend_capture = false;
        let mut pend_a = false;
        let mut pend_b = false;
        {
            let mut m = self.model.borrow_mut();
            m.now += 1;
            let tick = m.now as u16;

            if tick == m.ocr_a {
                let level = match m.action_a {
                    CompareAction::Set => Some(true),
                    CompareAction::Clear => Some(false),
                    CompareAction::None => None,
                };
                if let Some(level) = level
                    && level != m.tx_pin
                {
                    m.tx_pin = level;
                    let now = m.now;
                    m.edge_log.push((now, level));
                }
                if m.compare_a_irq {
                    pend_a = true;
                    let now = m.now;
                    m.compare_a_log.push(now);
                }
            }
            if tick == m.ocr_b && m.compare_b_irq {
                pend_b = true;
            }

            let line = m.fault_level(m.now).unwrap_or(m.tx_pin);
            if line != m.rx_line {
                let armed_rising = m.armed_edge == CaptureEdge::Rising;
                if m.capture_irq && line == armed_rising {
                    m.capture_reg = tick;
                    pend_capture = true;
                }
                m.rx_line = line;
            }
        }

        if pend_capture {
            on_capture_interrupt(&mut self.isr_timer);
        }
        if pend_a {
            on_compare_a_interrupt(&mut self.isr_timer);
        }
        // A capture that completed the frame masks the fallback.
        if pend_b && self.model.borrow().compare_b_irq {
            on_compare_b_interrupt(&mut self.isr_timer);
        }
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Step until `cond` holds, up to `max_ticks`. Returns whether the
    /// condition was reached.
    pub fn run_until(&mut self, max_ticks: u64, mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..max_ticks {
            if cond() {
                return true;
            }
            self.step();
        }
        cond()
    }

    pub fn now(&self) -> u64 {
        self.model.borrow().now
    }

    pub fn tx_pin(&self) -> bool {
        self.model.borrow().tx_pin
    }

    /// Another handle onto the same timer, as a port's interrupt handlers
    /// would steal one.
    pub fn handle(&self) -> SimTimer {
        SimTimer(self.model.clone())
    }

    /// Force the RX line to `level` for the half-open tick window
    /// `[from, to)`, overriding the loopback.
    pub fn inject_fault(&mut self, from: u64, to: u64, level: bool) {
        self.model.borrow_mut().faults.push((from, to, level));
    }
}

/// Owns the transceiver for a test and shuts it down on drop, so a failed
/// test does not leave the singleton claimed for the next one.
pub struct UartGuard(Option<SoftUart<SimTimer>>);

impl UartGuard {
    pub fn take(&mut self) -> SoftUart<SimTimer> {
        self.0.take().unwrap()
    }
}

impl Deref for UartGuard {
    type Target = SoftUart<SimTimer>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().unwrap()
    }
}

impl DerefMut for UartGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().unwrap()
    }
}

impl Drop for UartGuard {
    fn drop(&mut self) {
        if let Some(uart) = self.0.take() {
            uart.stop();
        }
    }
}

/// Fresh bench plus a configured transceiver wired in loopback.
pub fn bench(bit_cycles: u32, frame: FrameConfig) -> (Bench, UartGuard) {
    let model = Rc::new(RefCell::new(TimerModel::new()));
    let bench = Bench {
        isr_timer: SimTimer(model.clone()),
        model: model.clone(),
    };
    let uart = SoftUart::new(SimTimer(model), bit_cycles, frame).expect("bench configuration");
    (bench, UartGuard(Some(uart)))
}

/// A bare timer handle plus its model, for construction-error tests.
pub fn raw_timer() -> (Rc<RefCell<TimerModel>>, SimTimer) {
    let model = Rc::new(RefCell::new(TimerModel::new()));
    (model.clone(), SimTimer(model))
}

/// Poll a future to completion, advancing the bench one tick per pending
/// poll.
pub fn poll_until_ready<F: std::future::Future>(
    bench: &mut Bench,
    fut: F,
    max_ticks: u64,
) -> F::Output {
    let mut fut = std::pin::pin!(fut);
    let mut cx = std::task::Context::from_waker(std::task::Waker::noop());
    for _ in 0..max_ticks {
        if let std::task::Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
        bench.step();
    }
    panic!("future did not resolve within {max_ticks} ticks");
}
