//! Clock and frame scheduling abstraction.
//!
//! The engine never sleeps or spawns. It asks its scheduler for the current
//! time, and tells it when it wants another animation frame or a wakeup at
//! a given time; the host answers by calling `DiagramEngine::tick`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
use web_time::{Instant, SystemTime, UNIX_EPOCH};
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source and tick request sink.
pub trait FrameScheduler {
    /// Monotonic time in milliseconds.
    fn now(&self) -> f64;

    /// Ask for a tick on the next animation frame.
    fn request_frame(&self);

    /// Ask for a tick no earlier than `at` (milliseconds, same clock as `now`).
    fn request_wakeup(&self, at: f64);

    /// Forget every outstanding frame and wakeup request.
    fn cancel_all(&self);
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Scheduler backed by the platform clock.
///
/// Requests are recorded for the host loop to query via
/// [`SystemScheduler::wants_frame`] and [`SystemScheduler::next_wakeup`].
#[derive(Debug)]
pub struct SystemScheduler {
    origin: Instant,
    frame_requested: Cell<bool>,
    wakeup: Cell<Option<f64>>,
}

impl Default for SystemScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            frame_requested: Cell::new(false),
            wakeup: Cell::new(None),
        }
    }

    /// Whether a frame was requested since the last call; clears the flag.
    pub fn wants_frame(&self) -> bool {
        self.frame_requested.replace(false)
    }

    /// Earliest pending wakeup time.
    pub fn next_wakeup(&self) -> Option<f64> {
        self.wakeup.get()
    }

    /// Drop the wakeup request if it is due at `now`.
    pub fn take_due_wakeup(&self, now: f64) -> bool {
        match self.wakeup.get() {
            Some(at) if at <= now => {
                self.wakeup.set(None);
                true
            }
            _ => false,
        }
    }
}

impl FrameScheduler for SystemScheduler {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn request_frame(&self) {
        self.frame_requested.set(true);
    }

    fn request_wakeup(&self, at: f64) {
        let earliest = match self.wakeup.get() {
            Some(existing) => existing.min(at),
            None => at,
        };
        self.wakeup.set(Some(earliest));
    }

    fn cancel_all(&self) {
        self.frame_requested.set(false);
        self.wakeup.set(None);
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    frames_requested: usize,
    wakeups: Vec<f64>,
}

/// Deterministic scheduler for tests: time only moves when told to.
///
/// Clones share the same clock, so a test can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `ms`.
    pub fn advance(&self, ms: f64) {
        self.state.borrow_mut().now += ms;
    }

    pub fn set_time(&self, ms: f64) {
        self.state.borrow_mut().now = ms;
    }

    /// Whether a frame has been requested and not yet consumed.
    pub fn pending_frame(&self) -> bool {
        self.state.borrow().frames_requested > 0
    }

    /// Consume outstanding frame requests, returning whether there were any.
    pub fn take_frame(&self) -> bool {
        let mut state = self.state.borrow_mut();
        let pending = state.frames_requested > 0;
        state.frames_requested = 0;
        pending
    }

    /// Earliest outstanding wakeup.
    pub fn next_wakeup(&self) -> Option<f64> {
        self.state
            .borrow()
            .wakeups
            .iter()
            .copied()
            .reduce(f64::min)
    }

    /// Remove and count wakeups due at the current time.
    pub fn take_due_wakeups(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let now = state.now;
        let before = state.wakeups.len();
        state.wakeups.retain(|at| *at > now);
        before - state.wakeups.len()
    }

    /// Whether anything at all is outstanding.
    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        state.frames_requested == 0 && state.wakeups.is_empty()
    }
}

impl FrameScheduler for ManualScheduler {
    fn now(&self) -> f64 {
        self.state.borrow().now
    }

    fn request_frame(&self) {
        self.state.borrow_mut().frames_requested += 1;
    }

    fn request_wakeup(&self, at: f64) {
        self.state.borrow_mut().wakeups.push(at);
    }

    fn cancel_all(&self) {
        let mut state = self.state.borrow_mut();
        state.frames_requested = 0;
        state.wakeups.clear();
    }
}
