//! Worker-side waiting: stop requests, the device-open gate, paced sleeps.
//!
//! One mutex + condvar pair carries all three so a stop request wakes the
//! worker no matter which of them it is blocked on.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome of [`Control::wait_for_gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    /// The device opened; start fetching.
    Open,
    /// The device failed to open.
    Failed,
    /// Stop was requested while waiting.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Armed,
    Released,
    Failed,
}

#[derive(Debug)]
struct Inner {
    stop: bool,
    gate: Gate,
}

#[derive(Debug)]
pub struct Control {
    inner: Mutex<Inner>,
    cv:    Condvar,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    /// The gate starts released: a pump started without a controller runs
    /// immediately.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { stop: false, gate: Gate::Released }),
            cv:    Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // MARK: - Stop

    pub fn request_stop(&self) {
        self.lock().stop = true;
        self.cv.notify_all();
    }

    pub fn reset_stop(&self) {
        self.lock().stop = false;
    }

    /// Block until stop is requested.
    pub fn wait_for_stop(&self) {
        let mut inner = self.lock();
        while !inner.stop {
            inner = self.cv.wait(inner).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    // MARK: - Open gate

    /// Hold the next worker in `Starting` until [`Control::release_gate`].
    pub fn arm_gate(&self) {
        self.lock().gate = Gate::Armed;
    }

    pub fn release_gate(&self, opened: bool) {
        self.lock().gate = if opened { Gate::Released } else { Gate::Failed };
        self.cv.notify_all();
    }

    pub fn wait_for_gate(&self) -> GateWait {
        let mut inner = self.lock();
        loop {
            match inner.gate {
                Gate::Released => return GateWait::Open,
                Gate::Failed => return GateWait::Failed,
                Gate::Armed if inner.stop => return GateWait::Stopped,
                Gate::Armed => {}
            }
            inner = self.cv.wait(inner).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    // MARK: - Sleeping

    /// Sleep until `deadline`. Returns `true` if stop was requested first.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let mut inner = self.lock();
        loop {
            if inner.stop {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = self
                .cv
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    pub fn sleep_for(&self, duration: Duration) -> bool {
        self.sleep_until(Instant::now() + duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn gate_starts_released() {
        let control = Control::new();
        assert_eq!(control.wait_for_gate(), GateWait::Open);
    }

    #[test]
    fn armed_gate_blocks_until_released() {
        let control = Arc::new(Control::new());
        control.arm_gate();

        let c = Arc::clone(&control);
        let waiter = thread::spawn(move || c.wait_for_gate());
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        control.release_gate(true);
        assert_eq!(waiter.join().unwrap(), GateWait::Open);
    }

    #[test]
    fn failed_gate_and_stop_wake_waiters() {
        let control = Control::new();
        control.arm_gate();
        control.release_gate(false);
        assert_eq!(control.wait_for_gate(), GateWait::Failed);

        let control = Arc::new(Control::new());
        control.arm_gate();
        let c = Arc::clone(&control);
        let waiter = thread::spawn(move || c.wait_for_gate());
        control.request_stop();
        assert_eq!(waiter.join().unwrap(), GateWait::Stopped);
    }

    #[test]
    fn stop_interrupts_sleep() {
        let control = Arc::new(Control::new());
        let c = Arc::clone(&control);
        let started = Instant::now();
        let sleeper = thread::spawn(move || c.sleep_for(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        control.request_stop();
        assert!(sleeper.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn sleep_runs_to_deadline_without_stop() {
        let control = Control::new();
        let started = Instant::now();
        assert!(!control.sleep_for(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));

        control.request_stop();
        control.reset_stop();
        assert!(!control.sleep_for(Duration::from_millis(10)));
    }
}
