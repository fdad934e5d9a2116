//! Cooperative abort signal shared between the executor and running tasks.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct AbortInner {
    set: Mutex<bool>,
    condvar: Condvar,
}

/// One-shot flag a task polls between checkpoints.
///
/// Cloning shares the flag. The executor replaces its event with a fresh one
/// after every abort, so an event never goes back to unset.
#[derive(Debug, Clone, Default)]
pub struct AbortEvent {
    inner: Arc<AbortInner>,
}

impl AbortEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        *self.inner.set.lock()
    }

    /// Raise the flag and wake every waiter
    pub fn set(&self) {
        let mut set = self.inner.set.lock();
        *set = true;
        self.inner.condvar.notify_all();
    }

    /// Sleep for up to `timeout`, returning early if the flag is raised.
    /// Returns whether the flag is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.inner.set.lock();
        while !*set {
            if self
                .inner
                .condvar
                .wait_until(&mut set, deadline)
                .timed_out()
            {
                break;
            }
        }
        *set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let event = AbortEvent::new();
        let clone = event.clone();
        assert!(!clone.is_set());

        event.set();
        assert!(clone.is_set());
    }

    #[test]
    fn test_wait_times_out_when_unset() {
        let event = AbortEvent::new();
        let started = Instant::now();
        assert!(!event.wait_timeout(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_wakes_on_set() {
        let event = AbortEvent::new();
        let setter = event.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            setter.set();
        });

        assert!(event.wait_timeout(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
