use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Set-once flag shared by a supervisor and all of its loops.
///
/// Once set it stays set; every blocked [`wait`](Self::wait) wakes up
/// immediately and every later call returns `true` without blocking.
#[derive(Debug, Default)]
pub struct CancellationSignal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl CancellationSignal {
    pub fn new() -> Self { Self::default() }

    /// Returns `true` only for the call that flipped the flag.
    pub fn set(&self) -> bool {
        let mut set = self.lock();
        if *set {
            return false;
        }

        *set = true;
        self.cond.notify_all();
        true
    }

    pub fn is_set(&self) -> bool { *self.lock() }

    /// Block for up to `timeout` or until the signal is set.
    ///
    /// Returns `true` when the signal is set, `false` when the full timeout
    /// elapsed. Spurious wakeups are absorbed here.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.lock();

        while !*set {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            set = self
                .cond
                .wait_timeout(set, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|err| err.into_inner().0);
        }

        true
    }

    // a panicking waiter can't leave the bool half-written
    fn lock(&self) -> MutexGuard<'_, bool> { self.set.lock().unwrap_or_else(PoisonError::into_inner) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_when_unset() {
        let signal = CancellationSignal::new();
        let started = Instant::now();

        assert!(!signal.wait(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!signal.is_set());
    }

    #[test]
    fn test_set_is_once() {
        let signal = CancellationSignal::new();

        assert!(signal.set());
        assert!(!signal.set());
        assert!(!signal.set());
        assert!(signal.is_set());
    }

    #[test]
    fn test_wait_returns_immediately_once_set() {
        let signal = CancellationSignal::new();
        signal.set();

        let started = Instant::now();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_set_wakes_blocked_waiter() {
        let signal = Arc::new(CancellationSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let started = Instant::now();
                (signal.wait(Duration::from_secs(10)), started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        signal.set();

        let (woken, elapsed) = waiter.join().unwrap();
        assert!(woken);
        assert!(elapsed < Duration::from_secs(5));
    }
}
