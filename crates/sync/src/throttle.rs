use std::sync::{Condvar, Mutex};

struct State {
    count: usize,
    shutdown: bool,
}

/// A bounded counting semaphore used to cap concurrent chunk downloads and
/// concurrent uploads.
///
/// Mirrors the original `repertory::throttle` (`utils/throttle.cpp`):
/// `acquire` blocks while the outstanding count is at the configured
/// maximum, `release` decrements and wakes a single waiter, and `shutdown`
/// wakes everyone and makes every subsequent `acquire` a no-op until
/// [`Throttle::reset`] re-arms it.
pub struct Throttle {
    max_size: usize,
    state: Mutex<State>,
    notify: Condvar,
}

impl Throttle {
    /// Creates a throttle permitting at most `max_size` concurrent holders.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            state: Mutex::new(State {
                count: 0,
                shutdown: false,
            }),
            notify: Condvar::new(),
        }
    }

    /// Blocks until the outstanding count is below the configured maximum,
    /// then increments it. Returns immediately without incrementing if the
    /// throttle has been shut down.
    pub fn acquire(&self) {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            return;
        }

        while !state.shutdown && state.count >= self.max_size {
            state = self.notify.wait(state).unwrap();
        }

        if !state.shutdown {
            state.count += 1;
        }
    }

    /// Releases a previously acquired permit and wakes one waiter.
    ///
    /// A no-op once the throttle is shut down, matching the original's
    /// `decrement()`.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            return;
        }

        if state.count > 0 {
            state.count -= 1;
        }
        self.notify.notify_one();
    }

    /// Wakes every waiter and makes subsequent `acquire` calls return
    /// immediately until [`Throttle::reset`] is called.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.shutdown {
            state.shutdown = true;
            self.notify.notify_all();
        }
    }

    /// Re-arms the throttle after [`Throttle::shutdown`], zeroing the
    /// outstanding count. A no-op when the throttle is not currently shut
    /// down.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            state.count = 0;
            state.shutdown = false;
        }
    }

    /// Returns the configured maximum number of concurrent holders.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::Throttle;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_blocks_above_max_size() {
        let throttle = Arc::new(Throttle::new(2));
        throttle.acquire();
        throttle.acquire();

        let blocked = Arc::clone(&throttle);
        let handle = thread::spawn(move || {
            blocked.acquire();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        throttle.release();
        handle.join().unwrap();
    }

    #[test]
    fn shutdown_wakes_all_waiters() {
        let throttle = Arc::new(Throttle::new(1));
        throttle.acquire();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let t = Arc::clone(&throttle);
                thread::spawn(move || t.acquire())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        throttle.shutdown();
        for w in waiters {
            w.join().unwrap();
        }
    }

    #[test]
    fn acquire_after_shutdown_returns_immediately() {
        let throttle = Throttle::new(1);
        throttle.acquire();
        throttle.shutdown();
        throttle.acquire();
        throttle.acquire();
    }

    #[test]
    fn reset_is_noop_unless_shutdown() {
        let throttle = Throttle::new(1);
        throttle.acquire();
        throttle.reset();
        // count is still 1 since reset() only acts while shut down.
        let throttle = Arc::new(throttle);
        let blocked = Arc::clone(&throttle);
        let handle = thread::spawn(move || blocked.acquire());
        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        throttle.shutdown();
        handle.join().unwrap();

        throttle.reset();
        throttle.acquire();
    }
}
