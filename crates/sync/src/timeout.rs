use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Inner {
    killed: Mutex<bool>,
    notify: Condvar,
}

/// A one-shot cancellable timer.
///
/// `Timeout::new(callback, duration)` spawns a thread that parks on a
/// condition variable for `duration`; unless [`Timeout::disable`] is called
/// first, `callback` runs once on that thread. `disable` is idempotent and
/// safe to call from any thread, including from within `callback` itself. A
/// zero duration is "immediately disabled" and never spawns a thread, never
/// running the callback, matching the original `repertory::timeout`.
pub struct Timeout {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

impl Timeout {
    /// Spawns a timer that invokes `callback` after `duration` unless
    /// disabled first.
    pub fn new<F>(callback: F, duration: Duration) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        if duration.is_zero() {
            return Self {
                inner: Arc::new(Inner {
                    killed: Mutex::new(true),
                    notify: Condvar::new(),
                }),
                thread: None,
            };
        }

        let inner = Arc::new(Inner {
            killed: Mutex::new(false),
            notify: Condvar::new(),
        });

        let thread_inner = Arc::clone(&inner);
        let thread = thread::spawn(move || {
            let guard = thread_inner.killed.lock().unwrap();
            let (guard, timed_out) = thread_inner
                .notify
                .wait_timeout(guard, duration)
                .unwrap();
            let already_killed = *guard;
            drop(guard);

            if !already_killed && timed_out.timed_out() {
                callback();
            }
        });

        Self {
            inner,
            thread: Some(thread),
        }
    }

    /// Disables the timer, preventing the callback from running if it has
    /// not already started. Idempotent; safe to call from the callback.
    pub fn disable(&mut self) {
        {
            let mut killed = self.inner.killed.lock().unwrap();
            if *killed {
                return;
            }
            *killed = true;
            self.inner.notify.notify_all();
        }

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::Timeout;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fires_after_duration() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let mut timeout = Timeout::new(
            move || flag.store(true, Ordering::SeqCst),
            Duration::from_millis(20),
        );
        thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst));
        timeout.disable();
    }

    #[test]
    fn disable_before_fire_prevents_callback() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let mut timeout = Timeout::new(
            move || flag.store(true, Ordering::SeqCst),
            Duration::from_millis(200),
        );
        timeout.disable();
        thread::sleep(Duration::from_millis(300));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn zero_duration_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let mut timeout = Timeout::new(move || flag.store(true, Ordering::SeqCst), Duration::ZERO);
        thread::sleep(Duration::from_millis(50));
        assert!(!fired.load(Ordering::SeqCst));
        timeout.disable();
    }

    #[test]
    fn disable_is_idempotent() {
        let mut timeout = Timeout::new(|| {}, Duration::from_millis(10));
        timeout.disable();
        timeout.disable();
    }
}
