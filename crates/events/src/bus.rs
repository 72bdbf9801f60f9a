use crate::Event;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Handle returned by [`EventBus::subscribe`], used to unregister later.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: u64,
    filter: Option<&'static str>,
    handler: Arc<dyn Fn(&dyn Event) + Send + Sync>,
}

/// Process-wide typed publish/subscribe bus.
///
/// Construct one per process (or one per test, for isolation) and keep it
/// alive for the lifetime of the mount. [`EventBus::publish`] delivers
/// synchronously unless the event allows async delivery, in which case it
/// is queued for the background worker thread spawned by [`EventBus::new`].
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    sender: Mutex<Option<Sender<Box<dyn Event>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Creates a bus and starts its background delivery thread.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Box<dyn Event>>();

        let bus = Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(None),
        });

        let worker_bus = Arc::clone(&bus);
        let handle = std::thread::spawn(move || {
            for event in rx {
                worker_bus.deliver_sync(event.as_ref());
            }
        });
        *bus.worker.lock().unwrap() = Some(handle);

        bus
    }

    /// Registers `handler` for events named `name`, or for every event
    /// when `name` is `None`.
    pub fn subscribe<F>(&self, name: Option<&'static str>, handler: F) -> SubscriptionId
    where
        F: Fn(&dyn Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().push(Subscriber {
            id,
            filter: name,
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    /// Unregisters a subscriber. Idempotent: unregistering an id twice, or
    /// one that never existed, is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id.0);
    }

    /// Publishes an event. Delivered synchronously unless
    /// [`Event::allow_async`] is true and the bus has not been shut down,
    /// in which case it is queued for the background worker.
    pub fn publish<E: Event>(&self, event: E) {
        if !event.allow_async() {
            self.deliver_sync(&event);
            return;
        }

        let boxed: Box<dyn Event> = Box::new(event);
        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(sender) => {
                if let Err(rejected) = sender.send(boxed) {
                    // Worker thread's receiver was dropped concurrently
                    // with this send; deliver on the caller's thread so
                    // the event is never silently lost.
                    self.deliver_sync(rejected.0.as_ref());
                }
            }
            None => self.deliver_sync(boxed.as_ref()),
        }
    }

    fn snapshot_matching(&self, name: &str) -> Vec<Arc<dyn Fn(&dyn Event) + Send + Sync>> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.filter.is_none() || s.filter == Some(name))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    fn deliver_sync(&self, event: &dyn Event) {
        for handler in self.snapshot_matching(event.name()) {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
            if let Err(payload) = result {
                let message = panic_message(&payload);
                let exception = crate::types::RepertoryException::new(event.name(), message);
                for exc_handler in self.snapshot_matching(exception.name()) {
                    let _ =
                        panic::catch_unwind(AssertUnwindSafe(|| exc_handler(&exception)));
                }
            }
        }
    }

    /// Drains any pending async events and joins the background worker.
    /// Further calls to [`EventBus::publish`] with `allow_async() ==
    /// true` deliver synchronously instead.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().unwrap().take();
        drop(sender);

        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Default for Arc<EventBus> {
    fn default() -> Self {
        EventBus::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "subscriber panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepertoryException;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Ping(bool);

    impl Event for Ping {
        fn name(&self) -> &'static str {
            "ping"
        }

        fn level(&self) -> crate::EventLevel {
            crate::EventLevel::Info
        }

        fn get_single_line(&self) -> String {
            "ping".to_string()
        }

        fn to_json(&self) -> serde_json::Value {
            serde_json::json!({"name": "ping"})
        }

        fn allow_async(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn synchronous_delivery_is_immediate() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        bus.subscribe(Some("ping"), move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Ping(false));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        bus.shutdown();
    }

    #[test]
    fn async_delivery_completes_before_shutdown_returns() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        bus.subscribe(None, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..50 {
            bus.publish(Ping(true));
        }
        bus.shutdown();
        assert_eq!(seen.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let id = bus.subscribe(Some("ping"), move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Ping(false));
        bus.unsubscribe(id);
        bus.unsubscribe(id);
        bus.publish(Ping(false));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        bus.shutdown();
    }

    #[test]
    fn panicking_subscriber_is_isolated_and_reported() {
        let bus = EventBus::new();
        let exceptions = Arc::new(AtomicUsize::new(0));
        let exceptions2 = Arc::clone(&exceptions);
        bus.subscribe(Some(RepertoryException::NAME), move |_| {
            exceptions2.fetch_add(1, Ordering::SeqCst);
        });

        let others_ran = Arc::new(AtomicUsize::new(0));
        let others_ran2 = Arc::clone(&others_ran);
        bus.subscribe(Some("ping"), |_| panic!("boom"));
        bus.subscribe(Some("ping"), move |_| {
            others_ran2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Ping(false));
        assert_eq!(exceptions.load(Ordering::SeqCst), 1);
        assert_eq!(others_ran.load(Ordering::SeqCst), 1);
        bus.shutdown();
    }

    #[test]
    fn delivery_during_unsubscribe_completes() {
        let bus = EventBus::new();
        let started = Arc::new(AtomicUsize::new(0));
        let started2 = Arc::clone(&started);
        let id = bus.subscribe(Some("ping"), move |_| {
            started2.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
        });
        bus.unsubscribe(id);
        bus.publish(Ping(false));
        assert_eq!(started.load(Ordering::SeqCst), 0);
        bus.shutdown();
    }
}
