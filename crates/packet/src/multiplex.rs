//! Per-client worker pool, matching the original `comm/packet/
//! client_pool.hpp`: each connected client gets `pool_size` queues
//! (default 10), `thread_id mod pool_size` selects the queue, so every
//! request sharing a `thread_id` executes on the same worker in the
//! order it was dispatched.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Default number of queues per connected client.
pub const DEFAULT_POOL_SIZE: usize = 10;

type WorkItem = Box<dyn FnOnce() + Send>;

struct Queue {
    items: Mutex<VecDeque<WorkItem>>,
    cond: Condvar,
}

impl Queue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    fn push(&self, item: WorkItem) {
        self.items.lock().unwrap().push_back(item);
        self.cond.notify_one();
    }

    /// Blocks until an item is available or `stop` is set, returning
    /// `None` only when stopping and the queue has drained.
    fn pop(&self, stop: &AtomicBool) -> Option<WorkItem> {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if stop.load(Ordering::SeqCst) {
                return None;
            }
            items = self.cond.wait(items).unwrap();
        }
    }
}

struct Pool {
    queues: Vec<Arc<Queue>>,
    stop: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pool {
    fn new(pool_size: usize) -> Self {
        let queues: Vec<Arc<Queue>> = (0..pool_size).map(|_| Arc::new(Queue::new())).collect();
        let stop = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(pool_size);
        for queue in &queues {
            let queue = Arc::clone(queue);
            let stop = Arc::clone(&stop);
            workers.push(std::thread::spawn(move || {
                while let Some(item) = queue.pop(&stop) {
                    item();
                }
            }));
        }
        Self {
            queues,
            stop,
            workers: Mutex::new(workers),
        }
    }

    fn dispatch(&self, thread_id: u64, item: WorkItem) {
        let index = (thread_id % self.queues.len() as u64) as usize;
        self.queues[index].push(item);
    }

    fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        for queue in &self.queues {
            queue.cond.notify_all();
        }
        for worker in self.workers.lock().unwrap().drain(..) {
            let _ = worker.join();
        }
    }
}

/// Registry of one [`Pool`] per connected `client_id`.
pub struct ClientPool {
    pool_size: usize,
    pools: Mutex<FxHashMap<String, Arc<Pool>>>,
}

impl ClientPool {
    #[must_use]
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            pools: Mutex::new(FxHashMap::default()),
        }
    }

    /// Registers a new client, creating its worker pool. Re-registering
    /// an already-registered client replaces its pool (the previous one
    /// is shut down first).
    pub fn register(&self, client_id: &str) {
        let pool = Arc::new(Pool::new(self.pool_size));
        let previous = self
            .pools
            .lock()
            .unwrap()
            .insert(client_id.to_string(), pool);
        if let Some(previous) = previous {
            previous.shutdown();
        }
    }

    /// Dispatches `work` to the queue selected by `thread_id mod
    /// pool_size` for `client_id`. A no-op if the client is not (or no
    /// longer) registered.
    pub fn dispatch<F>(&self, client_id: &str, thread_id: u64, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(pool) = self.pools.lock().unwrap().get(client_id) {
            pool.dispatch(thread_id, Box::new(work));
        }
    }

    /// Shuts down and removes the pool for `client_id`, matching the
    /// `closed(client_id)` teardown path in `spec.md` §4.5.
    pub fn unregister(&self, client_id: &str) {
        if let Some(pool) = self.pools.lock().unwrap().remove(client_id) {
            pool.shutdown();
        }
    }
}

impl Drop for ClientPool {
    fn drop(&mut self) {
        for (_, pool) in self.pools.lock().unwrap().drain() {
            pool.shutdown();
        }
    }
}
