#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dircache` is the short-lived mapping from a directory's `api_path` and
//! the open handles reading it to the immutable [`DirectorySnapshot`]
//! captured at `opendir` time.
//!
//! # Design
//!
//! A single `Mutex` over the whole table, matching the original
//! `directory_cache`'s single-lock design (`directory_cache.cpp`): listing
//! directories is not hot enough to warrant sharding. A background thread
//! sweeps entries older than a configured TTL every 120 seconds
//! (`service_function` in the original), independent of handle
//! attachment — a snapshot outliving every handle that opened it is
//! evicted on the next sweep rather than held forever.
//!
//! # Invariants
//!
//! - `set` is idempotent per `(api_path, handle)`: setting the same pair
//!   twice does not duplicate the handle.
//! - `remove(handle)` drops the entry once its last handle detaches.
//! - `remove(api_path)` evicts unconditionally, detaching every handle.

use provider::DirectorySnapshot;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct Entry {
    snapshot: Arc<DirectorySnapshot>,
    handles: FxHashSet<u64>,
    inserted_at: Instant,
}

struct Inner {
    by_path: FxHashMap<String, Entry>,
    by_handle: FxHashMap<u64, String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            by_path: FxHashMap::default(),
            by_handle: FxHashMap::default(),
        }
    }

    fn drop_path(&mut self, api_path: &str) {
        if let Some(entry) = self.by_path.remove(api_path) {
            for handle in entry.handles {
                self.by_handle.remove(&handle);
            }
        }
    }
}

/// The directory listing cache.
pub struct DirectoryCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    stop: Mutex<bool>,
    stop_cond: Condvar,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryCache {
    /// Creates a cache and starts its background TTL sweeper.
    #[must_use]
    pub fn new(ttl: Duration) -> Arc<Self> {
        let cache = Arc::new(Self {
            inner: Mutex::new(Inner::new()),
            ttl,
            stop: Mutex::new(false),
            stop_cond: Condvar::new(),
            sweeper: Mutex::new(None),
        });

        let sweep_cache = Arc::clone(&cache);
        let handle = std::thread::spawn(move || sweep_cache.run_sweeper());
        *cache.sweeper.lock().unwrap() = Some(handle);

        cache
    }

    fn run_sweeper(&self) {
        let mut stop = self.stop.lock().unwrap();
        loop {
            let (guard, timeout_result) = self
                .stop_cond
                .wait_timeout(stop, Duration::from_secs(120))
                .unwrap();
            stop = guard;
            if *stop {
                return;
            }
            if timeout_result.timed_out() {
                drop(std::mem::replace(&mut stop, self.sweep_expired()));
            }
        }
    }

    fn sweep_expired(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .by_path
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= self.ttl)
            .map(|(path, _)| path.clone())
            .collect();
        for path in expired {
            inner.drop_path(&path);
        }
        *self.stop.lock().unwrap()
    }

    /// Associates `handle` with `api_path`'s snapshot, inserting the
    /// snapshot if this is the first handle to open it.
    pub fn set(&self, api_path: &str, handle: u64, snapshot: DirectorySnapshot) {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .by_path
            .entry(api_path.to_string())
            .or_insert_with(|| Entry {
                snapshot: Arc::new(snapshot),
                handles: FxHashSet::default(),
                inserted_at: Instant::now(),
            });
        entry.handles.insert(handle);
        inner.by_handle.insert(handle, api_path.to_string());
    }

    /// Returns the snapshot associated with `handle`, if any.
    #[must_use]
    pub fn get(&self, handle: u64) -> Option<Arc<DirectorySnapshot>> {
        let inner = self.inner.lock().unwrap();
        let api_path = inner.by_handle.get(&handle)?;
        inner.by_path.get(api_path).map(|e| Arc::clone(&e.snapshot))
    }

    /// Detaches `handle`; the entry is dropped once its last handle
    /// detaches.
    pub fn remove_handle(&self, handle: u64) {
        let mut inner = self.inner.lock().unwrap();
        let Some(api_path) = inner.by_handle.remove(&handle) else {
            return;
        };
        if let Some(entry) = inner.by_path.get_mut(&api_path) {
            entry.handles.remove(&handle);
            if entry.handles.is_empty() {
                inner.by_path.remove(&api_path);
            }
        }
    }

    /// Evicts `api_path` unconditionally, detaching every handle that
    /// held it.
    pub fn remove_path(&self, api_path: &str) {
        self.inner.lock().unwrap().drop_path(api_path);
    }

    /// Invokes `action` with the snapshot for `api_path` while holding the
    /// cache lock, if an entry exists.
    pub fn execute<F, R>(&self, api_path: &str, action: F) -> Option<R>
    where
        F: FnOnce(&DirectorySnapshot) -> R,
    {
        let inner = self.inner.lock().unwrap();
        inner
            .by_path
            .get(api_path)
            .map(|entry| action(&entry.snapshot))
    }

    /// Stops the background sweeper thread.
    pub fn shutdown(&self) {
        *self.stop.lock().unwrap() = true;
        self.stop_cond.notify_all();
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::DirectoryItem;

    fn snapshot(name: &str) -> DirectorySnapshot {
        DirectorySnapshot::new(vec![DirectoryItem {
            name: name.to_string(),
            attrs: Default::default(),
        }])
    }

    #[test]
    fn set_then_get_returns_snapshot() {
        let cache = DirectoryCache::new(Duration::from_secs(120));
        cache.set("/dir", 1, snapshot("a"));
        let snap = cache.get(1).unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn remove_handle_drops_entry_when_last_handle_leaves() {
        let cache = DirectoryCache::new(Duration::from_secs(120));
        cache.set("/dir", 1, snapshot("a"));
        cache.set("/dir", 2, snapshot("a"));
        cache.remove_handle(1);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        cache.remove_handle(2);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn remove_path_evicts_regardless_of_handles() {
        let cache = DirectoryCache::new(Duration::from_secs(120));
        cache.set("/dir", 1, snapshot("a"));
        cache.set("/dir", 2, snapshot("a"));
        cache.remove_path("/dir");
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn execute_runs_under_lock_when_present() {
        let cache = DirectoryCache::new(Duration::from_secs(120));
        cache.set("/dir", 1, snapshot("a"));
        let len = cache.execute("/dir", |snap| snap.len());
        assert_eq!(len, Some(1));
        assert_eq!(cache.execute("/missing", |snap| snap.len()), None);
    }

    #[test]
    fn set_is_idempotent_per_handle() {
        let cache = DirectoryCache::new(Duration::from_secs(120));
        cache.set("/dir", 1, snapshot("a"));
        cache.set("/dir", 1, snapshot("a"));
        cache.remove_handle(1);
        assert!(cache.get(1).is_none());
    }
}
