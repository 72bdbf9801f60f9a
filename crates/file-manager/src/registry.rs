//! The open-file registry: `api_path → open_file`, guarded by a lock, per
//! `spec.md` §4.8.1.

use crate::open_file::OpenFile;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Maps every currently-open `api_path` to its shared [`OpenFile`], plus
/// the reverse `handle_id → api_path` index used by `close`.
pub struct OpenFileRegistry {
    by_path: Mutex<FxHashMap<String, Arc<OpenFile>>>,
    by_handle: Mutex<FxHashMap<u64, String>>,
    next_handle: AtomicU64,
}

impl Default for OpenFileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenFileRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_path: Mutex::new(FxHashMap::default()),
            by_handle: Mutex::new(FxHashMap::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn allocate_handle_id(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns the existing `open_file` for `api_path`, if any.
    #[must_use]
    pub fn get(&self, api_path: &str) -> Option<Arc<OpenFile>> {
        self.by_path.lock().unwrap().get(api_path).cloned()
    }

    /// Returns the `open_file` for `handle_id`, if any.
    #[must_use]
    pub fn get_by_handle(&self, handle_id: u64) -> Option<Arc<OpenFile>> {
        let api_path = self.by_handle.lock().unwrap().get(&handle_id)?.clone();
        self.get(&api_path)
    }

    /// Registers a newly-created `open_file`, or returns the one that
    /// already exists for `api_path` (first-open-wins).
    pub fn get_or_insert_with(
        &self,
        api_path: &str,
        create: impl FnOnce() -> Arc<OpenFile>,
    ) -> Arc<OpenFile> {
        let mut by_path = self.by_path.lock().unwrap();
        Arc::clone(
            by_path
                .entry(api_path.to_string())
                .or_insert_with(create),
        )
    }

    pub fn bind_handle(&self, handle_id: u64, api_path: &str) {
        self.by_handle
            .lock()
            .unwrap()
            .insert(handle_id, api_path.to_string());
    }

    pub fn unbind_handle(&self, handle_id: u64) -> Option<String> {
        self.by_handle.lock().unwrap().remove(&handle_id)
    }

    /// Removes `api_path` from the registry, e.g. once its `open_file`
    /// has no more handles and is not retained for an in-flight upload.
    pub fn evict(&self, api_path: &str) {
        self.by_path.lock().unwrap().remove(api_path);
    }

    /// Rekeys `api_path` from `from` to `to`, preserving the same
    /// `open_file` instance (its `source_path` does not change on
    /// rename, per `spec.md` §3), and repoints every handle that was
    /// bound to `from` so `get_by_handle` keeps resolving for live
    /// handles across the rename.
    pub fn rekey(&self, from: &str, to: &str) {
        let mut by_path = self.by_path.lock().unwrap();
        if let Some(open_file) = by_path.remove(from) {
            by_path.insert(to.to_string(), open_file);
        }
        drop(by_path);

        let mut by_handle = self.by_handle.lock().unwrap();
        for api_path in by_handle.values_mut() {
            if api_path == from {
                *api_path = to.to_string();
            }
        }
    }
}
