//! Orphaned source-file sweeper, `spec.md` §4.8.6: periodically scans the
//! cache directory and removes any source file the metadata store's
//! reverse index no longer resolves to an `api_path`.

use events::types::OrphanedSourceFileRemoved;
use events::EventBus;
use metastore::MetaStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Owns the background thread that periodically sweeps `cache_dir` for
/// source files with no corresponding metadata entry.
pub struct OrphanSweeper {
    stop: Arc<AtomicBool>,
    wake: Arc<Condvar>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl OrphanSweeper {
    /// Spawns the sweep thread, running once every `interval`.
    #[must_use]
    pub fn spawn(
        cache_dir: PathBuf,
        meta: Arc<MetaStore>,
        bus: Arc<EventBus>,
        interval: Duration,
    ) -> Arc<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Condvar::new());
        let lock = Arc::new(Mutex::new(()));

        let worker_stop = Arc::clone(&stop);
        let worker_wake = Arc::clone(&wake);
        let worker_lock = Arc::clone(&lock);
        let handle = std::thread::spawn(move || {
            let mut guard = worker_lock.lock().unwrap();
            while !worker_stop.load(Ordering::SeqCst) {
                sweep_once(&cache_dir, meta.as_ref(), bus.as_ref());
                let (next_guard, _) = worker_wake.wait_timeout(guard, interval).unwrap();
                guard = next_guard;
            }
        });

        Arc::new(Self {
            stop,
            wake,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Signals the worker to stop (waking it immediately) and joins it.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OrphanSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sweep_once(cache_dir: &Path, meta: &MetaStore, bus: &EventBus) {
    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let source_path = path.to_string_lossy().to_string();
        let resolved = meta.get_api_path(&source_path);
        if matches!(resolved, Ok(None)) && std::fs::remove_file(&path).is_ok() {
            bus.publish(OrphanedSourceFileRemoved { source_path });
        }
    }
}
