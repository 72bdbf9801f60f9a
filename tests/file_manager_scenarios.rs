//! End-to-end scenarios across the file manager, persistence, and event
//! crates, exercised through `FileManager`'s public API rather than any
//! one crate's internals.

use dircache::DirectoryCache;
use events::EventBus;
use file_manager::FileManager;
use provider::{FileManagerConfig, FilesystemItem, Provider, RepertoryError, SourcePathAllocator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use upload_queue::UploadQueue;

struct MemoryProvider {
    size: u64,
    chunk_size: u64,
    uploaded: Mutex<Vec<(String, String)>>,
}

impl Provider for MemoryProvider {
    fn resolve(&self, api_path: &str) -> Result<FilesystemItem, RepertoryError> {
        Ok(FilesystemItem {
            api_path: api_path.to_string(),
            source_path: String::new(),
            size: self.size,
            chunk_size: self.chunk_size,
            directory: false,
            meta: Default::default(),
        })
    }

    fn download_chunk(
        &self,
        _api_path: &str,
        chunk_index: u64,
        buf: &mut [u8],
    ) -> Result<usize, RepertoryError> {
        buf.fill((chunk_index % 256) as u8);
        Ok(buf.len())
    }

    fn upload(&self, api_path: &str, source_path: &str) -> Result<(), RepertoryError> {
        self.uploaded
            .lock()
            .unwrap()
            .push((api_path.to_string(), source_path.to_string()));
        Ok(())
    }
}

struct TempAllocator {
    dir: std::path::PathBuf,
    next: AtomicU64,
}

impl SourcePathAllocator for TempAllocator {
    fn allocate(&self, _api_path: &str) -> Result<String, RepertoryError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("cache-{n}"));
        std::fs::write(&path, []).map_err(RepertoryError::from)?;
        Ok(path.to_string_lossy().to_string())
    }
}

fn build(
    dir: &std::path::Path,
    chunk_size: u64,
    size: u64,
) -> (FileManager, Arc<MemoryProvider>) {
    let provider = Arc::new(MemoryProvider {
        size,
        chunk_size,
        uploaded: Mutex::new(Vec::new()),
    });
    let allocator: Arc<dyn SourcePathAllocator> = Arc::new(TempAllocator {
        dir: dir.to_path_buf(),
        next: AtomicU64::new(0),
    });
    let meta = Arc::new(metastore::MetaStore::open(&dir.join("meta")).unwrap());
    let upload_queue = Arc::new(UploadQueue::open(&dir.join("upload")).unwrap());
    let dir_cache = DirectoryCache::new(Duration::from_secs(60));
    let bus = EventBus::new();
    let config = FileManagerConfig {
        chunk_size,
        upload_poll_interval_secs: 1,
        upload_quiescence_window_secs: 0,
        ..FileManagerConfig::default()
    };
    let manager = FileManager::new(
        Arc::clone(&provider) as Arc<dyn Provider>,
        allocator,
        meta,
        upload_queue,
        dir_cache,
        bus,
        config,
    );
    (manager, provider)
}

#[test]
fn read_fetches_chunks_then_modifying_close_enqueues_an_upload() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, provider) = build(dir.path(), 4, 16);

    let handle = manager.open("/docs/report", 0, 0o644, None).unwrap();
    let bytes = manager.read(handle, 0, 8).unwrap();
    assert_eq!(bytes.len(), 8);

    manager.write(handle, 0, &[1, 2, 3, 4]).unwrap();
    manager.close(handle).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while provider.uploaded.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    let uploaded = provider.uploaded.lock().unwrap();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].0, "/docs/report");
}

#[test]
fn rename_moves_metadata_and_preserves_the_open_instance() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _provider) = build(dir.path(), 4, 16);

    let handle = manager.open("/a", 0, 0o644, None).unwrap();
    manager.rename("/a", "/b", false).unwrap();

    // The same handle must still resolve after the rename.
    let bytes = manager.read(handle, 0, 4).unwrap();
    assert_eq!(bytes.len(), 4);
    manager.close(handle).unwrap();
}

#[test]
fn upload_queue_survives_a_simulated_restart() {
    let dir = tempfile::tempdir().unwrap();
    let queue_path = dir.path().join("upload");
    {
        let queue = UploadQueue::open(&queue_path).unwrap();
        queue.enqueue("/a", "/cache/a").unwrap();
        queue.enqueue("/b", "/cache/b").unwrap();
    }

    let reopened = UploadQueue::open(&queue_path).unwrap();
    let restored = reopened.restore_on_start().unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored[0].api_path, "/a");
    assert_eq!(restored[1].api_path, "/b");
}
