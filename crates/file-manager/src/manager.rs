//! `FileManager`: the top-level entity wiring the open-file registry,
//! downloader, uploader, and persistence layers together behind
//! `open`/`close`, `spec.md` §4.8.1 and §4.8.7.

use crate::downloader;
use crate::open_file::{OpenFile, OpenFileData, OpenFileLifecycle};
use crate::registry::OpenFileRegistry;
use crate::uploader::Uploader;
use crate::writes;
use crate::chunk_state::ChunkState;
use dircache::DirectoryCache;
use events::EventBus;
use metastore::MetaStore;
use provider::{FileManagerConfig, Provider, RepertoryError, SourcePathAllocator};
use std::sync::Arc;
use sync::Throttle;
use upload_queue::UploadQueue;

/// Owns every collaborator a mount needs to serve `open`/`read`/`write`/
/// `close`/`rename` for remote-object-backed files.
pub struct FileManager {
    registry: Arc<OpenFileRegistry>,
    provider: Arc<dyn Provider>,
    allocator: Arc<dyn SourcePathAllocator>,
    meta: Arc<MetaStore>,
    upload_queue: Arc<UploadQueue>,
    dir_cache: Arc<DirectoryCache>,
    bus: Arc<EventBus>,
    download_throttle: Throttle,
    config: FileManagerConfig,
    uploader: Arc<Uploader>,
}

impl FileManager {
    /// Builds a `FileManager` and starts its background uploader.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        allocator: Arc<dyn SourcePathAllocator>,
        meta: Arc<MetaStore>,
        upload_queue: Arc<UploadQueue>,
        dir_cache: Arc<DirectoryCache>,
        bus: Arc<EventBus>,
        config: FileManagerConfig,
    ) -> Self {
        let registry = Arc::new(OpenFileRegistry::new());
        let uploader = Uploader::spawn(
            Arc::clone(&upload_queue),
            Arc::clone(&provider),
            Arc::clone(&registry),
            Arc::clone(&bus),
            config.clone(),
        );
        let download_throttle = Throttle::new(config.max_concurrent_downloads.max(1));

        Self {
            registry,
            provider,
            allocator,
            meta,
            upload_queue,
            dir_cache,
            bus,
            download_throttle,
            config,
            uploader,
        }
    }

    /// Opens `api_path`, creating its shared [`OpenFile`] on first open
    /// (resolving through the provider and allocating a source cache
    /// file), and returns a fresh handle id.
    ///
    /// Reopening an `api_path` that is mid-`ClosingModified` cancels the
    /// pending close and rejoins the existing `open_file` instead of
    /// racing a second one into existence (`spec.md` §4.8.7).
    pub fn open(
        &self,
        api_path: &str,
        flags: u32,
        mode: u32,
        client_id: Option<String>,
    ) -> Result<u64, RepertoryError> {
        let api_path = provider::normalize_api_path(api_path)?;
        let provider = Arc::clone(&self.provider);
        let allocator = Arc::clone(&self.allocator);
        let meta = Arc::clone(&self.meta);

        let open_file = self.registry.get_or_insert_with(&api_path, || {
            create_open_file(&api_path, provider.as_ref(), allocator.as_ref(), meta.as_ref())
                .unwrap_or_else(|_| {
                    Arc::new(OpenFile::new(
                        api_path.clone(),
                        String::new(),
                        0,
                        self.config.chunk_size,
                        ChunkState::new(0),
                    ))
                })
        });

        let handle_id = self.registry.allocate_handle_id();
        {
            let mut inner = open_file.inner.lock().unwrap();
            inner.ref_count += 1;
            inner.lifecycle = OpenFileLifecycle::Open;
            inner.stop_requested = false;
            inner.handles.insert(
                handle_id,
                OpenFileData {
                    handle_id,
                    requested_flags: flags,
                    requested_mode: mode,
                    client_id,
                },
            );
        }
        self.registry.bind_handle(handle_id, &api_path);
        Ok(handle_id)
    }

    /// Reads `len` bytes at `offset` from `handle_id`'s file, fetching
    /// whatever chunks are not yet present.
    pub fn read(&self, handle_id: u64, offset: u64, len: u64) -> Result<Vec<u8>, RepertoryError> {
        let open_file = self.require_open_file(handle_id)?;
        downloader::read(
            &open_file,
            self.provider.as_ref(),
            &self.download_throttle,
            self.bus.as_ref(),
            &self.config,
            offset,
            len,
        )
    }

    /// Writes `data` at `offset` through `handle_id`'s file.
    pub fn write(&self, handle_id: u64, offset: u64, data: &[u8]) -> Result<usize, RepertoryError> {
        let open_file = self.require_open_file(handle_id)?;
        writes::write(
            &open_file,
            self.provider.as_ref(),
            &self.download_throttle,
            self.bus.as_ref(),
            offset,
            data,
        )
    }

    /// Resizes `handle_id`'s file to `new_size`.
    pub fn resize(&self, handle_id: u64, new_size: u64) -> Result<(), RepertoryError> {
        let open_file = self.require_open_file(handle_id)?;
        writes::resize(&open_file, new_size)
    }

    /// Renames `from` to `to` across every index (`spec.md` §4.8.4).
    pub fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<(), RepertoryError> {
        let from = provider::normalize_api_path(from)?;
        let to = provider::normalize_api_path(to)?;
        writes::rename(
            &self.registry,
            self.meta.as_ref(),
            self.dir_cache.as_ref(),
            self.upload_queue.as_ref(),
            &from,
            &to,
            overwrite,
        )
    }

    /// Closes `handle_id`. If it was the last handle on a modified file,
    /// blocks until every chunk is present (so the upload has a complete
    /// local copy), then enqueues the upload and evicts the `open_file` —
    /// unless a concurrent `open` reclaimed it first, which cancels the
    /// pending close (`spec.md` §4.8.7).
    pub fn close(&self, handle_id: u64) -> Result<(), RepertoryError> {
        let Some(api_path) = self.registry.unbind_handle(handle_id) else {
            return Ok(());
        };
        let Some(open_file) = self.registry.get(&api_path) else {
            return Ok(());
        };

        let (ref_count, modified) = {
            let mut inner = open_file.inner.lock().unwrap();
            inner.handles.remove(&handle_id);
            inner.ref_count = inner.ref_count.saturating_sub(1);
            (inner.ref_count, inner.modified)
        };

        if ref_count > 0 {
            return Ok(());
        }

        if !modified {
            self.registry.evict(&api_path);
            return Ok(());
        }

        open_file.inner.lock().unwrap().lifecycle = OpenFileLifecycle::ClosingModified;

        let absent: Vec<u64> = {
            let inner = open_file.inner.lock().unwrap();
            inner.chunk_state.absent_iter().collect()
        };
        for chunk in absent {
            let (api_path_str, source_path) = {
                let inner = open_file.inner.lock().unwrap();
                (inner.api_path.clone(), inner.source_path.clone())
            };
            downloader::ensure_chunk_present(
                &open_file,
                self.provider.as_ref(),
                &self.download_throttle,
                self.bus.as_ref(),
                &api_path_str,
                &source_path,
                chunk,
            )?;
        }

        let mut inner = open_file.inner.lock().unwrap();
        if inner.ref_count > 0 {
            // A concurrent open reclaimed this open_file; cancel the close.
            inner.lifecycle = OpenFileLifecycle::Open;
            return Ok(());
        }
        inner.lifecycle = OpenFileLifecycle::Uploading;
        let source_path = inner.source_path.clone();
        drop(inner);

        self.upload_queue.enqueue(&api_path, &source_path)?;
        self.registry.evict(&api_path);
        Ok(())
    }

    fn require_open_file(&self, handle_id: u64) -> Result<Arc<OpenFile>, RepertoryError> {
        self.registry
            .get_by_handle(handle_id)
            .ok_or(RepertoryError::InvalidHandle(None))
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        self.uploader.shutdown();
    }
}

fn create_open_file(
    api_path: &str,
    provider: &dyn Provider,
    allocator: &dyn SourcePathAllocator,
    meta: &MetaStore,
) -> Result<Arc<OpenFile>, RepertoryError> {
    let item = provider.resolve(api_path)?;
    let source_path = allocator.allocate(api_path)?;

    meta.set_item_meta(api_path, provider::meta_keys::SOURCE_PATH, &source_path)?;
    meta.set_item_meta(api_path, provider::meta_keys::SIZE, &item.size.to_string())?;

    let existing_bytes = std::fs::metadata(&source_path).map(|m| m.len()).unwrap_or(0);
    let chunk_count = item.chunk_count();
    let chunk_state = if existing_bytes >= item.size && item.size > 0 {
        ChunkState::new_all_present(chunk_count)
    } else {
        ChunkState::new(chunk_count)
    };

    Ok(Arc::new(OpenFile::new(
        api_path.to_string(),
        source_path,
        item.size,
        item.chunk_size,
        chunk_state,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::FilesystemItem;
    use std::sync::Mutex as StdMutex;

    struct FakeProvider {
        size: u64,
        chunk_size: u64,
    }

    impl Provider for FakeProvider {
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
            _chunk_index: u64,
            buf: &mut [u8],
        ) -> Result<usize, RepertoryError> {
            buf.fill(7);
            Ok(buf.len())
        }

        fn upload(&self, _api_path: &str, _source_path: &str) -> Result<(), RepertoryError> {
            Ok(())
        }
    }

    struct FakeAllocator {
        dir: std::path::PathBuf,
        next: StdMutex<u64>,
    }

    impl SourcePathAllocator for FakeAllocator {
        fn allocate(&self, _api_path: &str) -> Result<String, RepertoryError> {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let path = self.dir.join(format!("cached-{next}"));
            std::fs::write(&path, []).map_err(RepertoryError::from)?;
            Ok(path.to_string_lossy().to_string())
        }
    }

    fn build_manager(dir: &std::path::Path, chunk_size: u64, size: u64) -> FileManager {
        let provider: Arc<dyn Provider> = Arc::new(FakeProvider { size, chunk_size });
        let allocator: Arc<dyn SourcePathAllocator> = Arc::new(FakeAllocator {
            dir: dir.to_path_buf(),
            next: StdMutex::new(0),
        });
        let meta = Arc::new(MetaStore::open(&dir.join("meta")).unwrap());
        let upload_queue = Arc::new(UploadQueue::open(&dir.join("upload")).unwrap());
        let dir_cache = DirectoryCache::new(std::time::Duration::from_secs(60));
        let bus = EventBus::new();
        let config = FileManagerConfig {
            chunk_size,
            upload_poll_interval_secs: 1,
            upload_quiescence_window_secs: 0,
            ..FileManagerConfig::default()
        };
        FileManager::new(provider, allocator, meta, upload_queue, dir_cache, bus, config)
    }

    #[test]
    fn concurrent_first_open_returns_the_same_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = build_manager(dir.path(), 4, 16);

        let handle_a = manager.open("/a", 0, 0, None).unwrap();
        let handle_b = manager.open("/a", 0, 0, None).unwrap();

        let open_file_a = manager.registry.get_by_handle(handle_a).unwrap();
        let open_file_b = manager.registry.get_by_handle(handle_b).unwrap();
        assert!(Arc::ptr_eq(&open_file_a, &open_file_b));
        assert_eq!(open_file_a.ref_count(), 2);
    }

    #[test]
    fn close_without_modification_evicts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let manager = build_manager(dir.path(), 4, 16);

        let handle = manager.open("/a", 0, 0, None).unwrap();
        manager.close(handle).unwrap();
        assert!(manager.registry.get("/a").is_none());
    }

    struct SlowProvider {
        size: u64,
        chunk_size: u64,
    }

    impl Provider for SlowProvider {
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
            _chunk_index: u64,
            buf: &mut [u8],
        ) -> Result<usize, RepertoryError> {
            std::thread::sleep(std::time::Duration::from_millis(150));
            buf.fill(7);
            Ok(buf.len())
        }

        fn upload(&self, _api_path: &str, _source_path: &str) -> Result<(), RepertoryError> {
            Ok(())
        }
    }

    #[test]
    fn reopen_during_closing_modified_cancels_the_close() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn Provider> = Arc::new(SlowProvider {
            size: 8,
            chunk_size: 4,
        });
        let allocator: Arc<dyn SourcePathAllocator> = Arc::new(FakeAllocator {
            dir: dir.path().to_path_buf(),
            next: StdMutex::new(0),
        });
        let meta = Arc::new(MetaStore::open(&dir.path().join("meta")).unwrap());
        let upload_queue = Arc::new(UploadQueue::open(&dir.path().join("upload")).unwrap());
        let dir_cache = DirectoryCache::new(std::time::Duration::from_secs(60));
        let bus = EventBus::new();
        let config = FileManagerConfig {
            chunk_size: 4,
            upload_poll_interval_secs: 1,
            upload_quiescence_window_secs: 0,
            ..FileManagerConfig::default()
        };
        let manager = FileManager::new(provider, allocator, meta, upload_queue, dir_cache, bus, config);

        let handle = manager.open("/a", 0, 0, None).unwrap();
        // Fully covers chunk 0 only; chunk 1 stays absent and must be
        // fetched (slowly) by the close path below.
        manager.write(handle, 0, &[1, 2, 3, 4]).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                manager.close(handle).unwrap();
            });
            std::thread::sleep(std::time::Duration::from_millis(30));
            let second_handle = manager.open("/a", 0, 0, None).unwrap();
            assert!(manager.registry.get("/a").is_some());
            // Let the close thread finish before the scope tears down.
            std::thread::sleep(std::time::Duration::from_millis(200));
            assert!(manager.registry.get("/a").is_some());
            manager.close(second_handle).unwrap();
        });
    }
}
