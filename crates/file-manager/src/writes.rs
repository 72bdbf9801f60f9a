//! Write, resize, and rename interlocks over an open file, `spec.md`
//! §4.8.4.

use crate::downloader;
use crate::open_file::OpenFile;
use crate::registry::OpenFileRegistry;
use dircache::DirectoryCache;
use metastore::MetaStore;
use provider::{Provider, RepertoryError};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write as _};
use std::sync::Arc;
use sync::Throttle;
use upload_queue::UploadQueue;

/// Writes `data` at `offset`, force-presenting whichever chunks it fully
/// covers (no provider fetch needed — the new bytes supersede whatever
/// was there) and downloading the edge chunks it only partially covers
/// before overlaying `data` on top of them.
///
/// # Errors
///
/// Propagates I/O errors and, for the edge chunks, whatever
/// [`downloader::ensure_chunk_present`] returns.
pub fn write(
    open_file: &Arc<OpenFile>,
    provider: &dyn Provider,
    throttle: &Throttle,
    bus: &events::EventBus,
    offset: u64,
    data: &[u8],
) -> Result<usize, RepertoryError> {
    if data.is_empty() {
        return Ok(0);
    }

    let (api_path, source_path, chunk_size) = {
        let inner = open_file.inner.lock().unwrap();
        (
            inner.api_path.clone(),
            inner.source_path.clone(),
            inner.chunk_size,
        )
    };
    if chunk_size == 0 {
        return Err(RepertoryError::InvalidOperation(Some(
            "chunk_size is zero".to_string(),
        )));
    }

    let end = offset + data.len() as u64;
    let first_chunk = offset / chunk_size;
    let last_chunk = (end - 1) / chunk_size;

    // Grow `size`/`chunk_state` up front so the per-chunk loop below can
    // set bits for chunks the write extends into. Re-checks `end >
    // inner.size` under the same lock that performs the mutation, since a
    // concurrent extending write on another handle to this open_file could
    // otherwise grow `size` between an unlocked check and this one.
    {
        let mut inner = open_file.inner.lock().unwrap();
        if end > inner.size {
            inner.size = end;
            let new_chunk_count = inner.chunk_count();
            inner.chunk_state.resize(new_chunk_count);
        }
    }

    for chunk in first_chunk..=last_chunk {
        let chunk_start = chunk * chunk_size;
        let chunk_end = chunk_start + chunk_size;
        let fully_covered = offset <= chunk_start && end >= chunk_end;
        if fully_covered {
            open_file.inner.lock().unwrap().chunk_state.set(chunk);
        } else {
            downloader::ensure_chunk_present(
                open_file, provider, throttle, bus, &api_path, &source_path, chunk,
            )?;
        }
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&source_path)
        .map_err(RepertoryError::from)?;
    file.seek(SeekFrom::Start(offset))
        .map_err(RepertoryError::from)?;
    file.write_all(data).map_err(RepertoryError::from)?;

    open_file.inner.lock().unwrap().modified = true;
    Ok(data.len())
}

/// Truncates or extends the source file to `new_size`, resizing
/// `chunk_state` under the same lock so readers never observe a size/bitmap
/// mismatch.
///
/// # Errors
///
/// Propagates `std::fs::File::set_len` I/O errors.
pub fn resize(open_file: &Arc<OpenFile>, new_size: u64) -> Result<(), RepertoryError> {
    let source_path = open_file.inner.lock().unwrap().source_path.clone();
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&source_path)
        .map_err(RepertoryError::from)?;
    file.set_len(new_size).map_err(RepertoryError::from)?;

    let mut inner = open_file.inner.lock().unwrap();
    inner.size = new_size;
    inner.modified = true;
    let new_chunk_count = inner.chunk_count();
    inner.chunk_state.resize(new_chunk_count);
    Ok(())
}

/// Renames `from` to `to` across every subsystem that indexes by
/// `api_path`, in a fixed lock order (lexicographically smaller path
/// first) to avoid deadlocking against a concurrent rename of the same
/// pair in the opposite direction.
///
/// # Errors
///
/// Returns [`RepertoryError::ItemExists`] if `to` is already open or
/// present in the metadata store and `overwrite` is `false`.
pub fn rename(
    registry: &OpenFileRegistry,
    meta: &MetaStore,
    dir_cache: &DirectoryCache,
    upload_queue: &UploadQueue,
    from: &str,
    to: &str,
    overwrite: bool,
) -> Result<(), RepertoryError> {
    let (first, second) = if from <= to { (from, to) } else { (to, from) };
    let first_open_file = registry.get(first);
    let mut first_guard = first_open_file.as_ref().map(|f| f.inner.lock().unwrap());
    let second_open_file = registry.get(second);
    let mut second_guard = second_open_file.as_ref().map(|f| f.inner.lock().unwrap());

    let to_exists = matches!(
        meta.get_item_meta_value(to, provider::meta_keys::SOURCE_PATH),
        Ok(Some(_))
    );
    if !overwrite && to_exists {
        return Err(RepertoryError::ItemExists(Some(to.to_string())));
    }

    meta.rename_item_meta(from, to)?;
    dir_cache.remove_path(from);
    dir_cache.remove_path(to);

    if let Ok(Some(entry)) = upload_queue.dequeue() {
        if entry.api_path == from {
            upload_queue.remove(from)?;
            upload_queue.enqueue(to, &entry.source_path)?;
        }
    }

    registry.rekey(from, to);
    // `from`'s open_file, if any, is now keyed under `to`; its lock is
    // already held above (as either the first or second guard depending
    // on lexicographic order), so update `api_path` through that guard
    // rather than looking it up again (the mutex is not reentrant).
    if let Some(guard) = first_guard.as_mut().filter(|_| first == from) {
        guard.api_path = to.to_string();
    } else if let Some(guard) = second_guard.as_mut().filter(|_| second == from) {
        guard.api_path = to.to_string();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_state::ChunkState;
    use events::EventBus;
    use provider::FilesystemItem;
    use std::io::Read as _;

    struct NullProvider;
    impl Provider for NullProvider {
        fn resolve(&self, _api_path: &str) -> Result<FilesystemItem, RepertoryError> {
            unimplemented!()
        }
        fn download_chunk(
            &self,
            _api_path: &str,
            _chunk_index: u64,
            buf: &mut [u8],
        ) -> Result<usize, RepertoryError> {
            buf.fill(9);
            Ok(buf.len())
        }
        fn upload(&self, _api_path: &str, _source_path: &str) -> Result<(), RepertoryError> {
            Ok(())
        }
    }

    fn setup(size: u64, chunk_size: u64) -> (Arc<OpenFile>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("cached").to_string_lossy().to_string();
        std::fs::write(&source_path, vec![0_u8; size as usize]).unwrap();
        let chunk_count = size.div_ceil(chunk_size.max(1));
        let open_file = Arc::new(OpenFile::new(
            "/a".to_string(),
            source_path,
            size,
            chunk_size,
            ChunkState::new(chunk_count),
        ));
        (open_file, dir)
    }

    #[test]
    fn write_fully_covering_a_chunk_skips_the_provider() {
        let (open_file, _dir) = setup(8, 4);
        let provider = NullProvider;
        let throttle = Throttle::new(4);
        let bus = EventBus::new();

        write(&open_file, &provider, &throttle, &bus, 0, &[1, 2, 3, 4]).unwrap();
        assert!(open_file.inner.lock().unwrap().chunk_state.is_set(0));
        assert!(!open_file.inner.lock().unwrap().chunk_state.is_set(1));
        assert!(open_file.is_modified());
    }

    #[test]
    fn write_extends_size_and_chunk_state() {
        let (open_file, _dir) = setup(4, 4);
        let provider = NullProvider;
        let throttle = Throttle::new(4);
        let bus = EventBus::new();

        write(&open_file, &provider, &throttle, &bus, 4, &[5, 6, 7, 8]).unwrap();
        assert_eq!(open_file.size(), 8);
        assert!(open_file.inner.lock().unwrap().chunk_state.is_set(1));
    }

    #[test]
    fn rename_moves_meta_and_updates_the_open_instance_api_path() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::open(&dir.path().join("meta")).unwrap();
        let upload_queue = UploadQueue::open(&dir.path().join("upload")).unwrap();
        let dir_cache = DirectoryCache::new(std::time::Duration::from_secs(60));
        let registry = OpenFileRegistry::new();

        meta.set_item_meta("/a", provider::meta_keys::SOURCE_PATH, "/cache/a")
            .unwrap();
        let open_file = registry.get_or_insert_with("/a", || {
            Arc::new(OpenFile::new(
                "/a".to_string(),
                "/cache/a".to_string(),
                4,
                4,
                ChunkState::new(1),
            ))
        });

        rename(&registry, &meta, &dir_cache, &upload_queue, "/a", "/b", false).unwrap();

        assert!(registry.get("/a").is_none());
        let renamed = registry.get("/b").unwrap();
        assert!(Arc::ptr_eq(&open_file, &renamed));
        assert_eq!(open_file.api_path(), "/b");
        assert_eq!(
            meta.get_item_meta_value("/b", provider::meta_keys::SOURCE_PATH)
                .unwrap(),
            Some("/cache/a".to_string())
        );
    }

    #[test]
    fn rename_rejects_an_existing_destination_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::open(&dir.path().join("meta")).unwrap();
        let upload_queue = UploadQueue::open(&dir.path().join("upload")).unwrap();
        let dir_cache = DirectoryCache::new(std::time::Duration::from_secs(60));
        let registry = OpenFileRegistry::new();

        meta.set_item_meta("/a", provider::meta_keys::SOURCE_PATH, "/cache/a")
            .unwrap();
        meta.set_item_meta("/b", provider::meta_keys::SOURCE_PATH, "/cache/b")
            .unwrap();

        let error = rename(&registry, &meta, &dir_cache, &upload_queue, "/a", "/b", false)
            .unwrap_err();
        assert_eq!(error.name(), "item_exists");
    }

    #[test]
    fn resize_truncates_file_and_bitmap() {
        let (open_file, dir) = setup(8, 4);
        {
            let mut inner = open_file.inner.lock().unwrap();
            inner.chunk_state.set(0);
            inner.chunk_state.set(1);
        }
        resize(&open_file, 3).unwrap();
        assert_eq!(open_file.size(), 3);
        let mut buf = Vec::new();
        std::fs::File::open(dir.path().join("cached"))
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 3);
    }
}
