//! The chunked on-demand downloader, `spec.md` §4.8.2, including the
//! +0.2%-boundary progress events from `SPEC_FULL.md` §4.8 and the
//! ring-buffer retirement of [`crate::ring_buffer`] for sequential reads.

use crate::open_file::OpenFile;
use crate::ring_buffer;
use events::types::{DownloadProgress, DownloadRestoreFailed, DownloadRestored, DownloadStopped};
use events::EventBus;
use provider::{FileManagerConfig, Provider, RepertoryError};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use sync::Throttle;

/// `500 = 1 / 0.2%`: the original's percent-boundary granularity.
const PROGRESS_GRANULARITY: u64 = 500;

fn downloaded_fraction(open_file: &OpenFile) -> (u64, u64) {
    let inner = open_file.inner.lock().unwrap();
    let total = inner.chunk_count().max(1);
    let done = (0..inner.chunk_count())
        .filter(|c| inner.chunk_state.is_set(*c))
        .count() as u64;
    (done, total)
}

fn maybe_publish_progress(open_file: &OpenFile, bus: &EventBus, api_path: &str, before: u64) {
    let (done, total) = downloaded_fraction(open_file);
    let before_boundary = before * PROGRESS_GRANULARITY / total;
    let after_boundary = done * PROGRESS_GRANULARITY / total;
    if after_boundary != before_boundary || done == total {
        bus.publish(DownloadProgress {
            api_path: api_path.to_string(),
            progress_percent: (done as f64 / total as f64) * 100.0,
        });
    }
}

/// Fetches whatever chunks covering `[offset, offset+len)` are not yet
/// present, then reads the requested range from the source file.
///
/// # Errors
///
/// Returns [`RepertoryError::DownloadStopped`] if unmount is observed
/// mid-fetch, or a provider/I/O error otherwise.
pub fn read(
    open_file: &Arc<OpenFile>,
    provider: &dyn Provider,
    throttle: &Throttle,
    bus: &EventBus,
    config: &FileManagerConfig,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>, RepertoryError> {
    if len == 0 {
        return Ok(Vec::new());
    }

    let (api_path, source_path, chunk_size) = {
        let inner = open_file.inner.lock().unwrap();
        (inner.api_path.clone(), inner.source_path.clone(), inner.chunk_size)
    };
    if chunk_size == 0 {
        return Err(RepertoryError::InvalidOperation(Some(
            "chunk_size is zero".to_string(),
        )));
    }

    let first_chunk = offset / chunk_size;
    let last_chunk = (offset + len - 1) / chunk_size;

    for chunk in first_chunk..=last_chunk {
        ensure_chunk_present(
            open_file,
            provider,
            throttle,
            bus,
            &api_path,
            &source_path,
            chunk,
        )?;

        let previous = open_file.inner.lock().unwrap().last_read_chunk;
        if ring_buffer::looks_sequential(previous, chunk) {
            ring_buffer::retire_outside_window(open_file, config, chunk);
        }
        open_file.inner.lock().unwrap().last_read_chunk = Some(chunk);
    }

    let mut file = OpenOptions::new()
        .read(true)
        .open(&source_path)
        .map_err(RepertoryError::from)?;
    file.seek(SeekFrom::Start(offset))
        .map_err(RepertoryError::from)?;
    let mut buf = vec![0_u8; len as usize];
    let read = file.read(&mut buf).map_err(RepertoryError::from)?;
    buf.truncate(read);
    Ok(buf)
}

pub(crate) fn ensure_chunk_present(
    open_file: &Arc<OpenFile>,
    provider: &dyn Provider,
    throttle: &Throttle,
    bus: &EventBus,
    api_path: &str,
    source_path: &str,
    chunk: u64,
) -> Result<(), RepertoryError> {
    loop {
        let mut inner = open_file.inner.lock().unwrap();
        if inner.chunk_state.is_set(chunk) {
            return Ok(());
        }
        if inner.stop_requested {
            bus.publish(DownloadStopped {
                api_path: api_path.to_string(),
                chunk_index: chunk,
                handle_id: None,
            });
            return Err(RepertoryError::DownloadStopped(Some(api_path.to_string())));
        }
        if inner.active_downloads.contains(&chunk) {
            inner = open_file.cond.wait(inner).unwrap();
            drop(inner);
            continue;
        }
        inner.active_downloads.insert(chunk);
        drop(inner);
        break;
    }

    let (before_done, _) = downloaded_fraction(open_file);

    throttle.acquire();
    let result = fetch_chunk(provider, source_path, api_path, chunk, open_file);
    throttle.release();

    let mut inner = open_file.inner.lock().unwrap();
    inner.active_downloads.remove(&chunk);
    match result {
        Ok(()) => {
            inner.chunk_state.set(chunk);
            drop(inner);
            open_file.cond.notify_all();
            maybe_publish_progress(open_file, bus, api_path, before_done);
            Ok(())
        }
        Err(error) => {
            drop(inner);
            open_file.cond.notify_all();
            Err(error)
        }
    }
}

fn fetch_chunk(
    provider: &dyn Provider,
    source_path: &str,
    api_path: &str,
    chunk: u64,
    open_file: &Arc<OpenFile>,
) -> Result<(), RepertoryError> {
    let chunk_size = open_file.inner.lock().unwrap().chunk_size;
    let mut buf = vec![0_u8; chunk_size as usize];
    let read = provider.download_chunk(api_path, chunk, &mut buf)?;
    buf.truncate(read);

    let mut file = OpenOptions::new()
        .write(true)
        .open(source_path)
        .map_err(RepertoryError::from)?;
    file.seek(SeekFrom::Start(chunk * chunk_size))
        .map_err(RepertoryError::from)?;
    file.write_all(&buf).map_err(RepertoryError::from)?;
    Ok(())
}

/// Validates a persisted chunk bitmap recovered for `api_path` against
/// the provider's and source file's current size, publishing
/// [`DownloadRestored`] on acceptance or [`DownloadRestoreFailed`] (and
/// discarding the restored state) on disagreement.
#[must_use]
pub fn accept_or_reject_restored_state(
    bus: &EventBus,
    api_path: &str,
    restored_chunks: usize,
    provider_size: u64,
    source_size: u64,
    chunk_size: u64,
    configured_chunk_size: u64,
) -> bool {
    if provider_size != source_size || chunk_size != configured_chunk_size {
        bus.publish(DownloadRestoreFailed {
            api_path: api_path.to_string(),
            reason: format!(
                "provider_size={provider_size} source_size={source_size} chunk_size={chunk_size} configured={configured_chunk_size}"
            ),
        });
        return false;
    }
    bus.publish(DownloadRestored {
        api_path: api_path.to_string(),
        chunks_restored: restored_chunks,
    });
    true
}
