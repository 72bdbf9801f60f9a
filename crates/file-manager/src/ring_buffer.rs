//! Ring-buffer chunk retention, `spec.md` §4.8.3: when enabled and a
//! handle is reading sequentially, chunks that fall behind the retained
//! window are forgotten again instead of being kept forever.

use crate::open_file::OpenFile;
use provider::FileManagerConfig;

/// After chunk `current` has been fetched for a sequentially-reading
/// handle, forgets any earlier chunk that now falls outside the
/// configured window, so a long sequential read does not retain the
/// entire file on disk.
///
/// A no-op when ring-buffer mode is disabled
/// ([`FileManagerConfig::ring_buffer_enabled`] is `false`).
pub fn retire_outside_window(open_file: &OpenFile, config: &FileManagerConfig, current: u64) {
    if !config.ring_buffer_enabled() || config.chunk_size == 0 {
        return;
    }
    let window_chunks = config.ring_buffer_size / config.chunk_size;
    if current < window_chunks {
        return;
    }
    let retire_before = current - window_chunks;

    let mut inner = open_file.inner.lock().unwrap();
    for chunk in 0..retire_before {
        if inner.active_downloads.contains(&chunk) {
            continue;
        }
        inner.chunk_state.unset(chunk);
    }
}

/// `true` when the read pattern observed on `open_file` looks
/// sequential enough to apply ring-buffer retirement: the chunk just
/// fetched immediately follows the previous one requested.
#[must_use]
pub const fn looks_sequential(previous_chunk: Option<u64>, current_chunk: u64) -> bool {
    matches!(previous_chunk, Some(p) if p + 1 == current_chunk)
}
