use crate::model::FilesystemItem;
use crate::RepertoryError;

/// The provider-specific collaborator the file manager fetches and pushes
/// bytes through. Concrete S3/Sia/peer-remote wire shaping is out of
/// scope; this is the seam the file manager core is written against.
pub trait Provider: Send + Sync {
    /// Resolves `api_path` to its current [`FilesystemItem`], including
    /// size and chunk size.
    fn resolve(&self, api_path: &str) -> Result<FilesystemItem, RepertoryError>;

    /// Fetches one chunk's bytes into `buf`, returning the number of
    /// bytes written (short only for the final chunk of a file).
    fn download_chunk(
        &self,
        api_path: &str,
        chunk_index: u64,
        buf: &mut [u8],
    ) -> Result<usize, RepertoryError>;

    /// Uploads the full contents of `source_path` as `api_path`.
    fn upload(&self, api_path: &str, source_path: &str) -> Result<(), RepertoryError>;
}

/// Allocates and names source-cache files for a newly opened `api_path`.
/// The naming scheme itself (content hash, sequence number, mirrored
/// path) is a provider concern and is not implemented here.
pub trait SourcePathAllocator: Send + Sync {
    /// Returns the source path that should back `api_path`, creating
    /// parent directories as needed but not the file itself.
    fn allocate(&self, api_path: &str) -> Result<String, RepertoryError>;
}

/// Advisory lock over the mount's `state/repertory_<provider>_<id>.lock`
/// file. Holding the lock for the duration of a mount is a platform
/// concern (`flock` on Unix, a named mutex on Windows); this trait is the
/// seam the process entry point is written against.
pub trait MountLock: Send + Sync {
    /// Acquires the exclusive lock, failing with
    /// [`RepertoryError::NotImplemented`] when no platform backing is
    /// compiled in.
    fn acquire(&self) -> Result<(), RepertoryError>;

    /// Releases a previously acquired lock. Idempotent.
    fn release(&self);
}

/// [`MountLock`] placeholder used where no platform lock backing has been
/// wired in. Always fails [`MountLock::acquire`] with `not_implemented`,
/// matching `spec.md` §6's "stub ... placeholder returning
/// not_implemented".
#[derive(Default)]
pub struct NullMountLock;

impl MountLock for NullMountLock {
    fn acquire(&self) -> Result<(), RepertoryError> {
        Err(RepertoryError::NotImplemented(Some(
            "platform mount lock is out of scope".to_string(),
        )))
    }

    fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_mount_lock_is_not_implemented() {
        let lock = NullMountLock;
        assert_eq!(
            lock.acquire().unwrap_err().name(),
            "not_implemented"
        );
        lock.release();
    }
}
