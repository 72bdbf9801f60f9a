use crate::RepertoryError;

/// Per-mount configuration consumed by the file manager core. Loading and
/// validating this from a CLI/config file is out of scope here; this
/// struct is the validated result such a loader would produce.
#[derive(Clone, Debug)]
pub struct FileManagerConfig {
    pub chunk_size: u64,
    pub max_concurrent_downloads: usize,
    pub max_concurrent_uploads: usize,
    pub ring_buffer_size: u64,
    pub upload_poll_interval_secs: u64,
    pub upload_quiescence_window_secs: u64,
    pub max_upload_attempts: u32,
    pub orphan_sweep_interval_secs: u64,
    pub directory_cache_ttl_secs: u64,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            max_concurrent_downloads: 5,
            max_concurrent_uploads: 1,
            ring_buffer_size: 0,
            upload_poll_interval_secs: 5,
            upload_quiescence_window_secs: 2,
            max_upload_attempts: 5,
            orphan_sweep_interval_secs: 300,
            directory_cache_ttl_secs: 120,
        }
    }
}

impl FileManagerConfig {
    /// Validates the ring-buffer size against `chunk_size`, matching
    /// `spec.md` §4.8.3: zero disables ring-buffer mode, otherwise the
    /// size must be a positive multiple of `chunk_size`.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::InvalidRingBufferSize`] when the
    /// configured chunk size is zero, or
    /// [`RepertoryError::InvalidRingBufferMultiple`] when `ring_buffer_size`
    /// is not an exact multiple of it.
    pub fn validate_ring_buffer(&self) -> Result<(), RepertoryError> {
        if self.ring_buffer_size == 0 {
            return Ok(());
        }
        if self.chunk_size == 0 {
            return Err(RepertoryError::EmptyRingBufferChunkSize(None));
        }
        if self.ring_buffer_size % self.chunk_size != 0 {
            return Err(RepertoryError::InvalidRingBufferMultiple(Some(format!(
                "ring_buffer_size {} is not a multiple of chunk_size {}",
                self.ring_buffer_size, self.chunk_size
            ))));
        }
        Ok(())
    }

    #[must_use]
    pub const fn ring_buffer_enabled(&self) -> bool {
        self.ring_buffer_size > 0
    }
}

/// Connection parameters for the peer "remote" mount's packet transport.
/// Concrete wire-shaping for S3/Sia providers is out of scope; this struct
/// covers only what `repertory-packet` needs to dial a peer.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub encryption_token: Option<String>,
    pub pool_size: usize,
    pub max_connect_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            encryption_token: None,
            pool_size: 10,
            max_connect_retries: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ring_buffer_is_valid() {
        let config = FileManagerConfig::default();
        assert!(config.validate_ring_buffer().is_ok());
        assert!(!config.ring_buffer_enabled());
    }

    #[test]
    fn non_multiple_ring_buffer_is_rejected() {
        let config = FileManagerConfig {
            chunk_size: 1024,
            ring_buffer_size: 1500,
            ..FileManagerConfig::default()
        };
        assert_eq!(
            config.validate_ring_buffer().unwrap_err().name(),
            "invalid_ring_buffer_multiple"
        );
    }

    #[test]
    fn multiple_ring_buffer_is_accepted() {
        let config = FileManagerConfig {
            chunk_size: 1024,
            ring_buffer_size: 4096,
            ..FileManagerConfig::default()
        };
        assert!(config.validate_ring_buffer().is_ok());
        assert!(config.ring_buffer_enabled());
    }
}
