//! Concrete event types raised by the file manager, packet transport, and
//! meta/upload persistence layers. Each mirrors a type from the original
//! repertory's `events/types/*.hpp` index, adapted to the richer
//! [`crate::EventLevel`] taxonomy.

use crate::{Event, EventLevel};
use serde_json::json;

macro_rules! simple_event {
    ($ty:ident, $name:literal, $level:expr, |$self_:ident| $line:expr) => {
        impl Event for $ty {
            fn name(&$self_) -> &'static str {
                $name
            }

            fn level(&$self_) -> EventLevel {
                $level
            }

            fn get_single_line(&$self_) -> String {
                $line
            }

            fn to_json(&$self_) -> serde_json::Value {
                $self_.to_json_impl()
            }
        }

        impl $ty {
            /// Stable event name, usable for [`crate::EventBus::subscribe`]
            /// without constructing an instance.
            pub const NAME: &'static str = $name;
        }
    };
}

/// Raised at 0%, every +0.2% boundary, and exactly 100% while a chunked
/// download is in flight.
#[derive(Clone, Debug)]
pub struct DownloadProgress {
    pub api_path: String,
    pub progress_percent: f64,
}

simple_event!(
    DownloadProgress,
    "download_progress",
    EventLevel::Debug,
    |self| format!(
        "download_progress|{}|{:.1}%",
        self.api_path, self.progress_percent
    )
);

impl DownloadProgress {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "progress_percent": self.progress_percent})
    }
}

/// Raised when a resumed chunk bitmap is accepted on restart.
#[derive(Clone, Debug)]
pub struct DownloadRestored {
    pub api_path: String,
    pub chunks_restored: usize,
}

simple_event!(
    DownloadRestored,
    "download_restored",
    EventLevel::Info,
    |self| format!(
        "download_restored|{}|chunks={}",
        self.api_path, self.chunks_restored
    )
);

impl DownloadRestored {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "chunks_restored": self.chunks_restored})
    }
}

/// Raised when a persisted chunk bitmap disagrees with the provider or
/// source file and is discarded.
#[derive(Clone, Debug)]
pub struct DownloadRestoreFailed {
    pub api_path: String,
    pub reason: String,
}

simple_event!(
    DownloadRestoreFailed,
    "download_restore_failed",
    EventLevel::Warn,
    |self| format!("download_restore_failed|{}|{}", self.api_path, self.reason)
);

impl DownloadRestoreFailed {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "reason": self.reason})
    }
}

/// Raised when a chunk download observes `stop_requested` mid-fetch.
#[derive(Clone, Debug)]
pub struct DownloadStopped {
    pub api_path: String,
    pub chunk_index: u64,
    pub handle_id: Option<u64>,
}

simple_event!(
    DownloadStopped,
    "download_stopped",
    EventLevel::Info,
    |self| format!(
        "download_stopped|{}|chunk={}",
        self.api_path, self.chunk_index
    )
);

impl DownloadStopped {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({
            "api_path": self.api_path,
            "chunk_index": self.chunk_index,
            "handle_id": self.handle_id,
        })
    }
}

/// Raised once an upload of a modified file succeeds.
#[derive(Clone, Debug)]
pub struct FileUploadCompleted {
    pub api_path: String,
    pub source_path: String,
}

simple_event!(
    FileUploadCompleted,
    "file_upload_completed",
    EventLevel::Info,
    |self| format!("file_upload_completed|{}", self.api_path)
);

impl FileUploadCompleted {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "source_path": self.source_path})
    }
}

/// Raised on each retryable upload failure.
#[derive(Clone, Debug)]
pub struct FileUploadRetry {
    pub api_path: String,
    pub attempts: u32,
    pub reason: String,
}

simple_event!(
    FileUploadRetry,
    "file_upload_retry",
    EventLevel::Warn,
    |self| format!(
        "file_upload_retry|{}|attempts={}|{}",
        self.api_path, self.attempts, self.reason
    )
);

impl FileUploadRetry {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "attempts": self.attempts, "reason": self.reason})
    }
}

/// Raised when an upload entry is removed after a terminal failure.
#[derive(Clone, Debug)]
pub struct FileUploadRemoved {
    pub api_path: String,
    pub reason: String,
}

simple_event!(
    FileUploadRemoved,
    "file_upload_removed",
    EventLevel::Error,
    |self| format!("file_upload_removed|{}|{}", self.api_path, self.reason)
);

impl FileUploadRemoved {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "reason": self.reason})
    }
}

/// Raised by the orphan-source sweeper when it deletes an unreferenced
/// source file.
#[derive(Clone, Debug)]
pub struct OrphanedSourceFileRemoved {
    pub source_path: String,
}

simple_event!(
    OrphanedSourceFileRemoved,
    "orphaned_source_file_removed",
    EventLevel::Info,
    |self| format!("orphaned_source_file_removed|{}", self.source_path)
);

impl OrphanedSourceFileRemoved {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"source_path": self.source_path})
    }
}

/// Raised when a directory removal cannot complete (e.g. not empty).
#[derive(Clone, Debug)]
pub struct DirectoryRemoveFailed {
    pub api_path: String,
    pub reason: String,
}

simple_event!(
    DirectoryRemoveFailed,
    "directory_remove_failed",
    EventLevel::Error,
    |self| format!("directory_remove_failed|{}|{}", self.api_path, self.reason)
);

impl DirectoryRemoveFailed {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"api_path": self.api_path, "reason": self.reason})
    }
}

/// Raised when a provider is detected as unreachable.
#[derive(Clone, Debug)]
pub struct ProviderOffline {
    pub host: String,
    pub port: u16,
}

simple_event!(
    ProviderOffline,
    "provider_offline",
    EventLevel::Critical,
    |self| format!("provider_offline|{}:{}", self.host, self.port)
);

impl ProviderOffline {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"host": self.host, "port": self.port})
    }
}

/// Raised when a peer's advertised protocol version is incompatible.
#[derive(Clone, Debug)]
pub struct ProviderInvalidVersion {
    pub expected: String,
    pub actual: String,
}

simple_event!(
    ProviderInvalidVersion,
    "provider_invalid_version",
    EventLevel::Critical,
    |self| format!(
        "provider_invalid_version|expected={}|actual={}",
        self.expected, self.actual
    )
);

impl ProviderInvalidVersion {
    fn to_json_impl(&self) -> serde_json::Value {
        json!({"expected": self.expected, "actual": self.actual})
    }
}

/// Raised when a subscriber panics; delivered synchronously to avoid
/// recursing back through the async delivery path.
#[derive(Clone, Debug)]
pub struct RepertoryException {
    pub function_name: String,
    pub message: String,
}

impl RepertoryException {
    pub const NAME: &'static str = "repertory_exception";

    #[must_use]
    pub fn new(function_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            message: message.into(),
        }
    }
}

impl Event for RepertoryException {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn level(&self) -> EventLevel {
        EventLevel::Error
    }

    fn get_single_line(&self) -> String {
        format!("repertory_exception|{}|{}", self.function_name, self.message)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({"function_name": self.function_name, "message": self.message})
    }

    fn allow_async(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_includes_api_path() {
        let event = DownloadProgress {
            api_path: "/a/b".to_string(),
            progress_percent: 42.2,
        };
        assert!(event.get_single_line().contains("/a/b"));
        assert_eq!(event.name(), "download_progress");
    }

    #[test]
    fn repertory_exception_is_never_async() {
        let event = RepertoryException::new("open", "boom");
        assert!(!event.allow_async());
    }
}
