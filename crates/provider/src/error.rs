use thiserror::Error;

/// Result alias used across every crate in this workspace.
pub type RepertoryResult<T> = Result<T, RepertoryError>;

/// The full stable error taxonomy, carrying an optional context string per
/// variant for logging and `to_json` rendering on the event bus.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum RepertoryError {
    #[error("access denied{}", context_suffix(.0))]
    AccessDenied(Option<String>),
    #[error("bad address{}", context_suffix(.0))]
    BadAddress(Option<String>),
    #[error("buffer overflow{}", context_suffix(.0))]
    BufferOverflow(Option<String>),
    #[error("buffer too small{}", context_suffix(.0))]
    BufferTooSmall(Option<String>),
    #[error("communication error{}", context_suffix(.0))]
    CommError(Option<String>),
    #[error("decryption error{}", context_suffix(.0))]
    DecryptionError(Option<String>),
    #[error("directory end of files{}", context_suffix(.0))]
    DirectoryEndOfFiles(Option<String>),
    #[error("directory exists{}", context_suffix(.0))]
    DirectoryExists(Option<String>),
    #[error("directory not empty{}", context_suffix(.0))]
    DirectoryNotEmpty(Option<String>),
    #[error("directory not found{}", context_suffix(.0))]
    DirectoryNotFound(Option<String>),
    #[error("download failed{}", context_suffix(.0))]
    DownloadFailed(Option<String>),
    #[error("download incomplete{}", context_suffix(.0))]
    DownloadIncomplete(Option<String>),
    #[error("download stopped{}", context_suffix(.0))]
    DownloadStopped(Option<String>),
    #[error("ring buffer chunk size is empty{}", context_suffix(.0))]
    EmptyRingBufferChunkSize(Option<String>),
    #[error("ring buffer size is empty{}", context_suffix(.0))]
    EmptyRingBufferSize(Option<String>),
    #[error("error{}", context_suffix(.0))]
    Error(Option<String>),
    #[error("file in use{}", context_suffix(.0))]
    FileInUse(Option<String>),
    #[error("file size mismatch{}", context_suffix(.0))]
    FileSizeMismatch(Option<String>),
    #[error("incompatible version{}", context_suffix(.0))]
    IncompatibleVersion(Option<String>),
    #[error("invalid handle{}", context_suffix(.0))]
    InvalidHandle(Option<String>),
    #[error("invalid operation{}", context_suffix(.0))]
    InvalidOperation(Option<String>),
    #[error("invalid ring buffer multiple{}", context_suffix(.0))]
    InvalidRingBufferMultiple(Option<String>),
    #[error("invalid ring buffer size{}", context_suffix(.0))]
    InvalidRingBufferSize(Option<String>),
    #[error("invalid version{}", context_suffix(.0))]
    InvalidVersion(Option<String>),
    #[error("item exists{}", context_suffix(.0))]
    ItemExists(Option<String>),
    #[error("item not found{}", context_suffix(.0))]
    ItemNotFound(Option<String>),
    #[error("no disk space{}", context_suffix(.0))]
    NoDiskSpace(Option<String>),
    #[error("not implemented{}", context_suffix(.0))]
    NotImplemented(Option<String>),
    #[error("not supported{}", context_suffix(.0))]
    NotSupported(Option<String>),
    #[error("os error{}", context_suffix(.0))]
    OsError(Option<String>),
    #[error("out of memory{}", context_suffix(.0))]
    OutOfMemory(Option<String>),
    #[error("permission denied{}", context_suffix(.0))]
    PermissionDenied(Option<String>),
    #[error("upload failed{}", context_suffix(.0))]
    UploadFailed(Option<String>),
    #[error("upload stopped{}", context_suffix(.0))]
    UploadStopped(Option<String>),
    #[error("xattr error{}", context_suffix(.0))]
    XattrError(Option<String>),
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

impl RepertoryError {
    /// The stable lowercase snake_case name used for logging and
    /// `to_json`, independent of the `Display` message.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccessDenied(_) => "access_denied",
            Self::BadAddress(_) => "bad_address",
            Self::BufferOverflow(_) => "buffer_overflow",
            Self::BufferTooSmall(_) => "buffer_too_small",
            Self::CommError(_) => "comm_error",
            Self::DecryptionError(_) => "decryption_error",
            Self::DirectoryEndOfFiles(_) => "directory_end_of_files",
            Self::DirectoryExists(_) => "directory_exists",
            Self::DirectoryNotEmpty(_) => "directory_not_empty",
            Self::DirectoryNotFound(_) => "directory_not_found",
            Self::DownloadFailed(_) => "download_failed",
            Self::DownloadIncomplete(_) => "download_incomplete",
            Self::DownloadStopped(_) => "download_stopped",
            Self::EmptyRingBufferChunkSize(_) => "empty_ring_buffer_chunk_size",
            Self::EmptyRingBufferSize(_) => "empty_ring_buffer_size",
            Self::Error(_) => "error",
            Self::FileInUse(_) => "file_in_use",
            Self::FileSizeMismatch(_) => "file_size_mismatch",
            Self::IncompatibleVersion(_) => "incompatible_version",
            Self::InvalidHandle(_) => "invalid_handle",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::InvalidRingBufferMultiple(_) => "invalid_ring_buffer_multiple",
            Self::InvalidRingBufferSize(_) => "invalid_ring_buffer_size",
            Self::InvalidVersion(_) => "invalid_version",
            Self::ItemExists(_) => "item_exists",
            Self::ItemNotFound(_) => "item_not_found",
            Self::NoDiskSpace(_) => "no_disk_space",
            Self::NotImplemented(_) => "not_implemented",
            Self::NotSupported(_) => "not_supported",
            Self::OsError(_) => "os_error",
            Self::OutOfMemory(_) => "out_of_memory",
            Self::PermissionDenied(_) => "permission_denied",
            Self::UploadFailed(_) => "upload_failed",
            Self::UploadStopped(_) => "upload_stopped",
            Self::XattrError(_) => "xattr_error",
        }
    }

    /// Attaches (or replaces) the context string carried by this variant.
    #[must_use]
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = Some(context.into());
        match self {
            Self::AccessDenied(_) => Self::AccessDenied(context),
            Self::BadAddress(_) => Self::BadAddress(context),
            Self::BufferOverflow(_) => Self::BufferOverflow(context),
            Self::BufferTooSmall(_) => Self::BufferTooSmall(context),
            Self::CommError(_) => Self::CommError(context),
            Self::DecryptionError(_) => Self::DecryptionError(context),
            Self::DirectoryEndOfFiles(_) => Self::DirectoryEndOfFiles(context),
            Self::DirectoryExists(_) => Self::DirectoryExists(context),
            Self::DirectoryNotEmpty(_) => Self::DirectoryNotEmpty(context),
            Self::DirectoryNotFound(_) => Self::DirectoryNotFound(context),
            Self::DownloadFailed(_) => Self::DownloadFailed(context),
            Self::DownloadIncomplete(_) => Self::DownloadIncomplete(context),
            Self::DownloadStopped(_) => Self::DownloadStopped(context),
            Self::EmptyRingBufferChunkSize(_) => Self::EmptyRingBufferChunkSize(context),
            Self::EmptyRingBufferSize(_) => Self::EmptyRingBufferSize(context),
            Self::Error(_) => Self::Error(context),
            Self::FileInUse(_) => Self::FileInUse(context),
            Self::FileSizeMismatch(_) => Self::FileSizeMismatch(context),
            Self::IncompatibleVersion(_) => Self::IncompatibleVersion(context),
            Self::InvalidHandle(_) => Self::InvalidHandle(context),
            Self::InvalidOperation(_) => Self::InvalidOperation(context),
            Self::InvalidRingBufferMultiple(_) => Self::InvalidRingBufferMultiple(context),
            Self::InvalidRingBufferSize(_) => Self::InvalidRingBufferSize(context),
            Self::InvalidVersion(_) => Self::InvalidVersion(context),
            Self::ItemExists(_) => Self::ItemExists(context),
            Self::ItemNotFound(_) => Self::ItemNotFound(context),
            Self::NoDiskSpace(_) => Self::NoDiskSpace(context),
            Self::NotImplemented(_) => Self::NotImplemented(context),
            Self::NotSupported(_) => Self::NotSupported(context),
            Self::OsError(_) => Self::OsError(context),
            Self::OutOfMemory(_) => Self::OutOfMemory(context),
            Self::PermissionDenied(_) => Self::PermissionDenied(context),
            Self::UploadFailed(_) => Self::UploadFailed(context),
            Self::UploadStopped(_) => Self::UploadStopped(context),
            Self::XattrError(_) => Self::XattrError(context),
        }
    }
}

impl From<std::io::Error> for RepertoryError {
    fn from(error: std::io::Error) -> Self {
        Self::OsError(Some(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_stable_snake_case() {
        assert_eq!(RepertoryError::ItemNotFound(None).name(), "item_not_found");
    }

    #[test]
    fn with_context_preserves_variant() {
        let error = RepertoryError::ItemExists(None).with_context("/a/b");
        assert_eq!(error.name(), "item_exists");
        assert!(error.to_string().contains("/a/b"));
    }
}
