#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `provider` holds the parts of this workspace that have exactly one
//! concrete shape regardless of which backend (S3, Sia, peer remote)
//! eventually sits behind it: the stable error taxonomy, the shared data
//! model (`FilesystemItem`, `DirectorySnapshot`), validated configuration
//! structs, and the trait seams for the collaborators this specification
//! treats as external (provider wire shaping, source-path naming,
//! platform mount locking).
//!
//! # Design
//!
//! Errors follow `crates/core`'s `ClientError` pattern: a `thiserror` enum
//! with a stable `name()` independent of the `Display` message, so log
//! lines and [`events`]-bound JSON stay stable across message wording
//! changes.

mod api_path;
mod config;
mod error;
mod model;
mod traits;

pub use api_path::{normalize as normalize_api_path, parent as api_path_parent, MAX_COMPONENT_LEN};
pub use config::{FileManagerConfig, RemoteConfig};
pub use error::{RepertoryError, RepertoryResult};
pub use model::{meta_keys, DirectoryItem, DirectorySnapshot, FilesystemItem};
pub use traits::{MountLock, NullMountLock, Provider, SourcePathAllocator};
