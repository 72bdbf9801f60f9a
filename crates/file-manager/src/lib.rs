#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `file-manager` is the open-file lifecycle, chunked on-demand
//! downloader, and upload/rename/resize interlocks for a remote-object
//! mount, `spec.md` §4.8. It sits above `provider` (the network seam),
//! `metastore`/`upload-queue` (persistence), `dircache` (directory
//! listing cache), and `events` (observability), and is the collaborator
//! a FUSE/WinFsp adapter calls into for every file operation.
//!
//! # Design
//!
//! Every currently-open `api_path` has exactly one shared [`OpenFile`],
//! held in [`OpenFileRegistry`] and guarded by a single lock (`spec.md`
//! §5). [`manager::FileManager`] is the facade: `open`/`read`/`write`/
//! `resize`/`rename`/`close` each look the `open_file` up once and hand
//! off to the submodule that owns that concern.
//!
//! # Invariants
//!
//! - A chunk's bit in `chunk_state` is only ever set under the owning
//!   `open_file`'s lock, after the bytes it represents are already on
//!   disk (`spec.md` §3).
//! - `close` only enqueues an upload and evicts the registry entry once
//!   every chunk is present and no concurrent `open` reclaimed the
//!   handle count first (`spec.md` §4.8.7).

pub mod chunk_state;
pub mod downloader;
pub mod manager;
pub mod open_file;
pub mod registry;
pub mod ring_buffer;
pub mod sweeper;
pub mod uploader;
pub mod writes;

pub use chunk_state::ChunkState;
pub use manager::FileManager;
pub use open_file::{OpenFile, OpenFileData, OpenFileLifecycle};
pub use registry::OpenFileRegistry;
pub use sweeper::OrphanSweeper;
pub use uploader::Uploader;
