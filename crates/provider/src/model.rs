use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Identity and static attributes of an object as seen by the file
/// manager. Immutable except that `api_path` changes on rename and
/// `size`/`chunk_size` are fixed at open time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilesystemItem {
    pub api_path: String,
    pub source_path: String,
    pub size: u64,
    pub chunk_size: u64,
    pub directory: bool,
    pub meta: FxHashMap<String, String>,
}

impl FilesystemItem {
    /// Number of chunks needed to cover `size` bytes at `chunk_size`,
    /// i.e. `ceil(size / chunk_size)`.
    #[must_use]
    pub const fn chunk_count(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.size.div_ceil(self.chunk_size)
    }
}

/// Well-known metadata keys stored alongside an `api_path` entry in the
/// meta store. The store itself does not interpret these; attribute
/// semantics belong to the filesystem-glue layer.
pub mod meta_keys {
    pub const SIZE: &str = "size";
    pub const SOURCE_PATH: &str = "source_path";
    pub const UID: &str = "uid";
    pub const GID: &str = "gid";
    pub const MODE: &str = "mode";
    pub const ACCESSED_DATE: &str = "accessed_date";
    pub const MODIFIED_DATE: &str = "modified_date";
    pub const CHANGED_DATE: &str = "changed_date";
    pub const CREATION_DATE: &str = "creation_date";
    pub const PINNED: &str = "pinned";
}

/// One entry of a captured directory listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectoryItem {
    pub name: String,
    pub attrs: FxHashMap<String, String>,
}

/// Immutable sequence of [`DirectoryItem`] captured at `opendir` time,
/// indexed by offset for readdir-style traversal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    items: Vec<DirectoryItem>,
}

impl DirectorySnapshot {
    #[must_use]
    pub const fn new(items: Vec<DirectoryItem>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn get(&self, offset: usize) -> Option<&DirectoryItem> {
        self.items.get(offset)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectoryItem> {
        self.items.iter()
    }
}
