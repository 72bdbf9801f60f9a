#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `metastore` is the embedded ordered key/value store holding per-
//! `api_path` metadata attributes, keyed forward (`api_path → attribute
//! map`) and in reverse (`source_path → api_path`), matching the original
//! `providers/meta_db.hpp`'s two-table layout.
//!
//! # Design
//!
//! Backed by [`sled`], a pure-Rust embedded store, in place of the
//! original's SQLite-backed `meta_db` — a deliberate substitution
//! recorded in this workspace's design ledger, since `sled` needs no
//! build-time C toolchain and fills the same "embedded ordered store"
//! role. Every mutation that touches both tables (`rename_item_meta`,
//! `remove_api_path`, any `set_item_meta` call that changes
//! `source_path`) runs inside one [`sled::Transaction`] so the forward/
//! reverse invariant in `spec.md` §3 never observes a partial update.
//!
//! # Invariants
//!
//! - `source[source_path] == api_path` whenever `meta[api_path]` carries
//!   that `source_path`.
//! - `rename_item_meta(from, to)` fails with `item_exists` rather than
//!   overwriting an existing `to` entry.

use provider::{meta_keys, RepertoryError};
use rustc_hash::FxHashMap;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::Db;
use std::path::Path;

type Attributes = FxHashMap<String, String>;

/// The embedded meta store for one mount's `<data_dir>/meta/` directory.
pub struct MetaStore {
    meta: sled::Tree,
    reverse: sled::Tree,
}

impl MetaStore {
    /// Opens (creating if absent) the store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] if the underlying database
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self, RepertoryError> {
        let db: Db =
            sled::open(path).map_err(|e| RepertoryError::OsError(Some(e.to_string())))?;
        let meta = db
            .open_tree("meta")
            .map_err(|e| RepertoryError::OsError(Some(e.to_string())))?;
        let reverse = db
            .open_tree("meta_reverse")
            .map_err(|e| RepertoryError::OsError(Some(e.to_string())))?;
        Ok(Self { meta, reverse })
    }

    fn decode(bytes: &[u8]) -> Attributes {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    fn encode(attrs: &Attributes) -> Vec<u8> {
        serde_json::to_vec(attrs).unwrap_or_default()
    }

    /// Returns every attribute stored for `api_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::ItemNotFound`] if no entry exists.
    pub fn get_item_meta(&self, api_path: &str) -> Result<Attributes, RepertoryError> {
        match self
            .meta
            .get(api_path)
            .map_err(|e| RepertoryError::OsError(Some(e.to_string())))?
        {
            Some(bytes) => Ok(Self::decode(&bytes)),
            None => Err(RepertoryError::ItemNotFound(Some(api_path.to_string()))),
        }
    }

    /// Returns one attribute value for `api_path`, or `None` if either
    /// the item or the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::ItemNotFound`] if `api_path` has no
    /// entry at all.
    pub fn get_item_meta_value(
        &self,
        api_path: &str,
        key: &str,
    ) -> Result<Option<String>, RepertoryError> {
        Ok(self.get_item_meta(api_path)?.get(key).cloned())
    }

    /// Sets a single attribute, creating the item's entry if absent.
    /// Updating `source_path` maintains the reverse index atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn set_item_meta(
        &self,
        api_path: &str,
        key: &str,
        value: &str,
    ) -> Result<(), RepertoryError> {
        let mut updates = Attributes::default();
        updates.insert(key.to_string(), value.to_string());
        self.set_item_meta_map(api_path, &updates)
    }

    /// Merges `updates` into `api_path`'s attribute map, creating the
    /// entry if absent. Maintains the reverse index atomically if
    /// `updates` carries [`meta_keys::SOURCE_PATH`].
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn set_item_meta_map(
        &self,
        api_path: &str,
        updates: &Attributes,
    ) -> Result<(), RepertoryError> {
        (&self.meta, &self.reverse)
            .transaction(|(meta, reverse)| {
                let mut attrs = meta
                    .get(api_path.as_bytes())?
                    .map(|bytes| Self::decode(&bytes))
                    .unwrap_or_default();

                let previous_source = attrs.get(meta_keys::SOURCE_PATH).cloned();
                for (key, value) in updates {
                    attrs.insert(key.clone(), value.clone());
                }
                let new_source = attrs.get(meta_keys::SOURCE_PATH).cloned();

                meta.insert(api_path.as_bytes(), Self::encode(&attrs))?;
                if new_source != previous_source {
                    if let Some(old) = previous_source {
                        reverse.remove(old.as_bytes())?;
                    }
                    if let Some(new) = new_source {
                        reverse.insert(new.as_bytes(), api_path.as_bytes())?;
                    }
                }
                Ok(())
            })
            .map_err(transaction_error)
    }

    /// Removes one attribute from `api_path`'s map. A no-op if `api_path`
    /// or the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn remove_item_meta(&self, api_path: &str, key: &str) -> Result<(), RepertoryError> {
        (&self.meta, &self.reverse)
            .transaction(|(meta, reverse)| {
                let Some(bytes) = meta.get(api_path.as_bytes())? else {
                    return Ok(());
                };
                let mut attrs = Self::decode(&bytes);
                let removed_source = if key == meta_keys::SOURCE_PATH {
                    attrs.get(meta_keys::SOURCE_PATH).cloned()
                } else {
                    None
                };
                attrs.remove(key);
                meta.insert(api_path.as_bytes(), Self::encode(&attrs))?;
                if let Some(source) = removed_source {
                    reverse.remove(source.as_bytes())?;
                }
                Ok(())
            })
            .map_err(transaction_error)
    }

    /// Removes `api_path` entirely, along with its reverse-index entry.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn remove_api_path(&self, api_path: &str) -> Result<(), RepertoryError> {
        (&self.meta, &self.reverse)
            .transaction(|(meta, reverse)| {
                let Some(bytes) = meta.remove(api_path.as_bytes())? else {
                    return Ok(());
                };
                let attrs = Self::decode(&bytes);
                if let Some(source) = attrs.get(meta_keys::SOURCE_PATH) {
                    reverse.remove(source.as_bytes())?;
                }
                Ok(())
            })
            .map_err(transaction_error)
    }

    /// Atomically moves `from`'s entry to `to`, preserving its attribute
    /// map and reverse-index entry.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::ItemExists`] if `to` already has an
    /// entry, or [`RepertoryError::ItemNotFound`] if `from` does not.
    pub fn rename_item_meta(&self, from: &str, to: &str) -> Result<(), RepertoryError> {
        let result = (&self.meta, &self.reverse).transaction(|(meta, reverse)| {
            if meta.get(to.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(RenameError::Exists));
            }
            let Some(bytes) = meta.remove(from.as_bytes())? else {
                return Err(ConflictableTransactionError::Abort(RenameError::Missing));
            };
            let attrs = Self::decode(&bytes);
            meta.insert(to.as_bytes(), bytes)?;
            if let Some(source) = attrs.get(meta_keys::SOURCE_PATH) {
                reverse.insert(source.as_bytes(), to.as_bytes())?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(RenameError::Exists)) => {
                Err(RepertoryError::ItemExists(Some(to.to_string())))
            }
            Err(TransactionError::Abort(RenameError::Missing)) => {
                Err(RepertoryError::ItemNotFound(Some(from.to_string())))
            }
            Err(TransactionError::Storage(e)) => Err(RepertoryError::OsError(Some(e.to_string()))),
        }
    }

    /// Resolves a `source_path` back to its owning `api_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn get_api_path(&self, source_path: &str) -> Result<Option<String>, RepertoryError> {
        self.reverse
            .get(source_path.as_bytes())
            .map_err(|e| RepertoryError::OsError(Some(e.to_string())))?
            .map(|bytes| {
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| RepertoryError::OsError(Some(e.to_string())))
            })
            .transpose()
    }

    /// Lists every `api_path` whose `pinned` attribute is `"true"`.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn get_pinned_files(&self) -> Result<Vec<String>, RepertoryError> {
        let mut pinned = Vec::new();
        for entry in self.meta.iter() {
            let (key, value) = entry.map_err(|e| RepertoryError::OsError(Some(e.to_string())))?;
            let attrs = Self::decode(&value);
            if attrs.get(meta_keys::PINNED).map(String::as_str) == Some("true") {
                pinned.push(String::from_utf8_lossy(&key).to_string());
            }
        }
        Ok(pinned)
    }

    /// Total number of `api_path` entries stored.
    #[must_use]
    pub fn get_total_item_count(&self) -> usize {
        self.meta.len()
    }

    /// Lists every stored `api_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::OsError`] on a store failure.
    pub fn get_api_path_list(&self) -> Result<Vec<String>, RepertoryError> {
        let mut paths = Vec::with_capacity(self.meta.len());
        for key in self.meta.iter().keys() {
            let key = key.map_err(|e| RepertoryError::OsError(Some(e.to_string())))?;
            paths.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(paths)
    }
}

#[derive(Debug)]
enum RenameError {
    Exists,
    Missing,
}

fn transaction_error(error: TransactionError<()>) -> RepertoryError {
    match error {
        TransactionError::Abort(()) => RepertoryError::Error(None),
        TransactionError::Storage(e) => RepertoryError::OsError(Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (MetaStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (MetaStore::open(dir.path()).unwrap(), dir)
    }

    #[test]
    fn set_then_get_round_trips() {
        let (store, _dir) = store();
        store.set_item_meta("/a", "size", "10").unwrap();
        assert_eq!(
            store.get_item_meta_value("/a", "size").unwrap(),
            Some("10".to_string())
        );
    }

    #[test]
    fn missing_item_is_not_found() {
        let (store, _dir) = store();
        assert_eq!(
            store.get_item_meta("/missing").unwrap_err().name(),
            "item_not_found"
        );
    }

    #[test]
    fn source_path_maintains_reverse_index() {
        let (store, _dir) = store();
        store
            .set_item_meta("/a", meta_keys::SOURCE_PATH, "/cache/1")
            .unwrap();
        assert_eq!(
            store.get_api_path("/cache/1").unwrap(),
            Some("/a".to_string())
        );

        store
            .set_item_meta("/a", meta_keys::SOURCE_PATH, "/cache/2")
            .unwrap();
        assert_eq!(store.get_api_path("/cache/1").unwrap(), None);
        assert_eq!(
            store.get_api_path("/cache/2").unwrap(),
            Some("/a".to_string())
        );
    }

    #[test]
    fn rename_moves_entry_and_reverse_index() {
        let (store, _dir) = store();
        store
            .set_item_meta("/a", meta_keys::SOURCE_PATH, "/cache/1")
            .unwrap();
        store.rename_item_meta("/a", "/b").unwrap();

        assert!(store.get_item_meta("/a").is_err());
        assert_eq!(
            store.get_item_meta_value("/b", meta_keys::SOURCE_PATH).unwrap(),
            Some("/cache/1".to_string())
        );
        assert_eq!(
            store.get_api_path("/cache/1").unwrap(),
            Some("/b".to_string())
        );
    }

    #[test]
    fn rename_onto_existing_target_fails() {
        let (store, _dir) = store();
        store.set_item_meta("/a", "size", "1").unwrap();
        store.set_item_meta("/b", "size", "2").unwrap();
        assert_eq!(
            store.rename_item_meta("/a", "/b").unwrap_err().name(),
            "item_exists"
        );
    }

    #[test]
    fn remove_api_path_drops_reverse_index() {
        let (store, _dir) = store();
        store
            .set_item_meta("/a", meta_keys::SOURCE_PATH, "/cache/1")
            .unwrap();
        store.remove_api_path("/a").unwrap();
        assert!(store.get_item_meta("/a").is_err());
        assert_eq!(store.get_api_path("/cache/1").unwrap(), None);
    }

    #[test]
    fn pinned_files_are_listed() {
        let (store, _dir) = store();
        store.set_item_meta("/a", meta_keys::PINNED, "true").unwrap();
        store.set_item_meta("/b", meta_keys::PINNED, "false").unwrap();
        let pinned = store.get_pinned_files().unwrap();
        assert_eq!(pinned, vec!["/a".to_string()]);
    }

    #[test]
    fn total_item_count_and_list_agree() {
        let (store, _dir) = store();
        store.set_item_meta("/a", "size", "1").unwrap();
        store.set_item_meta("/b", "size", "2").unwrap();
        assert_eq!(store.get_total_item_count(), 2);
        let mut list = store.get_api_path_list().unwrap();
        list.sort();
        assert_eq!(list, vec!["/a".to_string(), "/b".to_string()]);
    }
}
