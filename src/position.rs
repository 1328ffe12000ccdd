// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Position store (C2): remembers, per file, the byte offset already safely
//! processed, and detects rotation by comparing size/inode against the last
//! observation.

use std::path::Path;

use dashmap::DashMap;
use sha1::{Digest, Sha1};

/// Identity snapshot used to detect rotation independent of size shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    offset: u64,
    identity: Option<FileIdentity>,
}

/// In-memory position table with durable snapshot key derivation.
///
/// Durability itself (persisting to/restoring from the cold store) is driven
/// by the caller via [`PositionStore::snapshot`] / [`PositionStore::restore`]
/// so this type has no storage dependency of its own.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: DashMap<String, Entry>,
}

/// Outcome of reconciling a tailer's observation against the stored position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Read from `from` up to the file's current size.
    Continue { from: u64 },
    /// The file was rotated or truncated; position reset to 0.
    Rotated,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The durable key namespace for a file path: `position:<sha1(path)>`.
    pub fn key_for(path: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(path.as_bytes());
        format!("position:{:x}", hasher.finalize())
    }

    /// Reconciles the stored position for `path` against its current size
    /// and identity, resetting on rotation (SPEC_FULL.md §4.2/§3 FilePosition).
    pub fn reconcile(&self, path: &Path, current_size: u64, identity: FileIdentity) -> Reconciled {
        let key = path.to_string_lossy().to_string();
        let mut entry = self.positions.entry(key).or_insert(Entry {
            offset: 0,
            identity: Some(identity),
        });

        let rotated = entry.identity.is_some_and(|prev| prev != identity)
            || current_size < entry.offset;

        if rotated {
            entry.offset = 0;
            entry.identity = Some(identity);
            Reconciled::Rotated
        } else {
            entry.identity = Some(identity);
            Reconciled::Continue { from: entry.offset }
        }
    }

    pub fn advance(&self, path: &Path, new_offset: u64) {
        let key = path.to_string_lossy().to_string();
        self.positions
            .entry(key)
            .and_modify(|e| e.offset = new_offset)
            .or_insert(Entry {
                offset: new_offset,
                identity: None,
            });
    }

    pub fn offset_of(&self, path: &Path) -> u64 {
        self.positions
            .get(&path.to_string_lossy().to_string())
            .map(|e| e.offset)
            .unwrap_or(0)
    }

    /// Snapshot of all known positions for durable persistence.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.positions
            .iter()
            .map(|e| (e.key().clone(), e.value().offset))
            .collect()
    }

    /// Restores positions from a durable snapshot at startup. Identity is
    /// left unset so the first observation of each file seeds it without
    /// triggering a spurious rotation.
    pub fn restore(&self, snapshot: Vec<(String, u64)>) {
        for (path, offset) in snapshot {
            self.positions.insert(path, Entry {
                offset,
                identity: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_file_starts_at_zero() {
        let store = PositionStore::new();
        assert_eq!(store.offset_of(Path::new("/tmp/a.log")), 0);
    }

    #[test]
    fn advance_then_reconcile_continues() {
        let store = PositionStore::new();
        let path = Path::new("/tmp/a.log");
        let id = FileIdentity { dev: 1, ino: 1 };
        assert_eq!(store.reconcile(path, 100, id), Reconciled::Continue {
            from: 0
        });
        store.advance(path, 100);
        assert_eq!(store.reconcile(path, 200, id), Reconciled::Continue {
            from: 100
        });
    }

    #[test]
    fn shrink_triggers_rotation() {
        let store = PositionStore::new();
        let path = Path::new("/tmp/a.log");
        let id = FileIdentity { dev: 1, ino: 1 };
        store.reconcile(path, 8000, id);
        store.advance(path, 8000);
        assert_eq!(store.reconcile(path, 200, id), Reconciled::Rotated);
        assert_eq!(store.offset_of(path), 0);
    }

    #[test]
    fn inode_change_triggers_rotation_even_without_shrink() {
        let store = PositionStore::new();
        let path = Path::new("/tmp/a.log");
        let id1 = FileIdentity { dev: 1, ino: 1 };
        let id2 = FileIdentity { dev: 1, ino: 2 };
        store.reconcile(path, 100, id1);
        store.advance(path, 100);
        assert_eq!(store.reconcile(path, 500, id2), Reconciled::Rotated);
    }

    #[test]
    fn key_namespace_is_stable_sha1() {
        let k1 = PositionStore::key_for("/var/log/app.log");
        let k2 = PositionStore::key_for("/var/log/app.log");
        assert_eq!(k1, k2);
        assert!(k1.starts_with("position:"));
    }
}
