// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned authenticated key-value store. The real authenticated-tree
//! backend is an external collaborator; this module provides the minimal
//! in-memory adapter the executor needs to exercise the client protocol in
//! tests, plus the `StateStore` trait boundary a production backend would
//! implement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::{hash_bytes, Digest};

pub const BALANCE_TREE: &str = "BALANCE_TREE";
pub const SC_META: &str = "SC_META";

/// An authenticated map: a sorted key→value store whose `root_hash` is a
/// deterministic BLAKE2b digest over its entries. Stands in for the real
/// Merkle/Verkle tree the external storage backend would provide.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleMap {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MerkleMap {
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic root: hash of the sorted `(key, value)` entries. Map
    /// iteration is already sorted (`BTreeMap`), so this needs no explicit
    /// sort step.
    pub fn root_hash(&self) -> Digest {
        let mut buf = Vec::new();
        for (k, v) in &self.entries {
            buf.extend_from_slice(&(k.len() as u64).to_le_bytes());
            buf.extend_from_slice(k);
            buf.extend_from_slice(&(v.len() as u64).to_le_bytes());
            buf.extend_from_slice(v);
        }
        hash_bytes(&buf)
    }
}

/// A read-only view of the trees committed at a given version.
#[derive(Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    trees: BTreeMap<String, MerkleMap>,
}

impl Snapshot {
    pub fn get_tree(&self, name: &str) -> MerkleMap {
        self.trees.get(name).cloned().unwrap_or_default()
    }
}

/// Load a past snapshot by version, read named trees out of it, and commit
/// a new set of named trees to produce the next version.
pub trait StateStore: Send + Sync {
    fn load_snapshot(&self, version: u64) -> Snapshot;

    /// Atomically commit a set of named trees, producing the next version.
    /// Fatal on any underlying storage failure.
    fn commit(&self, trees: BTreeMap<String, MerkleMap>) -> u64;

    fn latest_version(&self) -> u64;
}

/// In-memory, append-only `StateStore`. Version 0 is always the empty
/// genesis snapshot; `commit` appends a new version and never mutates an
/// earlier one. Rewinding the chain is a no-op on the store itself: earlier
/// versions simply stop being referenced by the topo index.
pub struct MemoryStateStore {
    versions: parking_lot::RwLock<Vec<Snapshot>>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        MemoryStateStore {
            versions: parking_lot::RwLock::new(vec![Snapshot {
                version: 0,
                trees: BTreeMap::new(),
            }]),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load_snapshot(&self, version: u64) -> Snapshot {
        let versions = self.versions.read();
        versions
            .get(version as usize)
            .cloned()
            .unwrap_or_else(|| crate::fatal_storage_error!("no snapshot at version {version}"))
    }

    fn commit(&self, trees: BTreeMap<String, MerkleMap>) -> u64 {
        let mut versions = self.versions.write();
        let version = versions.len() as u64;
        versions.push(Snapshot { version, trees });
        version
    }

    fn latest_version(&self) -> u64 {
        self.versions.read().len() as u64 - 1
    }
}
