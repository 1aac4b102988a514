// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only topological index. Every time a block is linearized into the
//! canonical order the engine assigns it the next free topoheight and
//! records a [`TopoRecord`] there; side blocks get a record with no state
//! effect, tracked but not replayed. The topo store is the single source of
//! truth for "what sits at height N" during a rewind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopoRecord {
    pub block_id: BlockHash,
    pub state_version: u64,
    pub height: u64,
    pub is_side_block: bool,
}

/// Append-only topoheight index: `Write` extends it by one, `Clean` drops
/// every record from a given topoheight onward (the rewind primitive),
/// `Read` looks a single entry up, and `find_at_height` answers "which
/// blocks sit at this chain height" for reorg bookkeeping.
pub trait TopoStore: Send + Sync {
    fn write(&self, record: TopoRecord) -> u64;
    fn read(&self, topoheight: u64) -> Option<TopoRecord>;
    fn clean(&self, from_topoheight: u64);
    fn count(&self) -> u64;
    fn find_at_height(&self, height: u64) -> Vec<TopoRecord>;
}

#[derive(Default)]
struct Inner {
    records: Vec<TopoRecord>,
    by_height: BTreeMap<u64, Vec<usize>>,
}

#[derive(Default)]
pub struct MemoryTopoStore {
    inner: parking_lot::RwLock<Inner>,
}

impl TopoStore for MemoryTopoStore {
    fn write(&self, record: TopoRecord) -> u64 {
        let mut inner = self.inner.write();
        let idx = inner.records.len();
        inner.by_height.entry(record.height).or_default().push(idx);
        inner.records.push(record);
        idx as u64
    }

    fn read(&self, topoheight: u64) -> Option<TopoRecord> {
        self.inner.read().records.get(topoheight as usize).copied()
    }

    fn clean(&self, from_topoheight: u64) {
        let mut inner = self.inner.write();
        inner.records.truncate(from_topoheight as usize);
        let cutoff = from_topoheight as usize;
        inner.by_height.retain(|_, idxs| {
            idxs.retain(|i| *i < cutoff);
            !idxs.is_empty()
        });
    }

    fn count(&self) -> u64 {
        self.inner.read().records.len() as u64
    }

    fn find_at_height(&self, height: u64) -> Vec<TopoRecord> {
        let inner = self.inner.read();
        inner
            .by_height
            .get(&height)
            .into_iter()
            .flatten()
            .map(|&i| inner.records[i])
            .collect()
    }
}
