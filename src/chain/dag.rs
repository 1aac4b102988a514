// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-side DAG queries: heights, parents, ordered-past walks, and the
//! dag-shape check that gates two-tip blocks. All queries go through the
//! block store; heights are cached since `ordered_past` walks re-touch the
//! same ancestors across calls.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use nonzero_ext::nonzero;
use parking_lot::Mutex;

use crate::block::Block;
use crate::hash::BlockHash;
use crate::store::BlockStore;

const HEIGHT_CACHE_SIZE: NonZeroUsize = nonzero!(8192usize);

pub struct DagIndex<B> {
    store: Arc<B>,
    heights: Mutex<LruCache<BlockHash, u64>>,
}

impl<B: BlockStore> DagIndex<B> {
    pub fn new(store: Arc<B>) -> Self {
        DagIndex {
            store,
            heights: Mutex::new(LruCache::new(HEIGHT_CACHE_SIZE)),
        }
    }

    pub fn block(&self, id: &BlockHash) -> Option<Block> {
        self.store.get_block(id)
    }

    pub fn height(&self, id: &BlockHash) -> Option<u64> {
        if let Some(h) = self.heights.lock().get(id) {
            return Some(*h);
        }
        let h = self.store.get_block(id)?.height;
        self.heights.lock().put(*id, h);
        Some(h)
    }

    pub fn parents(&self, id: &BlockHash) -> Option<Vec<BlockHash>> {
        self.store.get_block(id).map(|b| b.tips)
    }

    pub fn contains(&self, id: &BlockHash) -> bool {
        self.store.contains_block(id)
    }

    /// Two-tip dag-shape check: both tips must be ordinary (single-parent)
    /// blocks whose singleton parents coincide — a common grandparent.
    pub fn shares_common_grandparent(&self, tips: &[BlockHash]) -> bool {
        if tips.len() != 2 {
            return true;
        }
        let a_parents = self.parents(&tips[0]);
        let b_parents = self.parents(&tips[1]);
        match (a_parents, b_parents) {
            (Some(a), Some(b)) if a.len() == 1 && b.len() == 1 => a[0] == b[0],
            _ => false,
        }
    }

    /// Walk the ordered past of `tip`: with one parent, append it and
    /// continue from it; with two parents, append both in ascending byte
    /// order and continue from their shared grandparent. Stops at genesis
    /// (never appended). Returns `None` if the walk hits a block missing
    /// from the store (a broken chain).
    pub fn ordered_past(&self, tip: BlockHash) -> Option<Vec<BlockHash>> {
        let mut seq = Vec::new();
        let mut current = tip;
        loop {
            let parents = self.parents(&current)?;
            match parents.as_slice() {
                [] => break,
                [p] => {
                    seq.push(*p);
                    current = *p;
                }
                [a, b] => {
                    let (lo, hi) = if a <= b { (*a, *b) } else { (*b, *a) };
                    seq.push(lo);
                    seq.push(hi);
                    let lo_parents = self.parents(&lo)?;
                    current = *lo_parents.first()?;
                }
                _ => return None,
            }
        }
        Some(seq)
    }
}
