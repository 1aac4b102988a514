// SPDX-License-Identifier: MIT OR Apache-2.0

//! Current tip-set bookkeeping.

use indexmap::IndexSet;

use crate::block::Block;
use crate::hash::BlockHash;

/// A block lags the frontier by this many heights or more and is dropped
/// from the tip set as abandoned.
const STALE_TIP_LAG: u64 = 2;

/// The current frontier of the DAG: tips, chain height, and the
/// most-recently-accepted block (`top_id`). Iteration order over tips is
/// insertion order, kept via `IndexSet` for deterministic test output.
#[derive(Clone, Debug, Default)]
pub struct TipSet {
    tips: IndexSet<BlockHash>,
    chain_height: u64,
    top_id: Option<BlockHash>,
}

impl TipSet {
    pub fn new() -> Self {
        TipSet::default()
    }

    pub fn tips(&self) -> &IndexSet<BlockHash> {
        &self.tips
    }

    pub fn chain_height(&self) -> u64 {
        self.chain_height
    }

    pub fn top_id(&self) -> Option<BlockHash> {
        self.top_id
    }

    pub fn seed_genesis(&mut self, genesis_hash: BlockHash) {
        self.tips.insert(genesis_hash);
        self.chain_height = 0;
        self.top_id = Some(genesis_hash);
    }

    /// Reinitialize the frontier from disk as a single tip. Side tips that
    /// never became the canonical top are not reconstructed; a reload
    /// starts from the last-written topo record only.
    pub fn restore_single(&mut self, block_hash: BlockHash, height: u64) {
        self.tips.clear();
        self.tips.insert(block_hash);
        self.chain_height = height;
        self.top_id = Some(block_hash);
    }

    /// Absorb a newly-accepted block: `new_tips = (old_tips \ block.tips) ∪
    /// {block_hash}`, then drop any tip whose height lags the (possibly
    /// updated) chain height by `STALE_TIP_LAG` or more. Returns whether the
    /// chain height advanced.
    pub fn apply<F>(&mut self, block_hash: BlockHash, block: &Block, height_of: F) -> bool
    where
        F: Fn(&BlockHash) -> Option<u64>,
    {
        for tip in &block.tips {
            self.tips.shift_remove(tip);
        }
        self.tips.insert(block_hash);

        let extended = block.height > self.chain_height || self.top_id.is_none();
        if extended {
            self.chain_height = block.height;
            self.top_id = Some(block_hash);
        }

        let floor = self.chain_height.saturating_sub(STALE_TIP_LAG - 1);
        self.tips
            .retain(|t| height_of(t).map(|h| h >= floor).unwrap_or(false));

        extended
    }
}
