// SPDX-License-Identifier: MIT OR Apache-2.0

//! Converts the DAG's partial order into a full topological order whenever
//! the chain height extends. Blocks below the divergence point keep their
//! existing slots; everything from the divergence point to the new top is
//! (re)assigned in ascending order.

use itertools::Itertools;

use crate::chain::dag::DagIndex;
use crate::error::{Error, Result};
use crate::hash::BlockHash;
use crate::store::BlockStore;

/// No accepted reorg may rewrite slots below four settled blocks.
const MIN_COMMON_RUN: usize = 4;
/// Search-window doubling starts here.
const INITIAL_SEARCH_WINDOW: usize = 20;
/// Hard bound so the doubling search terminates against a pathological DAG.
const MAX_REORG_SEARCH_DEPTH: usize = 1 << 16;

pub struct LinearizeResult {
    /// First topoheight that gets (re)written.
    pub base_topo_index: u64,
    /// Blocks to assign starting at `base_topo_index`, in ascending order.
    pub order: Vec<BlockHash>,
}

/// Given the previous and newly-accepted top block ids, produce the
/// sequence of block ids needing fresh topological slots. `current_topo_count`
/// is the store's slot count before this call; when the new block's past is
/// already fully linearized (a straight extension, or a merge of two tips
/// that were each already assigned), the new block simply gets appended
/// there rather than rewriting anything — only a genuine reorg, where some
/// suffix of the new block's ancestry was never linearized, triggers a
/// rewrite starting at the shared ancestor's slot.
pub fn linearize<B: BlockStore>(
    prev_top: BlockHash,
    new_top: BlockHash,
    dag: &DagIndex<B>,
    topo_index_of: &dyn Fn(&BlockHash) -> Option<u64>,
    current_topo_count: u64,
) -> Result<LinearizeResult> {
    let new_seq = dag
        .ordered_past(new_top)
        .ok_or_else(|| Error::PastMissing(format!("broken ancestry for {new_top}")))?;

    // One-block history: the new block's only parent is already the (only)
    // linearized block, nothing to search for.
    if new_seq.len() <= 1 {
        return Ok(LinearizeResult {
            base_topo_index: current_topo_count,
            order: vec![new_top],
        });
    }

    let mut window = INITIAL_SEARCH_WINDOW.min(new_seq.len());
    loop {
        if let Some(divergence) = find_divergence(&new_seq[..window], topo_index_of) {
            let pending: Vec<BlockHash> = new_seq[..divergence].iter().rev().copied().collect();
            let mut order = pending;
            order.push(new_top);

            let base_topo_index = if divergence == 0 {
                current_topo_count
            } else {
                topo_index_of(&new_seq[divergence])
                    .ok_or_else(|| Error::Reorg("divergence ancestor has no topo slot".into()))?
                    + 1
            };

            return Ok(LinearizeResult {
                base_topo_index,
                order,
            });
        }

        if window >= new_seq.len() || window >= MAX_REORG_SEARCH_DEPTH {
            return Err(Error::Reorg(
                "history too short to establish a common run".into(),
            ));
        }
        window = (window * 2).min(new_seq.len()).min(MAX_REORG_SEARCH_DEPTH);
        let _ = prev_top; // retained for API symmetry / future cross-check use
    }
}

/// Find the first index in `new_seq` whose block already has an assigned
/// topoheight, and confirm it anchors a run of `MIN_COMMON_RUN` consecutive
/// already-assigned ancestors (since an ancestor chain that is assigned at
/// all is, by construction, assigned all the way back to genesis).
fn find_divergence(
    new_seq: &[BlockHash],
    topo_index_of: &dyn Fn(&BlockHash) -> Option<u64>,
) -> Option<usize> {
    let divergence = new_seq.iter().position(|b| topo_index_of(b).is_some())?;

    // Ancestors further back in `new_seq` are older, so their topoheights
    // descend by one each step: topo(new_seq[i+1]) == topo(new_seq[i]) - 1.
    let confirmed = new_seq[divergence..]
        .iter()
        .take(MIN_COMMON_RUN)
        .tuple_windows::<(_, _)>()
        .all(|(a, b)| {
            let ia = topo_index_of(a);
            let ib = topo_index_of(b);
            matches!((ia, ib), (Some(x), Some(y)) if x > 0 && y == x - 1)
        });

    if new_seq.len() - divergence < MIN_COMMON_RUN && divergence != 0 {
        // Not enough remaining history to confirm a full settled run yet;
        // caller will widen the search window.
        return None;
    }
    if !confirmed && new_seq.len() - divergence >= MIN_COMMON_RUN {
        return None;
    }

    Some(divergence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, Proof, Transaction, TxKind};
    use crate::store::MemoryBlockStore;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn block(height: u64, tips: Vec<BlockHash>) -> Block {
        Block {
            major_version: 1,
            height,
            timestamp: height,
            tips,
            mini_blocks: vec![],
            miner_tx: Transaction {
                kind: TxKind::Coinbase,
                payloads: vec![],
                proof: Proof {
                    nonce: 0,
                    opaque: vec![],
                },
                height,
                fees: 0,
            },
            tx_hashes: vec![],
        }
    }

    #[test]
    fn straight_line_growth_assigns_only_new_top() {
        let store = Arc::new(MemoryBlockStore::default());
        let mut topo: HashMap<BlockHash, u64> = HashMap::new();

        let genesis = block(0, vec![]);
        let gh = genesis.hash();
        store.put_block(gh, genesis);
        topo.insert(gh, 0);

        let mut prev = gh;
        for h in 1..6u64 {
            let b = block(h, vec![prev]);
            let bh = b.hash();
            store.put_block(bh, b);
            topo.insert(bh, h);
            prev = bh;
        }

        let new_block = block(6, vec![prev]);
        let new_top = new_block.hash();
        store.put_block(new_top, new_block);

        let dag = DagIndex::new(store);
        let result = linearize(prev, new_top, &dag, &|b| topo.get(b).copied(), 6).unwrap();
        assert_eq!(result.order, vec![new_top]);
        assert_eq!(result.base_topo_index, 6);
    }
}
