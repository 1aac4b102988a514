// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static and context validation of incoming blocks. Checks run in a fixed
//! order and short-circuit on the first failure; the two purely
//! cryptographic checks fan out across a worker pool since they dominate
//! validation cost and have no ordering dependency on each other.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexSet;
use once_cell::sync::Lazy;

use crate::block::CompleteBlock;
use crate::chain::dag::DagIndex;
use crate::crypto::{CryptoVerifier, PowVerifier};
use crate::error::{Error, Result};
use crate::hash::BlockHash;
use crate::store::BlockStore;

/// Blocks below `chain_height - STABLE_LIMIT` are no longer eligible for
/// extension; they are settled.
pub const STABLE_LIMIT: u64 = 8;
/// Serialized transaction bytes per block must stay under this bound.
pub const MAX_BLOCK_SIZE: usize = 1 << 20;
/// A block's declared timestamp may lead the validator's wall clock by at
/// most this much before it is rejected as too far in the future.
pub const FUTURE_TIMESTAMP_TOLERANCE_MS: u64 = 50;

/// Everything the validator needs to read but never writes.
pub struct ValidationContext<'a, B> {
    pub dag: &'a DagIndex<B>,
    pub tips: &'a IndexSet<BlockHash>,
    pub topo_contains: &'a dyn Fn(&BlockHash) -> bool,
    pub chain_height: u64,
    pub now_ms: u64,
    pub required_version_at: fn(u64) -> u8,
    pub checkpoints: &'a [(u64, BlockHash)],
    pub hf_version: u8,
    pub skip_timing: bool,
}

pub trait Validator: Send + Sync {
    fn validate<B: BlockStore>(
        &self,
        complete_block: &CompleteBlock,
        ctx: &ValidationContext<'_, B>,
    ) -> Result<()>;

    /// Curve-membership / format check for an address, used outside block
    /// validation proper (e.g. before routing a transaction to the pool).
    fn is_valid_address(&self, address: &crate::block::Address) -> bool;

    /// Nonce-against-tips plus full cryptographic validation for a single
    /// transaction proposed directly to the pool, outside a block.
    fn verify_tx_for_pool(
        &self,
        tx: &crate::block::Transaction,
        tips: &[BlockHash],
    ) -> Result<()>;
}

pub struct DefaultValidator<C, P> {
    crypto: C,
    pow: P,
    workers: rayon::ThreadPool,
}

impl<C: CryptoVerifier, P: PowVerifier> DefaultValidator<C, P> {
    pub fn new(crypto: C, pow: P) -> Self {
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build()
            .expect("failed to build validation worker pool");
        DefaultValidator {
            crypto,
            pow,
            workers,
        }
    }
}

impl<C: CryptoVerifier, P: PowVerifier> Validator for DefaultValidator<C, P> {
    fn validate<B: BlockStore>(
        &self,
        cb: &CompleteBlock,
        ctx: &ValidationContext<'_, B>,
    ) -> Result<()> {
        let block = &cb.block;
        let hash = block.hash();

        // 1. Duplicate.
        if ctx.tips.contains(&hash) || (ctx.topo_contains)(&hash) {
            return Err(Error::AlreadyExists(hash));
        }

        // 2. Tip cardinality.
        if block.tips.len() > 2 {
            return Err(Error::PastMissing(format!(
                "block declares {} tips, at most 2 allowed",
                block.tips.len()
            )));
        }

        // 3. Tip existence.
        for tip in &block.tips {
            if !ctx.dag.contains(tip) {
                return Err(Error::PastMissing(format!("tip {tip} not found")));
            }
        }

        // 4. Height coherence.
        let computed_height = block
            .tips
            .iter()
            .filter_map(|t| ctx.dag.height(t))
            .max()
            .map(|h| h + 1)
            .unwrap_or(0);
        if block.height != computed_height {
            return Err(Error::InvalidBlock(format!(
                "declared height {} does not match computed height {computed_height}",
                block.height
            )));
        }
        for tip in &block.tips {
            let tip_height = ctx
                .dag
                .height(tip)
                .ok_or_else(|| Error::PastMissing(format!("tip {tip} not found")))?;
            if tip_height + 1 != block.height {
                return Err(Error::InvalidBlock(format!(
                    "tip {tip} at height {tip_height} does not immediately precede {}",
                    block.height
                )));
            }
        }
        if (block.height == 0) != block.tips.is_empty() {
            return Err(Error::InvalidBlock(
                "genesis must have height 0 and no tips".into(),
            ));
        }

        // Checkpoints: cheaper than the remaining checks, run right after
        // height coherence is established.
        for (checkpoint_height, checkpoint_hash) in ctx.checkpoints {
            if *checkpoint_height == block.height && *checkpoint_hash != hash {
                return Err(Error::InvalidBlock(format!(
                    "conflicts with checkpoint at height {checkpoint_height}"
                )));
            }
        }

        // 5. Staleness.
        let stable_height = ctx.chain_height.saturating_sub(STABLE_LIMIT);
        if block.height < stable_height {
            return Err(Error::InvalidBlock(format!(
                "height {} below stable height {stable_height}",
                block.height
            )));
        }

        if !ctx.skip_timing {
            // 6. Future timestamp.
            if block.timestamp > ctx.now_ms + FUTURE_TIMESTAMP_TOLERANCE_MS {
                return Err(Error::FutureTimestamp);
            }

            // 7. Monotone timestamp.
            let max_tip_timestamp = block
                .tips
                .iter()
                .filter_map(|t| ctx.dag.block(t))
                .map(|b| b.timestamp)
                .max()
                .unwrap_or(0);
            if block.timestamp < max_tip_timestamp {
                return Err(Error::InvalidTimestamp);
            }
        }

        // 8. Version gate.
        let required = (ctx.required_version_at)(block.height);
        if block.major_version != required {
            return Err(Error::InvalidBlock(format!(
                "major version {} does not match required version {required}",
                block.major_version
            )));
        }

        // 9. DAG shape.
        if block.height >= 2 && !ctx.dag.shares_common_grandparent(&block.tips) {
            return Err(Error::InvalidBlock(
                "two-tip block's parents do not share a common grandparent".into(),
            ));
        }

        // 10. Size limit.
        let total_size: usize = cb
            .transactions
            .iter()
            .map(|tx| serde_json::to_vec(tx).map(|b| b.len()).unwrap_or(0))
            .sum();
        if total_size >= MAX_BLOCK_SIZE {
            return Err(Error::InvalidSize);
        }

        // 11. Mini-block verification.
        self.pow
            .verify_miniblocks(block)
            .map_err(Error::InvalidPoW)?;

        // 12. Miner tx.
        if block.is_genesis() {
            if !block.miner_tx.kind.is_premine() {
                return Err(Error::InvalidBlock(
                    "genesis miner tx must be a premine".into(),
                ));
            }
        } else {
            if !block.miner_tx.kind.is_coinbase() {
                return Err(Error::InvalidBlock(
                    "non-genesis miner tx must be a coinbase".into(),
                ));
            }
            self.crypto
                .verify_coinbase(cb, &block.miner_tx)
                .map_err(Error::InvalidBlock)?;
        }

        // 13. Tx presence/match.
        if !cb.tx_hashes_match() {
            return Err(Error::InvalidBlock(
                "tx_hashes do not match supplied transactions".into(),
            ));
        }

        // 14. Intra-block registration and nonce uniqueness.
        let mut seen_registrations = HashSet::new();
        let mut seen_nonces = HashSet::new();
        for tx in &cb.transactions {
            if let crate::block::TxKind::Registration { miner_address } = &tx.kind {
                if !seen_registrations.insert(*miner_address) {
                    return Err(Error::InvalidBlock(format!(
                        "address {miner_address:?} registered twice in block"
                    )));
                }
            } else if !seen_nonces.insert(tx.proof.nonce) {
                return Err(Error::TXDoubleSpend(tx.hash()));
            }
        }

        // 15 & 16. Per-tx nonce and cryptographic validation, fanned out.
        let nonce_failures = AtomicUsize::new(0);
        let crypto_failures = AtomicUsize::new(0);
        self.workers.install(|| {
            rayon::scope(|s| {
                for tx in &cb.transactions {
                    s.spawn(|_| {
                        if self
                            .crypto
                            .verify_nonce_against_tips(tx, &block.tips, ctx.hf_version)
                            .is_err()
                        {
                            nonce_failures.fetch_add(1, Ordering::Relaxed);
                        }
                    });
                    s.spawn(|_| {
                        if self
                            .crypto
                            .verify_transaction(tx, ctx.hf_version)
                            .is_err()
                        {
                            crypto_failures.fetch_add(1, Ordering::Relaxed);
                        }
                    });
                }
            });
        });
        if nonce_failures.load(Ordering::Relaxed) > 0 || crypto_failures.load(Ordering::Relaxed) > 0
        {
            return Err(Error::InvalidTX(
                "one or more transactions failed nonce or cryptographic validation".into(),
            ));
        }

        // 17. Cross-tx sanity: no two non-coinbase, non-registration txs in
        // the block credit the same destination under the same scid.
        let mut seen_spends = HashSet::new();
        for tx in &cb.transactions {
            if tx.is_reward_only() || tx.kind.is_registration() {
                continue;
            }
            for payload in &tx.payloads {
                if !seen_spends.insert((payload.scid, payload.destination)) {
                    return Err(Error::TXDoubleSpend(tx.hash()));
                }
            }
        }

        Ok(())
    }

    fn is_valid_address(&self, address: &crate::block::Address) -> bool {
        self.crypto.is_valid_address(address)
    }

    fn verify_tx_for_pool(
        &self,
        tx: &crate::block::Transaction,
        tips: &[BlockHash],
    ) -> Result<()> {
        self.crypto
            .verify_nonce_against_tips(tx, tips, 1)
            .map_err(Error::InvalidTX)?;
        self.crypto
            .verify_transaction(tx, 1)
            .map_err(Error::InvalidTX)?;
        Ok(())
    }
}

/// Height-ordered activation schedule for major version bumps, ascending.
/// Built once since it never changes at runtime.
static VERSION_SCHEDULE: Lazy<Vec<(u64, u8)>> = Lazy::new(|| vec![(0, 1)]);

pub fn required_version_at(height: u64) -> u8 {
    VERSION_SCHEDULE
        .iter()
        .rev()
        .find(|(activation_height, _)| *activation_height <= height)
        .map(|(_, version)| *version)
        .unwrap_or(1)
}
