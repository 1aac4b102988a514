// SPDX-License-Identifier: MIT OR Apache-2.0

//! The top-level consensus engine. Ties the DAG index, tip-set, linearizer,
//! validator, and executor together behind a single coarse lock per chain
//! instance; callers see one `add_block` / `add_tx` surface regardless of
//! how many storage backends sit behind it.

pub mod dag;
pub mod linearizer;
pub mod tipset;

use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lru::LruCache;
use nonzero_ext::nonzero;
use parking_lot::{Mutex, RwLock};

use crate::block::{Address, CompleteBlock, Transaction, TxKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::sc::SmartContractEnvironment;
use crate::executor::Executor;
use crate::hash::BlockHash;
use crate::ingress::Notifiers;
use crate::pool::{Pool, RegPool};
use crate::store::{BlockStore, StateStore, TopoStore, BALANCE_TREE};
use crate::validator::{required_version_at, ValidationContext, Validator, STABLE_LIMIT};
use dag::DagIndex;
use linearizer::linearize;
use tipset::TipSet;

/// A record at or below this height is always a valid rewind anchor, even if
/// it is not (yet) a sync block.
const GENESIS_ANCHOR_HEIGHT: u64 = 1;
const ADDRESS_CACHE_SIZE: NonZeroUsize = nonzero!(102_400usize);
const DIFFICULTY_CACHE_SIZE: NonZeroUsize = nonzero!(8192usize);
const BASE_DIFFICULTY: u64 = 1;
const MIN_TX_FEE: u64 = 1;

struct ChainInner {
    tips: TipSet,
    topo_of: HashMap<BlockHash, u64>,
}

/// The engine. Generic over every external collaborator so tests can run it
/// entirely against in-memory adapters and deterministic stubs.
pub struct Chain<B, S, T, P, R, V, SC> {
    blocks: Arc<B>,
    state: Arc<S>,
    topo: Arc<T>,
    pool: Arc<P>,
    regpool: Arc<R>,
    validator: V,
    executor: Executor<B, S, SC>,
    dag: DagIndex<B>,
    inner: RwLock<ChainInner>,
    notifiers: Notifiers,
    config: Config,
    checkpoints: Vec<(u64, BlockHash)>,
    address_cache: Mutex<LruCache<Address, bool>>,
    difficulty_cache: Mutex<LruCache<Vec<BlockHash>, u64>>,
    shutting_down: AtomicBool,
}

impl<B, S, T, P, R, V, SC> Chain<B, S, T, P, R, V, SC>
where
    B: BlockStore,
    S: StateStore,
    T: TopoStore,
    P: Pool,
    R: RegPool,
    V: Validator,
    SC: SmartContractEnvironment,
{
    pub fn new(
        blocks: Arc<B>,
        state: Arc<S>,
        topo: Arc<T>,
        pool: Arc<P>,
        regpool: Arc<R>,
        validator: V,
        executor: Executor<B, S, SC>,
        config: Config,
        checkpoints: Vec<(u64, BlockHash)>,
    ) -> Self {
        let dag = DagIndex::new(blocks.clone());
        Chain {
            blocks,
            state,
            topo,
            pool,
            regpool,
            validator,
            executor,
            dag,
            inner: RwLock::new(ChainInner {
                tips: TipSet::new(),
                topo_of: HashMap::new(),
            }),
            notifiers: Notifiers::default(),
            config,
            checkpoints,
            address_cache: Mutex::new(LruCache::new(ADDRESS_CACHE_SIZE)),
            difficulty_cache: Mutex::new(LruCache::new(DIFFICULTY_CACHE_SIZE)),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn notifiers(&self) -> &Notifiers {
        &self.notifiers
    }

    /// The versioned state store backing this chain, for callers that need
    /// to inspect balances or contract data directly (diagnostics, tests).
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Whether `shutdown` has been called. `add_block` and `add_tx` consult
    /// this before doing any work so a draining node stops admitting new
    /// chain state instead of racing its own teardown.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Drain the engine: take the writer lock so no `add_block`/`add_tx`
    /// call is left mid-flight, clear the mempool and registration pool, and
    /// mark the chain closed so every later admission call is rejected.
    /// Broadcasts on every notifier afterward so threads parked in
    /// `wait_for_next` wake up and can observe the shutdown flag rather than
    /// blocking forever.
    pub fn shutdown(&self) {
        let _inner = self.inner.write();
        self.shutting_down.store(true, Ordering::Release);

        self.pool.clear();
        self.regpool.clear();

        self.notifiers.new_block.broadcast();
        self.notifiers.height_changed.broadcast();
        self.notifiers.new_mini_block.broadcast();
    }

    /// Seed genesis if the topo store is empty; otherwise reconstruct the
    /// frontier and the in-memory reverse topo index from the last-written
    /// record. A reload only restores the single canonical top tip, not
    /// historical side-tips; it is a cold-start operation, run once before
    /// any `add_block` call.
    pub fn start(&self, genesis: CompleteBlock) -> Result<()> {
        let mut inner = self.inner.write();

        if self.topo.count() == 0 {
            let genesis_hash = genesis.hash();
            self.put_block_if_absent(genesis_hash, &genesis.block);
            for tx in &genesis.transactions {
                self.put_tx_if_absent(tx);
            }
            let outcome = self.executor.execute_slot(0, genesis_hash, 0, false)?;
            self.executor
                .record_topo(self.topo.as_ref(), genesis_hash, 0, &outcome);
            inner.tips.seed_genesis(genesis_hash);
            inner.topo_of.insert(genesis_hash, 0);
            return Ok(());
        }

        let last_slot = self.topo.count() - 1;
        let last = self.topo.read(last_slot).ok_or_else(|| {
            Error::Other("topo store reports a nonzero count but the last slot is missing".into())
        })?;
        inner.tips.restore_single(last.block_id, last.height);
        for slot in 0..=last_slot {
            if let Some(record) = self.topo.read(slot) {
                inner.topo_of.insert(record.block_id, slot);
            }
        }
        Ok(())
    }

    /// Validate, persist, linearize, and replay a new block. The linearizer
    /// always runs, regardless of whether the chain height numerically
    /// advances: a side block still needs a topological slot so that later
    /// rewinds and `is_side_block` queries can find it.
    pub fn add_block(&self, cb: CompleteBlock) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::Other("chain is shutting down".into()));
        }

        let hash = cb.hash();
        let mut inner = self.inner.write();

        let no_checkpoints: &[(u64, BlockHash)] = &[];
        let checkpoints = if self.config.disable_checkpoints {
            no_checkpoints
        } else {
            self.checkpoints.as_slice()
        };

        let ctx = ValidationContext {
            dag: &self.dag,
            tips: inner.tips.tips(),
            topo_contains: &|b: &BlockHash| inner.topo_of.contains_key(b),
            chain_height: inner.tips.chain_height(),
            now_ms: now_ms(),
            required_version_at,
            checkpoints,
            hf_version: 1,
            skip_timing: self.config.simulator,
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| self.validator.validate(&cb, &ctx))) {
            Ok(result) => result?,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(%message, "validator panicked on block {hash}");
                return Err(Error::Panic(message));
            }
        }

        self.put_block_if_absent(hash, &cb.block);
        for tx in &cb.transactions {
            self.put_tx_if_absent(tx);
        }

        let prev_top = inner.tips.top_id();
        let height_of = |b: &BlockHash| self.dag.height(b);
        let extended = inner.tips.apply(hash, &cb.block, height_of);

        let current_topo_count = self.topo.count();
        let linearized = linearize(
            prev_top.unwrap_or(hash),
            hash,
            &self.dag,
            &|b: &BlockHash| inner.topo_of.get(b).copied(),
            current_topo_count,
        )?;

        if linearized.base_topo_index < current_topo_count {
            self.topo.clean(linearized.base_topo_index);
            inner
                .topo_of
                .retain(|_, slot| *slot < linearized.base_topo_index);
        }

        let mut slot = linearized.base_topo_index;
        for block_id in &linearized.order {
            let block = self.dag.block(block_id).ok_or_else(|| {
                Error::PastMissing(format!("block {block_id} vanished mid-linearization"))
            })?;
            let prev_version = if slot == 0 {
                0
            } else {
                self.topo
                    .read(slot - 1)
                    .ok_or_else(|| {
                        Error::Other(format!("missing topo record at slot {}", slot - 1))
                    })?
                    .state_version
            };
            let side = is_side_block_at(self.topo.as_ref(), slot, block.height);
            let outcome = self.executor.execute_slot(slot, *block_id, prev_version, side)?;
            self.executor
                .record_topo(self.topo.as_ref(), *block_id, block.height, &outcome);
            inner.topo_of.insert(*block_id, slot);
            slot += 1;
        }

        let has_mini_blocks = !cb.block.mini_blocks.is_empty();
        drop(inner);

        self.notifiers.new_block.broadcast();
        if extended {
            self.notifiers.height_changed.broadcast();
        }
        if has_mini_blocks {
            self.notifiers.new_mini_block.broadcast();
        }

        Ok(())
    }

    /// Submit a transaction directly to the mempool or registration pool.
    /// Coinbase and premine transactions only ever arrive as a block's miner
    /// transaction and are rejected here.
    pub fn add_tx(&self, tx: Transaction) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::Other("chain is shutting down".into()));
        }
        if tx.kind.is_coinbase() || tx.kind.is_premine() {
            return Err(Error::InvalidTX(
                "coinbase and premine transactions cannot be submitted directly".into(),
            ));
        }

        let size = serde_json::to_vec(&tx).map(|b| b.len()).unwrap_or(0);
        if size >= crate::validator::MAX_BLOCK_SIZE {
            return Err(Error::InvalidSize);
        }
        if tx.fees < MIN_TX_FEE && !tx.kind.is_registration() {
            return Err(Error::InvalidTX("fee below minimum".into()));
        }

        let hash = tx.hash();
        if self.blocks.get_tx(&hash).is_some() || self.pool.contains(&hash) {
            return Err(Error::AlreadyExists(hash));
        }

        let tips: Vec<BlockHash> = {
            let inner = self.inner.read();
            inner.tips.tips().iter().copied().collect()
        };
        self.validator.verify_tx_for_pool(&tx, &tips)?;

        if let TxKind::Registration { miner_address } = &tx.kind {
            if self.regpool.is_registered(miner_address) {
                return Err(Error::InvalidTX(
                    "address already queued for registration".into(),
                ));
            }
            let snapshot = self.state.load_snapshot(self.state.latest_version());
            let balances = snapshot.get_tree(BALANCE_TREE);
            if balances.get(&miner_address.0).is_some() {
                return Err(Error::InvalidTX("address already registered".into()));
            }
            self.regpool.add(*miner_address, tx);
        } else {
            self.pool.add(hash, tx);
        }
        Ok(())
    }

    /// Whether `block_id`'s topo slot is a side slot: it lost the height race
    /// to whatever immediately precedes it in the canonical order.
    pub fn is_side_block(&self, block_id: &BlockHash) -> Option<bool> {
        let inner = self.inner.read();
        let slot = *inner.topo_of.get(block_id)?;
        let height = self.dag.height(block_id)?;
        Some(is_side_block_at(self.topo.as_ref(), slot, height))
    }

    /// Extend a rewind of `n` slots past the frontier until an anchor is
    /// reached: a record at or below [`GENESIS_ANCHOR_HEIGHT`], or a sync
    /// block (the sole block at its height, settled more than
    /// [`STABLE_LIMIT`] heights behind the current frontier). Returns the
    /// topoheight the chain was rewound to.
    pub fn rewind(&self, n: u64) -> Result<u64> {
        let mut inner = self.inner.write();
        let count = self.topo.count();
        if count == 0 {
            return Ok(0);
        }
        let chain_height = inner.tips.chain_height();

        let mut k = (count - 1).saturating_sub(n);
        loop {
            let record = self
                .topo
                .read(k)
                .ok_or_else(|| Error::Other(format!("missing topo record at slot {k}")))?;
            if record.height <= GENESIS_ANCHOR_HEIGHT
                || self.is_sync_block(record.height, chain_height)
                || k == 0
            {
                break;
            }
            k -= 1;
        }

        self.topo.clean(k + 1);
        inner.topo_of.retain(|_, slot| *slot <= k);

        let anchor = self
            .topo
            .read(k)
            .ok_or_else(|| Error::Other(format!("missing topo record at slot {k}")))?;
        inner.tips.restore_single(anchor.block_id, anchor.height);

        Ok(k)
    }

    fn is_sync_block(&self, height: u64, chain_height: u64) -> bool {
        self.topo.find_at_height(height).len() == 1 && height + STABLE_LIMIT <= chain_height
    }

    /// Persist a block only if its hash is not already in the store. A
    /// rewound block's topo slot is cleared but its block/tx bytes are left
    /// behind on purpose (`rewind` only ever rewinds the topo index); when
    /// the same block is re-added later this keeps `add_block` idempotent
    /// instead of hitting the store's fatal-on-double-write path.
    fn put_block_if_absent(&self, hash: BlockHash, block: &crate::block::Block) {
        if !self.blocks.contains_block(&hash) {
            self.blocks.put_block(hash, block.clone());
        }
    }

    fn put_tx_if_absent(&self, tx: &Transaction) {
        let hash = tx.hash();
        if self.blocks.get_tx(&hash).is_none() {
            self.blocks.put_tx(hash, tx.clone());
        }
    }

    /// Proof-of-work difficulty target for a block built on `tips`. Forced
    /// to the baseline under `--simulator`; otherwise a simple retarget
    /// against the recent average spacing of the heaviest tip's ancestry.
    pub fn difficulty_at_tips(&self, tips: &[BlockHash]) -> u64 {
        if self.config.simulator {
            return BASE_DIFFICULTY;
        }
        let key = tips.to_vec();
        if let Some(d) = self.difficulty_cache.lock().get(&key) {
            return *d;
        }
        let difficulty = self.compute_difficulty(tips);
        self.difficulty_cache.lock().put(key, difficulty);
        difficulty
    }

    fn compute_difficulty(&self, tips: &[BlockHash]) -> u64 {
        const WINDOW: usize = 10;

        let Some(top) = tips.iter().max_by_key(|t| self.dag.height(t).unwrap_or(0)) else {
            return BASE_DIFFICULTY;
        };
        let Some(top_block) = self.dag.block(top) else {
            return BASE_DIFFICULTY;
        };
        let Some(past) = self.dag.ordered_past(*top) else {
            return BASE_DIFFICULTY;
        };

        let mut timestamps = vec![top_block.timestamp];
        timestamps.extend(past.iter().take(WINDOW).filter_map(|b| self.dag.block(b)).map(|b| b.timestamp));
        if timestamps.len() < 2 {
            return BASE_DIFFICULTY;
        }

        let spans = timestamps.len() as u64 - 1;
        let total: u64 = timestamps.windows(2).map(|w| w[0].saturating_sub(w[1])).sum();
        let avg_span_ms = (total / spans).max(1);

        let target_ms = self.config.target_block_time.as_millis().max(1) as f64;
        let ratio = target_ms / avg_span_ms as f64;
        ((BASE_DIFFICULTY as f64) * ratio).round().max(1.0) as u64
    }

    /// Cached address-validity check, backing registration and pool checks
    /// that would otherwise repeat an expensive curve-membership test.
    pub fn is_address_hash_valid(&self, address: &Address) -> bool {
        if let Some(v) = self.address_cache.lock().get(address) {
            return *v;
        }
        let valid = self.validator.is_valid_address(address);
        self.address_cache.lock().put(*address, valid);
        valid
    }
}

/// A slot is a side slot when it is not the first slot and the slot
/// immediately before it holds a block at the same height.
fn is_side_block_at<T: TopoStore>(topo: &T, slot: u64, height: u64) -> bool {
    if slot == 0 {
        return false;
    }
    topo.read(slot - 1)
        .map(|r| r.height == height)
        .unwrap_or(false)
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Render a caught panic payload as a string, falling back to a generic
/// message for payloads that are neither `&str` nor `String`.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, MiniBlock, Payload, Proof, TxKind};
    use crate::crypto::{TestCryptoVerifier, TestPowVerifier};
    use crate::executor::sc::NullScEnvironment;
    use crate::executor::{Executor, HardcodedContract};
    use crate::hash::Digest;
    use crate::store::{MemoryBlockStore, MemoryStateStore, MemoryTopoStore};
    use crate::validator::DefaultValidator;
    use std::sync::Arc;

    type TestChain = Chain<
        MemoryBlockStore,
        MemoryStateStore,
        MemoryTopoStore,
        crate::pool::MemoryPool,
        crate::pool::MemoryRegPool,
        DefaultValidator<TestCryptoVerifier, TestPowVerifier>,
        NullScEnvironment,
    >;

    fn new_chain() -> TestChain {
        let blocks = Arc::new(MemoryBlockStore::default());
        let state = Arc::new(MemoryStateStore::default());
        let topo = Arc::new(MemoryTopoStore::default());
        let pool = Arc::new(crate::pool::MemoryPool::default());
        let regpool = Arc::new(crate::pool::MemoryRegPool::default());
        let validator = DefaultValidator::new(TestCryptoVerifier, TestPowVerifier);
        let executor = Executor::new(
            blocks.clone(),
            state.clone(),
            NullScEnvironment,
            Vec::<HardcodedContract>::new(),
        );
        Chain::new(
            blocks,
            state,
            topo,
            pool,
            regpool,
            validator,
            executor,
            Config {
                integrator_address: Address::DEV,
                disable_checkpoints: true,
                simulator: true,
                fastsync: false,
                node_tag: "test".into(),
                target_block_time: std::time::Duration::from_secs(20),
                protocol_version: semver::Version::new(1, 0, 0),
            },
            Vec::new(),
        )
    }

    fn miner_tx(kind: TxKind) -> Transaction {
        Transaction {
            kind,
            payloads: vec![Payload {
                scid: Digest::ZERO,
                destination: Address::DEV,
                amount: 50,
                burn: 0,
            }],
            proof: Proof {
                nonce: 0,
                opaque: vec![],
            },
            height: 0,
            fees: 0,
        }
    }

    fn block(height: u64, timestamp: u64, tips: Vec<BlockHash>, miner: Transaction) -> CompleteBlock {
        let mini_blocks = if tips.is_empty() {
            vec![]
        } else {
            vec![MiniBlock {
                miner_key_hash: Digest::ZERO,
                nonce: timestamp,
                timestamp,
            }]
        };
        CompleteBlock {
            block: Block {
                major_version: 1,
                height,
                timestamp,
                tips,
                mini_blocks,
                miner_tx: miner,
                tx_hashes: vec![],
            },
            transactions: vec![],
        }
    }

    #[test]
    fn start_seeds_genesis_and_assigns_slot_zero() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let inner = chain.inner.read();
        assert_eq!(inner.tips.top_id(), Some(genesis_hash));
        assert_eq!(inner.topo_of.get(&genesis_hash), Some(&0));
    }

    #[test]
    fn straight_line_extension_assigns_sequential_slots() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let mut prev = genesis_hash;
        for h in 1..4u64 {
            let b = block(h, h * 1000, vec![prev], miner_tx(TxKind::Coinbase));
            let bh = b.hash();
            chain.add_block(b).unwrap();
            assert_eq!(chain.inner.read().topo_of.get(&bh), Some(&h));
            prev = bh;
        }
        assert_eq!(chain.topo.count(), 4);
    }

    #[test]
    fn side_block_shares_height_with_its_predecessor_slot() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let a = block(1, 1000, vec![genesis_hash], miner_tx(TxKind::Coinbase));
        let ah = a.hash();
        chain.add_block(a).unwrap();

        let b = block(1, 1001, vec![genesis_hash], miner_tx(TxKind::Coinbase));
        let bh = b.hash();
        chain.add_block(b).unwrap();

        assert_eq!(chain.is_side_block(&ah), Some(false));
        assert_eq!(chain.is_side_block(&bh), Some(true));
        // The frontier never moved past height 1 since `b` did not extend it.
        assert_eq!(chain.inner.read().tips.chain_height(), 1);
    }

    #[test]
    fn two_tip_merge_extends_without_rewriting_existing_slots() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let a = block(1, 1000, vec![genesis_hash], miner_tx(TxKind::Coinbase));
        let ah = a.hash();
        chain.add_block(a).unwrap();

        let b = block(1, 1001, vec![genesis_hash], miner_tx(TxKind::Coinbase));
        let bh = b.hash();
        chain.add_block(b).unwrap();

        let mut tips = vec![ah, bh];
        tips.sort();
        let c = block(2, 2000, tips, miner_tx(TxKind::Coinbase));
        let ch = c.hash();
        chain.add_block(c).unwrap();

        assert_eq!(chain.is_side_block(&ch), Some(false));
        assert_eq!(chain.inner.read().topo_of.get(&ah), Some(&1));
        assert_eq!(chain.inner.read().topo_of.get(&bh), Some(&2));
        assert_eq!(chain.inner.read().topo_of.get(&ch), Some(&3));
    }

    #[test]
    fn add_tx_rejects_coinbase_and_premine() {
        let chain = new_chain();
        assert!(chain.add_tx(miner_tx(TxKind::Coinbase)).is_err());
        assert!(chain.add_tx(miner_tx(TxKind::Premine)).is_err());
    }

    #[test]
    fn add_tx_routes_registration_to_regpool() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        chain.start(genesis).unwrap();

        let tx = Transaction {
            kind: TxKind::Registration {
                miner_address: Address([7u8; 33]),
            },
            payloads: vec![],
            proof: Proof {
                nonce: 1,
                opaque: vec![],
            },
            height: 0,
            fees: 1,
        };
        chain.add_tx(tx).unwrap();
        assert!(chain.regpool.is_registered(&Address([7u8; 33])));
    }

    #[test]
    fn rewind_restores_an_earlier_frontier() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let mut prev = genesis_hash;
        for h in 1..6u64 {
            let b = block(h, h * 1000, vec![prev], miner_tx(TxKind::Coinbase));
            prev = b.hash();
            chain.add_block(b).unwrap();
        }

        let anchor_slot = chain.rewind(1).unwrap();
        assert!(anchor_slot < 5);
        assert_eq!(chain.topo.count(), anchor_slot + 1);
    }

    #[test]
    fn re_adding_a_rewound_block_does_not_abort() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let mut blocks_by_height = Vec::new();
        let mut prev = genesis_hash;
        for h in 1..4u64 {
            let b = block(h, h * 1000, vec![prev], miner_tx(TxKind::Coinbase));
            prev = b.hash();
            blocks_by_height.push(b.clone());
            chain.add_block(b).unwrap();
        }

        // Rewind all the way back to genesis so every added block's topo
        // slot is cleared, not just the most recent one.
        chain.rewind(3).unwrap();
        assert_eq!(chain.topo.count(), 1);

        // The rewound blocks' bytes are still in the block store (rewind
        // only clears the topo index), so re-adding the very same blocks
        // must succeed rather than hit the store's fatal double-write path.
        for b in blocks_by_height {
            chain.add_block(b).unwrap();
        }
        assert_eq!(chain.topo.count(), 4);
    }

    #[test]
    fn shutdown_rejects_further_blocks_and_drains_pools() {
        let chain = new_chain();
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();
        chain.start(genesis).unwrap();

        let tx = Transaction {
            kind: TxKind::Registration {
                miner_address: Address([3u8; 33]),
            },
            payloads: vec![],
            proof: Proof {
                nonce: 1,
                opaque: vec![],
            },
            height: 0,
            fees: 1,
        };
        chain.add_tx(tx).unwrap();
        assert!(chain.regpool.is_registered(&Address([3u8; 33])));

        chain.shutdown();
        assert!(chain.is_shutting_down());
        assert!(!chain.regpool.is_registered(&Address([3u8; 33])));

        let b = block(1, 1000, vec![genesis_hash], miner_tx(TxKind::Coinbase));
        assert!(chain.add_block(b).is_err());
    }

    #[test]
    fn disable_checkpoints_bypasses_a_conflicting_checkpoint() {
        let blocks = Arc::new(MemoryBlockStore::default());
        let state = Arc::new(MemoryStateStore::default());
        let topo = Arc::new(MemoryTopoStore::default());
        let pool = Arc::new(crate::pool::MemoryPool::default());
        let regpool = Arc::new(crate::pool::MemoryRegPool::default());
        let validator = DefaultValidator::new(TestCryptoVerifier, TestPowVerifier);
        let executor = Executor::new(
            blocks.clone(),
            state.clone(),
            NullScEnvironment,
            Vec::<HardcodedContract>::new(),
        );
        let genesis = block(0, 0, vec![], miner_tx(TxKind::Premine));
        let genesis_hash = genesis.hash();

        let b = block(1, 1000, vec![genesis_hash], miner_tx(TxKind::Coinbase));
        let conflicting_checkpoint = vec![(1, Digest([0xffu8; 32]))];

        let chain = Chain::new(
            blocks,
            state,
            topo,
            pool,
            regpool,
            validator,
            executor,
            Config {
                integrator_address: Address::DEV,
                disable_checkpoints: true,
                simulator: true,
                fastsync: false,
                node_tag: "test".into(),
                target_block_time: std::time::Duration::from_secs(20),
                protocol_version: semver::Version::new(1, 0, 0),
            },
            conflicting_checkpoint,
        );
        chain.start(genesis).unwrap();
        assert!(chain.add_block(b).is_ok());
    }
}
