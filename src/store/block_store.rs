// SPDX-License-Identifier: MIT OR Apache-2.0

//! Block-and-tx store: `block_id -> serialized_block`, `tx_id ->
//! serialized_tx`.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::block::{Block, Transaction};
use crate::fatal_storage_error;
use crate::hash::{BlockHash, TxHash};

/// Block-and-transaction storage. Implementations must treat write failures
/// as fatal: a partially-written block must never be observable.
pub trait BlockStore: Send + Sync {
    fn put_tx(&self, hash: TxHash, tx: Transaction);
    fn get_tx(&self, hash: &TxHash) -> Option<Transaction>;
    fn put_block(&self, hash: BlockHash, block: Block);
    fn get_block(&self, hash: &BlockHash) -> Option<Block>;
    fn contains_block(&self, hash: &BlockHash) -> bool;
}

#[derive(Default)]
struct Inner {
    blocks: HashMap<BlockHash, Block>,
    txs: HashMap<TxHash, Transaction>,
}

/// In-memory `BlockStore`. Stands in for a durable external block/tx
/// store; production embedders back this with persistent storage.
#[derive(Default)]
pub struct MemoryBlockStore {
    inner: RwLock<Inner>,
}

impl BlockStore for MemoryBlockStore {
    fn put_tx(&self, hash: TxHash, tx: Transaction) {
        let mut inner = self.inner.write();
        if inner.txs.insert(hash, tx).is_some() {
            fatal_storage_error!("tx {hash} written twice");
        }
    }

    fn get_tx(&self, hash: &TxHash) -> Option<Transaction> {
        self.inner.read().txs.get(hash).cloned()
    }

    fn put_block(&self, hash: BlockHash, block: Block) {
        let mut inner = self.inner.write();
        if inner.blocks.insert(hash, block).is_some() {
            fatal_storage_error!("block {hash} written twice");
        }
    }

    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.inner.read().blocks.get(hash).cloned()
    }

    fn contains_block(&self, hash: &BlockHash) -> bool {
        self.inner.read().blocks.contains_key(hash)
    }
}
