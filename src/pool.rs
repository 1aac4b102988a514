// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mempool and registration-pool boundaries. The pools themselves are an
//! external collaborator; these traits and in-memory defaults exist only
//! so `add_tx` has somewhere to route accepted transactions during tests.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::block::{Address, Transaction};
use crate::hash::TxHash;

pub trait Pool: Send + Sync {
    fn contains(&self, hash: &TxHash) -> bool;
    fn add(&self, hash: TxHash, tx: Transaction);
    fn remove(&self, hash: &TxHash) -> Option<Transaction>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Drop every pending entry. Called when the chain is shutting down.
    fn clear(&self);
}

pub trait RegPool: Send + Sync {
    fn is_registered(&self, address: &Address) -> bool;
    fn add(&self, address: Address, tx: Transaction);
    fn remove(&self, address: &Address) -> Option<Transaction>;
    /// Drop every pending entry. Called when the chain is shutting down.
    fn clear(&self);
}

#[derive(Default)]
pub struct MemoryPool {
    entries: RwLock<HashMap<TxHash, Transaction>>,
}

impl Pool for MemoryPool {
    fn contains(&self, hash: &TxHash) -> bool {
        self.entries.read().contains_key(hash)
    }

    fn add(&self, hash: TxHash, tx: Transaction) {
        self.entries.write().insert(hash, tx);
    }

    fn remove(&self, hash: &TxHash) -> Option<Transaction> {
        self.entries.write().remove(hash)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

#[derive(Default)]
pub struct MemoryRegPool {
    entries: RwLock<HashMap<Address, Transaction>>,
}

impl RegPool for MemoryRegPool {
    fn is_registered(&self, address: &Address) -> bool {
        self.entries.read().contains_key(address)
    }

    fn add(&self, address: Address, tx: Transaction) {
        self.entries.write().insert(address, tx);
    }

    fn remove(&self, address: &Address) -> Option<Transaction> {
        self.entries.write().remove(address)
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
