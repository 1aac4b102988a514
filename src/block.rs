// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data model: blocks, transactions, mini-blocks.

use serde::{Deserialize, Serialize};

use crate::hash::{hash_of, BlockHash, Digest, Scid, TxHash};

/// An opaque account address. We do not implement the underlying elliptic
/// curve; addresses are compared and hashed as raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 33]);

impl Address {
    pub const DEV: Address = Address([0u8; 33]);

    pub fn from_bytes(bytes: [u8; 33]) -> Self {
        Address(bytes)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_slice()))
    }
}

/// PoW artifact carrying the hash of a miner key. A block aggregates one or
/// more mini-blocks; their collective validity is checked by an external,
/// opaque predicate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniBlock {
    pub miner_key_hash: Digest,
    pub nonce: u64,
    pub timestamp: u64,
}

/// A single value-transfer or contract-call payload within a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Contract this payload targets; all-zero means an ordinary payment.
    pub scid: Scid,
    pub destination: Address,
    pub amount: u64,
    pub burn: u64,
}

impl Payload {
    pub fn is_contract_call(&self) -> bool {
        !self.scid.is_zero()
    }
}

/// The proof attached to a transaction. `nonce` must be unique among
/// non-registration payloads within a block; the actual ring-confidentiality
/// / zk proof bytes are out of scope here and are represented only as an
/// opaque blob for hashing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub nonce: u64,
    pub opaque: Vec<u8>,
}

/// Tagged union over transaction kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TxKind {
    Registration { miner_address: Address },
    Normal,
    Burn,
    Sc,
    Coinbase,
    Premine,
}

impl TxKind {
    pub fn is_registration(&self) -> bool {
        matches!(self, TxKind::Registration { .. })
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, TxKind::Coinbase)
    }

    pub fn is_premine(&self) -> bool {
        matches!(self, TxKind::Premine)
    }

    pub fn is_sc(&self) -> bool {
        matches!(self, TxKind::Sc)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TxKind,
    pub payloads: Vec<Payload>,
    pub proof: Proof,
    /// Last-seen chain height when this transaction was composed.
    pub height: u64,
    pub fees: u64,
}

impl Transaction {
    pub fn hash(&self) -> TxHash {
        hash_of(self)
    }

    /// True for transactions that carry no independent state effects of
    /// their own beyond the block's reward plumbing; excluded from the
    /// cross-tx double-spend accumulator.
    pub fn is_reward_only(&self) -> bool {
        matches!(self.kind, TxKind::Coinbase | TxKind::Premine)
    }
}

/// A block header: everything except the transaction payloads themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub major_version: u8,
    pub height: u64,
    pub timestamp: u64,
    /// Up to two parent block hashes.
    pub tips: Vec<BlockHash>,
    pub mini_blocks: Vec<MiniBlock>,
    pub miner_tx: Transaction,
    pub tx_hashes: Vec<TxHash>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        hash_of(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.tips.is_empty()
    }
}

/// A block together with the actual transaction payloads aligned one-to-one
/// with `tx_hashes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteBlock {
    pub block: Block,
    pub transactions: Vec<Transaction>,
}

impl CompleteBlock {
    pub fn hash(&self) -> BlockHash {
        self.block.hash()
    }

    /// `tx_hashes` matches exactly the hashes of the supplied transactions,
    /// with no duplicates, preserving declared order.
    pub fn tx_hashes_match(&self) -> bool {
        if self.block.tx_hashes.len() != self.transactions.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::with_capacity(self.transactions.len());
        for (declared, tx) in self.block.tx_hashes.iter().zip(self.transactions.iter()) {
            if *declared != tx.hash() || !seen.insert(*declared) {
                return false;
            }
        }
        true
    }
}
