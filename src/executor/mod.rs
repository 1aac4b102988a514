// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replays transactions and smart-contract invocations against the
//! versioned state trees, one topological slot at a time.

pub mod sc;

use std::collections::BTreeMap;

use crate::block::{Address, Block, Transaction, TxKind};
use crate::error::Result;
use crate::hash::{BlockHash, Scid};
use crate::store::block_store::BlockStore;
use crate::store::state_store::{MerkleMap, StateStore, BALANCE_TREE, SC_META};
use crate::store::topo::{TopoRecord, TopoStore};
use sc::{InvocationContext, ScEffects, SmartContractEnvironment};

/// A contract whose code is installed automatically once the chain
/// reaches `activation_height`, rather than arriving via a transaction.
pub struct HardcodedContract {
    pub activation_height: u64,
    pub scid: Scid,
    pub code: Vec<u8>,
}

pub struct Executor<B, S, SC> {
    blocks: std::sync::Arc<B>,
    state: std::sync::Arc<S>,
    sc_env: SC,
    hardcoded: Vec<HardcodedContract>,
}

/// Outcome of replaying a single slot.
pub struct SlotOutcome {
    pub state_version: u64,
    pub is_side_block: bool,
}

impl<B, S, SC> Executor<B, S, SC>
where
    B: BlockStore,
    S: StateStore,
    SC: SmartContractEnvironment,
{
    pub fn new(
        blocks: std::sync::Arc<B>,
        state: std::sync::Arc<S>,
        sc_env: SC,
        hardcoded: Vec<HardcodedContract>,
    ) -> Self {
        Executor {
            blocks,
            state,
            sc_env,
            hardcoded,
        }
    }

    /// Replay slot `topo_index` for `block_id`, given the previous slot's
    /// state version (0 at genesis) and whether this block lost a height
    /// race (a side block contributes no effects but still advances the
    /// version).
    pub fn execute_slot(
        &self,
        topo_index: u64,
        block_id: BlockHash,
        prev_version: u64,
        is_side_block: bool,
    ) -> Result<SlotOutcome> {
        let block = self.blocks.get_block(&block_id).ok_or_else(|| {
            crate::error::Error::PastMissing(format!("block {block_id} missing from store"))
        })?;

        let snapshot = self.state.load_snapshot(prev_version);
        let mut balance_tree = snapshot.get_tree(BALANCE_TREE);
        let mut sc_meta = snapshot.get_tree(SC_META);

        if is_side_block {
            let version = self.state.commit(BTreeMap::from([
                (BALANCE_TREE.to_string(), balance_tree),
                (SC_META.to_string(), sc_meta),
            ]));
            return Ok(SlotOutcome {
                state_version: version,
                is_side_block: true,
            });
        }

        for contract in &self.hardcoded {
            if contract.activation_height == block.height {
                self.sc_env.install(contract.scid, &contract.code)?;
            }
        }

        let mut contract_trees: BTreeMap<Scid, MerkleMap> = BTreeMap::new();
        let mut fees_collected: u64 = 0;

        for tx_hash in &block.tx_hashes {
            let tx = self.blocks.get_tx(tx_hash).ok_or_else(|| {
                crate::error::Error::PastMissing(format!("tx {tx_hash} missing from store"))
            })?;

            for payload in &tx.payloads {
                if payload.is_contract_call() && !contract_trees.contains_key(&payload.scid) {
                    let tree = snapshot.get_tree(&contract_key(&payload.scid));
                    contract_trees.insert(payload.scid, tree);
                }
            }

            fees_collected += process_transaction(&tx, &mut balance_tree, block.height);

            if tx.kind == TxKind::Sc {
                for payload in &tx.payloads {
                    if !payload.is_contract_call() {
                        continue;
                    }
                    let tree = contract_trees.entry(payload.scid).or_default();
                    let existing = tree.get(b"state").unwrap_or(&[]).to_vec();
                    let effects = self.sc_env.invoke(
                        payload.scid,
                        &tx,
                        &existing,
                        &InvocationContext {
                            block_height: block.height,
                            block_time: block.timestamp,
                            topo_slot: topo_index,
                            block_hash: block_id,
                        },
                    )?;
                    apply_sc_effects(tree, &effects);
                    fees_collected += effects.fees;
                }
            }
        }

        for (scid, tree) in &contract_trees {
            let root = tree.root_hash();
            let mut meta = SCMeta::decode(sc_meta.get(scid.as_bytes()));
            meta.data_hash = root;
            sc_meta.put(scid.as_bytes().to_vec(), meta.encode());
        }

        process_coinbase(&block, &mut balance_tree, fees_collected);

        let mut commit_set = BTreeMap::from([
            (BALANCE_TREE.to_string(), balance_tree),
            (SC_META.to_string(), sc_meta),
        ]);
        for (scid, tree) in contract_trees {
            commit_set.insert(contract_key(&scid), tree);
        }
        let version = self.state.commit(commit_set);

        Ok(SlotOutcome {
            state_version: version,
            is_side_block: false,
        })
    }

    /// Write the block's topological record after a successful
    /// `execute_slot`, so the topo store and the state store advance
    /// together.
    pub fn record_topo<T: TopoStore>(
        &self,
        topo: &T,
        block_id: BlockHash,
        height: u64,
        outcome: &SlotOutcome,
    ) -> u64 {
        topo.write(TopoRecord {
            block_id,
            state_version: outcome.state_version,
            height,
            is_side_block: outcome.is_side_block,
        })
    }
}

fn contract_key(scid: &Scid) -> String {
    format!("SC_DATA_{scid}")
}

/// Minimal metadata kept per contract: the hash of its data tree. Real
/// deployments would also carry code size, deposit, owner, etc.; those
/// fields are out of scope here.
struct SCMeta {
    data_hash: crate::hash::Digest,
}

impl SCMeta {
    fn decode(bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(b) if b.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(b);
                SCMeta {
                    data_hash: crate::hash::Digest(arr),
                }
            }
            _ => SCMeta {
                data_hash: crate::hash::Digest::ZERO,
            },
        }
    }

    fn encode(&self) -> Vec<u8> {
        self.data_hash.as_bytes().to_vec()
    }
}

fn apply_sc_effects(tree: &mut MerkleMap, effects: &ScEffects) {
    tree.put(b"state".to_vec(), effects.state.clone());
}

/// Credit every payload's destination, debiting nothing on-tree since real
/// spend authorization lives in the opaque proof; accumulate fees for the
/// miner. Registration transactions instead seed a zero balance entry for
/// the newly registered address if one is not already present.
fn process_transaction(tx: &Transaction, balance_tree: &mut MerkleMap, _block_height: u64) -> u64 {
    if let TxKind::Registration { miner_address } = &tx.kind {
        let key = balance_key(miner_address);
        if balance_tree.get(&key).is_none() {
            balance_tree.put(key, 0u64.to_le_bytes().to_vec());
        }
        return tx.fees;
    }

    for payload in &tx.payloads {
        let key = balance_key(&payload.destination);
        let current = read_balance(balance_tree, &key);
        let credited = payload.amount.saturating_sub(payload.burn);
        balance_tree.put(key, (current + credited).to_le_bytes().to_vec());
    }
    tx.fees
}

fn process_coinbase(block: &Block, balance_tree: &mut MerkleMap, fees_collected: u64) {
    for payload in &block.miner_tx.payloads {
        let key = balance_key(&payload.destination);
        let current = read_balance(balance_tree, &key);
        balance_tree.put(
            key,
            (current + payload.amount + fees_collected).to_le_bytes().to_vec(),
        );
    }
}

fn balance_key(address: &Address) -> Vec<u8> {
    address.0.to_vec()
}

fn read_balance(tree: &MerkleMap, key: &[u8]) -> u64 {
    tree.get(key)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Payload, Proof};
    use crate::crypto::{TestCryptoVerifier, TestPowVerifier};
    use crate::executor::sc::NullScEnvironment;
    use crate::hash::Digest;
    use crate::store::MemoryStateStore;
    use std::sync::Arc;

    fn coinbase(amount: u64) -> Transaction {
        Transaction {
            kind: TxKind::Coinbase,
            payloads: vec![Payload {
                scid: Digest::ZERO,
                destination: Address::DEV,
                amount,
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

    fn normal_tx(nonce: u64, destination: Address, amount: u64, fees: u64) -> Transaction {
        Transaction {
            kind: TxKind::Normal,
            payloads: vec![Payload {
                scid: Digest::ZERO,
                destination,
                amount,
                burn: 0,
            }],
            proof: Proof {
                nonce,
                opaque: vec![],
            },
            height: 1,
            fees,
        }
    }

    fn new_executor() -> (
        Arc<crate::store::MemoryBlockStore>,
        Executor<crate::store::MemoryBlockStore, MemoryStateStore, NullScEnvironment>,
    ) {
        let blocks = Arc::new(crate::store::MemoryBlockStore::default());
        let state = Arc::new(MemoryStateStore::default());
        let executor = Executor::new(
            blocks.clone(),
            state,
            NullScEnvironment,
            Vec::new(),
        );
        (blocks, executor)
    }

    #[test]
    fn replaying_a_block_credits_payload_destination_and_miner_fees() {
        let (blocks, executor) = new_executor();

        let recipient = Address([5u8; 33]);
        let tx = normal_tx(1, recipient, 100, 3);
        let tx_hash = tx.hash();
        blocks.put_tx(tx_hash, tx);

        let block = Block {
            major_version: 1,
            height: 1,
            timestamp: 1000,
            tips: vec![],
            mini_blocks: vec![],
            miner_tx: coinbase(50),
            tx_hashes: vec![tx_hash],
        };
        let block_hash = block.hash();
        blocks.put_block(block_hash, block);

        let outcome = executor.execute_slot(0, block_hash, 0, false).unwrap();
        assert!(!outcome.is_side_block);

        let snapshot_trees = executor.state.load_snapshot(outcome.state_version);
        let balances = snapshot_trees.get_tree(BALANCE_TREE);
        assert_eq!(
            read_balance(&balances, &recipient.0),
            100,
            "recipient is credited the full payload amount"
        );
        assert_eq!(
            read_balance(&balances, &Address::DEV.0),
            50 + 3,
            "miner is credited its declared reward plus the block's collected fees"
        );
    }

    #[test]
    fn side_block_advances_version_without_applying_any_effects() {
        let (blocks, executor) = new_executor();

        let recipient = Address([6u8; 33]);
        let tx = normal_tx(1, recipient, 100, 3);
        let tx_hash = tx.hash();
        blocks.put_tx(tx_hash, tx);

        let block = Block {
            major_version: 1,
            height: 1,
            timestamp: 1000,
            tips: vec![],
            mini_blocks: vec![],
            miner_tx: coinbase(50),
            tx_hashes: vec![tx_hash],
        };
        let block_hash = block.hash();
        blocks.put_block(block_hash, block);

        let outcome = executor.execute_slot(0, block_hash, 0, true).unwrap();
        assert!(outcome.is_side_block);

        let snapshot_trees = executor.state.load_snapshot(outcome.state_version);
        let balances = snapshot_trees.get_tree(BALANCE_TREE);
        assert_eq!(
            read_balance(&balances, &recipient.0),
            0,
            "a side block's transactions never run"
        );
        assert_eq!(read_balance(&balances, &Address::DEV.0), 0);
    }

    #[test]
    fn registration_seeds_a_zero_balance_entry_once() {
        let (blocks, executor) = new_executor();

        let miner_address = Address([7u8; 33]);
        let tx = Transaction {
            kind: TxKind::Registration { miner_address },
            payloads: vec![],
            proof: Proof {
                nonce: 1,
                opaque: vec![],
            },
            height: 1,
            fees: 2,
        };
        let tx_hash = tx.hash();
        blocks.put_tx(tx_hash, tx);

        let block = Block {
            major_version: 1,
            height: 1,
            timestamp: 1000,
            tips: vec![],
            mini_blocks: vec![],
            miner_tx: coinbase(0),
            tx_hashes: vec![tx_hash],
        };
        let block_hash = block.hash();
        blocks.put_block(block_hash, block);

        let outcome = executor.execute_slot(0, block_hash, 0, false).unwrap();
        let snapshot_trees = executor.state.load_snapshot(outcome.state_version);
        let balances = snapshot_trees.get_tree(BALANCE_TREE);
        assert_eq!(read_balance(&balances, &miner_address.0), 0);
        assert_eq!(
            read_balance(&balances, &Address::DEV.0),
            2,
            "the registration's declared fee is still credited to the miner"
        );
    }
}
