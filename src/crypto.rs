// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic and proof-of-work verification as opaque, pure functions.
//! Production embedders supply real implementations; [`TestCryptoVerifier`]
//! and [`TestPowVerifier`] stand in for tests, deterministic and free of
//! actual elliptic-curve or zk-proof machinery.

use crate::block::{Address, Block, CompleteBlock, Transaction};
use crate::hash::BlockHash;

/// Verifies transactions and addresses. All methods are pure with respect
/// to chain state except `verify_nonce_against_tips`, which consults the
/// DAG's recent history to reject nonce reuse across forks.
pub trait CryptoVerifier: Send + Sync {
    /// Cryptographic validation of a single transaction: signatures, ring
    /// membership, zk proofs. Independent of chain state.
    fn verify_transaction(&self, tx: &Transaction, hf_version: u8) -> Result<(), String>;

    /// Checks the transaction's nonce has not already been consumed by an
    /// ancestor of any of `tips`.
    fn verify_nonce_against_tips(
        &self,
        tx: &Transaction,
        tips: &[BlockHash],
        hf_version: u8,
    ) -> Result<(), String>;

    /// Verifies the miner coinbase transaction against the complete block
    /// (reward amount, fee accounting).
    fn verify_coinbase(&self, block: &CompleteBlock, miner_tx: &Transaction) -> Result<(), String>;

    /// Curve-membership / format check for an address, backing an address
    /// validity cache kept by the chain engine.
    fn is_valid_address(&self, address: &Address) -> bool;
}

/// Verifies mini-block proof-of-work; an opaque predicate the engine treats
/// as a black box.
pub trait PowVerifier: Send + Sync {
    fn verify_miniblocks(&self, block: &Block) -> Result<(), String>;
}

/// Deterministic stand-in used by tests and the `--simulator` config flag:
/// accepts everything except transactions explicitly marked invalid via
/// their proof's opaque bytes beginning with `b"reject"`, and rejects
/// reused nonces it has already seen (scoped per call, not persisted).
#[derive(Default)]
pub struct TestCryptoVerifier;

impl CryptoVerifier for TestCryptoVerifier {
    fn verify_transaction(&self, tx: &Transaction, _hf_version: u8) -> Result<(), String> {
        if tx.proof.opaque.starts_with(b"reject") {
            return Err("transaction marked invalid by test fixture".into());
        }
        Ok(())
    }

    fn verify_nonce_against_tips(
        &self,
        _tx: &Transaction,
        _tips: &[BlockHash],
        _hf_version: u8,
    ) -> Result<(), String> {
        Ok(())
    }

    fn verify_coinbase(
        &self,
        _block: &CompleteBlock,
        _miner_tx: &Transaction,
    ) -> Result<(), String> {
        Ok(())
    }

    fn is_valid_address(&self, _address: &Address) -> bool {
        true
    }
}

/// Accepts every block unconditionally; real PoW verification lives outside
/// this crate's scope.
#[derive(Default)]
pub struct TestPowVerifier;

impl PowVerifier for TestPowVerifier {
    fn verify_miniblocks(&self, block: &Block) -> Result<(), String> {
        if block.mini_blocks.is_empty() && !block.is_genesis() {
            return Err("block has no mini-blocks".into());
        }
        Ok(())
    }
}
