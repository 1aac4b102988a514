// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin CLI entry point: parse configuration, initialize logging, start the
//! chain, and block forever waiting on new blocks.

use std::sync::Arc;

use clap::Parser;
use dagledger::chain::Chain;
use dagledger::config::{Cli, Config};
use dagledger::crypto::{TestCryptoVerifier, TestPowVerifier};
use dagledger::executor::sc::NullScEnvironment;
use dagledger::executor::{Executor, HardcodedContract};
use dagledger::pool::{MemoryPool, MemoryRegPool};
use dagledger::store::{MemoryBlockStore, MemoryStateStore, MemoryTopoStore};
use dagledger::validator::DefaultValidator;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        node_tag = %config.node_tag,
        protocol_version = %config.protocol_version,
        simulator = config.simulator,
        "starting"
    );

    // Real embedders supply durable storage and production crypto/PoW
    // verifiers; the in-memory adapters and deterministic stubs here exist
    // so the binary runs standalone for local experimentation.
    let blocks = Arc::new(MemoryBlockStore::default());
    let state = Arc::new(MemoryStateStore::default());
    let topo = Arc::new(MemoryTopoStore::default());
    let pool = Arc::new(MemoryPool::default());
    let regpool = Arc::new(MemoryRegPool::default());
    let validator = DefaultValidator::new(TestCryptoVerifier, TestPowVerifier);
    let executor = Executor::new(
        blocks.clone(),
        state.clone(),
        NullScEnvironment,
        Vec::<HardcodedContract>::new(),
    );

    let chain = Chain::new(
        blocks,
        state,
        topo,
        pool,
        regpool,
        validator,
        executor,
        config,
        Vec::new(),
    );

    let genesis = genesis_block();
    chain.start(genesis)?;
    tracing::info!("genesis seeded, awaiting blocks");

    let mut since = chain.notifiers().new_block.generation();
    loop {
        since = chain.notifiers().new_block.wait_for_next(since);
        tracing::debug!(generation = since, "new block notification");
    }
}

fn genesis_block() -> dagledger::block::CompleteBlock {
    use dagledger::block::{Address, Block, Payload, Proof, Transaction, TxKind};
    use dagledger::hash::Digest;

    dagledger::block::CompleteBlock {
        block: Block {
            major_version: 1,
            height: 0,
            timestamp: 0,
            tips: vec![],
            mini_blocks: vec![],
            miner_tx: Transaction {
                kind: TxKind::Premine,
                payloads: vec![Payload {
                    scid: Digest::ZERO,
                    destination: Address::DEV,
                    amount: 0,
                    burn: 0,
                }],
                proof: Proof {
                    nonce: 0,
                    opaque: vec![],
                },
                height: 0,
                fees: 0,
            },
            tx_hashes: vec![],
        },
        transactions: vec![],
    }
}
