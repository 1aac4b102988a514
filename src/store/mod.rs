// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage boundary: blocks/transactions, versioned state trees, and the
//! topological index, each behind its own trait so the engine can run
//! entirely against in-memory adapters in tests.

pub mod block_store;
pub mod state_store;
pub mod topo;

pub use block_store::{BlockStore, MemoryBlockStore};
pub use state_store::{MemoryStateStore, MerkleMap, Snapshot, StateStore, BALANCE_TREE, SC_META};
pub use topo::{MemoryTopoStore, TopoRecord, TopoStore};
