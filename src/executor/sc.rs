// SPDX-License-Identifier: MIT OR Apache-2.0

//! Smart-contract execution surface. The concrete virtual machine is an
//! implementation detail; this module defines the boundary the executor
//! calls through and, behind the `smart-contracts` feature, a scripting
//! backend good enough to drive the test suite.

use crate::block::Transaction;
use crate::error::Result;
use crate::hash::{BlockHash, Scid};

/// Effects of invoking a contract: balance deltas applied by the caller and
/// a state blob folded into the contract's data tree.
#[derive(Debug, Default, Clone)]
pub struct ScEffects {
    pub state: Vec<u8>,
    pub fees: u64,
}

pub struct InvocationContext {
    pub block_height: u64,
    pub block_time: u64,
    pub topo_slot: u64,
    pub block_hash: BlockHash,
}

/// Installs and invokes smart contracts. Implementations are free to skip
/// any notion of gas metering; the executor only cares about the resulting
/// effects.
pub trait SmartContractEnvironment: Send + Sync {
    fn install(&self, scid: Scid, code: &[u8]) -> Result<()>;
    fn invoke(
        &self,
        scid: Scid,
        tx: &Transaction,
        existing_state: &[u8],
        ctx: &InvocationContext,
    ) -> Result<ScEffects>;
}

/// No-op environment: installs are remembered but invocation always
/// returns an empty effect set. Used when the `smart-contracts` feature is
/// disabled, and by tests that don't exercise SC semantics.
#[derive(Default)]
pub struct NullScEnvironment;

impl SmartContractEnvironment for NullScEnvironment {
    fn install(&self, _scid: Scid, _code: &[u8]) -> Result<()> {
        Ok(())
    }

    fn invoke(
        &self,
        _scid: Scid,
        _tx: &Transaction,
        existing_state: &[u8],
        _ctx: &InvocationContext,
    ) -> Result<ScEffects> {
        Ok(ScEffects {
            state: existing_state.to_vec(),
            fees: 0,
        })
    }
}

#[cfg(feature = "smart-contracts")]
mod boa_env {
    use super::*;
    use boa_engine::{Context, Source};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripting-backed SC environment: installed contracts are small
    /// JS-like programs evaluated fresh per invocation. The program is
    /// expected to set a global `result` value; its JSON form becomes the
    /// new contract state.
    #[derive(Default)]
    pub struct BoaScEnvironment {
        programs: Mutex<HashMap<Scid, String>>,
    }

    impl SmartContractEnvironment for BoaScEnvironment {
        fn install(&self, scid: Scid, code: &[u8]) -> Result<()> {
            let source = String::from_utf8_lossy(code).into_owned();
            self.programs.lock().insert(scid, source);
            Ok(())
        }

        fn invoke(
            &self,
            scid: Scid,
            tx: &Transaction,
            existing_state: &[u8],
            ctx: &InvocationContext,
        ) -> Result<ScEffects> {
            let programs = self.programs.lock();
            let Some(source) = programs.get(&scid) else {
                return Ok(ScEffects {
                    state: existing_state.to_vec(),
                    fees: tx.fees,
                });
            };

            let mut context = Context::default();
            let prelude = format!(
                "var height = {}; var block_time = {}; var topo_slot = {}; var fees = {};",
                ctx.block_height, ctx.block_time, ctx.topo_slot, tx.fees,
            );
            context
                .eval(Source::from_bytes(&prelude))
                .map_err(|e| crate::error::Error::Other(format!("sc prelude error: {e}")))?;
            let result = context
                .eval(Source::from_bytes(source.as_str()))
                .map_err(|e| crate::error::Error::Other(format!("sc eval error: {e}")))?;

            let rendered = result
                .to_string(&mut context)
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default();

            Ok(ScEffects {
                state: rendered.into_bytes(),
                fees: tx.fees,
            })
        }
    }
}

#[cfg(feature = "smart-contracts")]
pub use boa_env::BoaScEnvironment;
