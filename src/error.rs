// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consensus error taxonomy.
//!
//! User-caused rejections are typed variants here; storage/integrity
//! failures never reach this type — they go through
//! [`fatal_storage_error`] instead and abort the process, since a
//! partially-committed state version can never be made safe to resume from.

use crate::hash::{BlockHash, TxHash};

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("block {0} already exists")]
    AlreadyExists(BlockHash),

    #[error("past missing: {0}")]
    PastMissing(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("timestamp too far in the future")]
    FutureTimestamp,

    #[error("timestamp not monotone with respect to tips")]
    InvalidTimestamp,

    #[error("invalid proof of work: {0}")]
    InvalidPoW(String),

    #[error("block exceeds maximum size")]
    InvalidSize,

    #[error("invalid transaction: {0}")]
    InvalidTX(String),

    #[error("transaction {0} double-spends within the block")]
    TXDoubleSpend(TxHash),

    #[error("reorg could not be resolved: {0}")]
    Reorg(String),

    #[error("validation panicked: {0}")]
    Panic(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Abort the process after logging. Storage/commit failures inside the
/// write path of `add_block` are fatal: a partial commit would leave state
/// versions non-monotonic and unreplayable, so there is no recovery branch
/// — only a single, loud abort path.
#[macro_export]
macro_rules! fatal_storage_error {
    ($($arg:tt)*) => {{
        tracing::error!(
            backtrace = %std::backtrace::Backtrace::force_capture(),
            "fatal storage error: {}", format!($($arg)*),
        );
        std::process::abort();
    }};
}
