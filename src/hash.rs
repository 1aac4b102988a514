// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content hashing. All DAG identifiers (block hashes, transaction hashes)
//! are 32-byte BLAKE2b digests over the canonical `serde_json` encoding of
//! the hashed value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-byte content hash, used for both block and transaction identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Block identifier.
pub type BlockHash = Digest;
/// Transaction identifier.
pub type TxHash = Digest;
/// Smart-contract identifier; its data tree is named by these raw bytes.
pub type Scid = Digest;

/// BLAKE2b-256 hash of the canonical JSON encoding of `value`.
pub fn hash_of<T: Serialize>(value: &T) -> Digest {
    let bytes = serde_json::to_vec(value).expect("value must be serializable");
    hash_bytes(&bytes)
}

pub fn hash_bytes(bytes: &[u8]) -> Digest {
    let hash = blake2b_simd::Params::new().hash_length(32).hash(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    Digest(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_hash() {
        let a = hash_of(&"hello");
        let b = hash_of(&"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn different_input_different_hash() {
        let a = hash_of(&"hello");
        let b = hash_of(&"world");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_lowercase_hex() {
        let d = Digest([0xab; 32]);
        assert_eq!(format!("{d}"), "ab".repeat(32));
    }
}
