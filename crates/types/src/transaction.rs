//! Transaction abstraction and decoding.

use crate::Hash;
use std::fmt;
use thiserror::Error;

/// A decoded transaction.
///
/// The adapter never looks inside a transaction beyond these accessors; the
/// payload is interpreted only by the state-transition function. The raw
/// bytes the transaction was decoded from are kept so proposals can be
/// returned to the consensus engine byte-for-byte.
pub trait Transaction: Clone + fmt::Debug + Send + Sync + 'static {
    /// Transaction identity.
    fn hash(&self) -> Hash;

    /// Account that signed the transaction.
    fn sender(&self) -> &[u8];

    /// Gas the sender is willing to spend.
    fn gas_limit(&self) -> u64;

    /// Encoded form, exactly as received.
    fn bytes(&self) -> &[u8];

    /// Mempool priority. Higher is selected first.
    fn priority(&self) -> u64 {
        0
    }

    /// Encoded size in bytes.
    fn size(&self) -> u64 {
        self.bytes().len() as u64
    }
}

/// Decodes raw transaction bytes.
///
/// Decoding must be pure and deterministic: every node decoding the same
/// bytes must reach the same result.
pub trait TxCodec<T: Transaction>: Send + Sync + 'static {
    /// Decode a transaction from its wire bytes.
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

/// Errors returned when transaction bytes cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No bytes were supplied.
    #[error("empty transaction bytes")]
    Empty,

    /// Input ended before the transaction was complete.
    #[error("transaction truncated: needed {needed} more bytes")]
    Truncated {
        /// Bytes missing from the input.
        needed: usize,
    },

    /// Bytes remained after a complete transaction was read.
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    /// Codec-specific failure.
    #[error("malformed transaction: {0}")]
    Malformed(String),
}
