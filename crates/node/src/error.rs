//! Errors returned by the consensus driver.

use cadence_engine::{ExecutionError, StoreError};
use cadence_mempool::MempoolError;
use cadence_types::{codes, DecodeError};
use thiserror::Error;

/// Errors surfaced to the consensus engine.
///
/// Every variant fails the call without advancing height or touching
/// committed state. Per-transaction failures never appear here; they are
/// reported as result codes.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Request height is not the next height to be decided.
    #[error("Invalid height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },

    /// Genesis cannot be applied.
    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),

    /// Transaction bytes could not be decoded.
    #[error("Failed to decode transaction: {0}")]
    Decode(#[from] DecodeError),

    /// A required handler function is not configured.
    #[error("no {0} function was set")]
    NoHandler(&'static str),

    /// Query with an empty path.
    #[error("no query path provided")]
    MissingQueryPath,

    /// No handler is registered for a query path.
    #[error("no query handler found for {0}")]
    NoQueryHandler(String),

    /// Vote extensions are not active at this height.
    #[error("vote extensions are not enabled at height {height}")]
    FeatureDisabled { height: u64 },

    /// The state-transition function failed; carries its error unchanged.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    /// Commit was called with no finalized block pending.
    #[error("No finalized block to commit")]
    NothingToCommit,

    /// The node is configured to stop at this block.
    #[error("Halting per configuration: {0}")]
    Halted(String),

    /// A proposal failed validation.
    #[error("Proposal rejected: {0}")]
    ProposalRejected(String),

    /// A query result could not be encoded.
    #[error("Failed to encode query result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ConsensusError {
    /// Result code reported when this error is returned in-band.
    pub fn code(&self) -> u32 {
        match self {
            ConsensusError::Decode(_) => codes::TX_DECODE,
            ConsensusError::NoQueryHandler(_) => codes::UNKNOWN_REQUEST,
            _ => codes::INTERNAL,
        }
    }
}
