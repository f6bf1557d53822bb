//! Error types for execution and storage.

use thiserror::Error;

/// Errors returned by the state-transition function.
///
/// These fail the whole block (or genesis) being executed. Per-transaction
/// failures are reported as result codes instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Genesis state could not be initialised.
    #[error("Genesis initialisation failed: {0}")]
    Genesis(String),

    /// Block execution failed.
    #[error("Block execution failed: {0}")]
    Execution(String),

    /// Execution was cancelled before it completed.
    #[error("Execution cancelled at height {height}")]
    Cancelled {
        /// Height of the abandoned block.
        height: u64,
    },

    /// The worker running the execution panicked or was torn down.
    #[error("Execution worker failed: {0}")]
    Worker(String),
}

/// Errors from the versioned store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No data was committed at the requested version.
    #[error("Version {0} not found")]
    VersionNotFound(u64),

    /// Versions must be written contiguously.
    #[error("Non-contiguous version: expected {expected}, got {got}")]
    NonContiguousVersion {
        /// Next version the store accepts.
        expected: u64,
        /// Version that was offered.
        got: u64,
    },

    /// Backend-specific failure.
    #[error("Storage error: {0}")]
    Backend(String),
}
