//! The mempool interface.

use cadence_types::{Hash, Transaction};
use thiserror::Error;

/// Errors returned by mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    /// The pool is full and the transaction does not outrank anything in it.
    #[error("mempool is full ({capacity} transactions)")]
    Full {
        /// Pool capacity.
        capacity: usize,
    },

    /// The transaction is already pooled.
    #[error("transaction {0} already in mempool")]
    Duplicate(Hash),

    /// The transaction is not pooled.
    #[error("transaction {0} not found in mempool")]
    NotFound(Hash),
}

/// Candidate transaction storage for block proposals.
///
/// Implementations are shared between the mempool-maintenance path
/// (`CheckTx`) and proposal building, so every method takes `&self` and must
/// be safe to call concurrently.
pub trait Mempool<T: Transaction>: Send + Sync + 'static {
    /// Add a transaction.
    fn insert(&self, tx: T) -> Result<(), MempoolError>;

    /// Remove a transaction.
    fn remove(&self, tx: &T) -> Result<(), MempoolError>;

    /// Transactions in priority order (highest first) for proposal building.
    ///
    /// `candidates` are the transactions the consensus engine offered with
    /// the proposal request. Passthrough implementations return them as-is;
    /// pooling implementations ignore them and return their own contents.
    fn iterate(&self, candidates: Vec<T>) -> Vec<T>;

    /// Number of pooled transactions.
    fn count(&self) -> usize;
}
