//! Passthrough mempool.

use crate::{Mempool, MempoolError};
use cadence_types::Transaction;

/// A mempool that stores nothing.
///
/// Inserts and removes succeed without effect, and iteration hands back the
/// consensus engine's own candidate list unchanged. Useful when the
/// consensus engine runs its own mempool, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMempool;

impl<T: Transaction> Mempool<T> for NoOpMempool {
    fn insert(&self, _tx: T) -> Result<(), MempoolError> {
        Ok(())
    }

    fn remove(&self, _tx: &T) -> Result<(), MempoolError> {
        Ok(())
    }

    fn iterate(&self, candidates: Vec<T>) -> Vec<T> {
        candidates
    }

    fn count(&self) -> usize {
        0
    }
}
