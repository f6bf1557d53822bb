//! Priority-ordered mempool with bounded capacity.

use crate::{Mempool, MempoolError};
use cadence_types::{Hash, Transaction};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Default maximum number of pooled transactions.
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 10_000;

/// Ordering key: higher priority first, then earlier arrival, then hash.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TxPriority {
    priority: u64,
    seq: u64,
    hash: Hash,
}

impl Ord for TxPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for TxPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct PooledTx<T> {
    tx: T,
    key: TxPriority,
}

#[derive(Debug)]
struct Pool<T> {
    by_hash: HashMap<Hash, PooledTx<T>>,
    by_priority: BTreeSet<TxPriority>,
    next_seq: u64,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            by_hash: HashMap::new(),
            by_priority: BTreeSet::new(),
            next_seq: 0,
        }
    }
}

impl<T> Pool<T> {
    fn remove(&mut self, hash: &Hash) -> Option<PooledTx<T>> {
        let pooled = self.by_hash.remove(hash)?;
        self.by_priority.remove(&pooled.key);
        Some(pooled)
    }
}

/// A mempool ordered by [`Transaction::priority`], arrival order breaking ties.
///
/// When full, a new transaction evicts the lowest-ranked one only if it has a
/// strictly higher priority; otherwise it is rejected.
#[derive(Debug)]
pub struct PriorityMempool<T> {
    pool: RwLock<Pool<T>>,
    capacity: usize,
}

impl<T: Transaction> Default for PriorityMempool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MEMPOOL_CAPACITY)
    }
}

impl<T: Transaction> PriorityMempool<T> {
    /// Create a pool holding at most `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: RwLock::new(Pool::default()),
            capacity,
        }
    }

    /// Maximum number of transactions held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a transaction is pooled.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.pool.read().by_hash.contains_key(hash)
    }
}

impl<T: Transaction> Mempool<T> for PriorityMempool<T> {
    fn insert(&self, tx: T) -> Result<(), MempoolError> {
        let hash = tx.hash();
        let priority = tx.priority();
        let mut pool = self.pool.write();

        if pool.by_hash.contains_key(&hash) {
            return Err(MempoolError::Duplicate(hash));
        }

        if pool.by_hash.len() >= self.capacity {
            let lowest = pool.by_priority.last().cloned();
            match lowest {
                Some(lowest) if priority > lowest.priority => {
                    pool.remove(&lowest.hash);
                    debug!(evicted = %lowest.hash, "Evicted lowest-priority transaction");
                }
                _ => {
                    return Err(MempoolError::Full {
                        capacity: self.capacity,
                    })
                }
            }
        }

        let key = TxPriority {
            priority,
            seq: pool.next_seq,
            hash,
        };
        pool.next_seq += 1;
        pool.by_priority.insert(key.clone());
        pool.by_hash.insert(hash, PooledTx { tx, key });
        Ok(())
    }

    fn remove(&self, tx: &T) -> Result<(), MempoolError> {
        let hash = tx.hash();
        match self.pool.write().remove(&hash) {
            Some(_) => Ok(()),
            None => Err(MempoolError::NotFound(hash)),
        }
    }

    fn iterate(&self, _candidates: Vec<T>) -> Vec<T> {
        let pool = self.pool.read();
        pool.by_priority
            .iter()
            .filter_map(|key| pool.by_hash.get(&key.hash).map(|p| p.tx.clone()))
            .collect()
    }

    fn count(&self) -> usize {
        self.pool.read().by_hash.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_test_helpers::{numbered_tx, MockTx};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn tx(n: u64, priority: u64) -> MockTx {
        numbered_tx(n, 1_000).with_priority(priority)
    }

    #[traced_test]
    #[test]
    fn test_iterates_by_priority_then_arrival() {
        let mempool = PriorityMempool::new(10);
        mempool.insert(tx(1, 5)).unwrap();
        mempool.insert(tx(2, 9)).unwrap();
        mempool.insert(tx(3, 5)).unwrap();
        mempool.insert(tx(4, 1)).unwrap();

        let order: Vec<u64> = mempool
            .iterate(Vec::new())
            .iter()
            .map(|t| t.priority())
            .collect();
        assert_eq!(order, vec![9, 5, 5, 1]);

        let ordered = mempool.iterate(Vec::new());
        assert_eq!(ordered[1], tx(1, 5));
        assert_eq!(ordered[2], tx(3, 5));
    }

    #[traced_test]
    #[test]
    fn test_ignores_candidates() {
        let mempool = PriorityMempool::new(10);
        mempool.insert(tx(1, 1)).unwrap();
        let selected = mempool.iterate(vec![tx(7, 7), tx(8, 8)]);
        assert_eq!(selected, vec![tx(1, 1)]);
    }

    #[traced_test]
    #[test]
    fn test_duplicate_and_missing() {
        let mempool = PriorityMempool::new(10);
        mempool.insert(tx(1, 1)).unwrap();
        assert_eq!(
            mempool.insert(tx(1, 1)),
            Err(MempoolError::Duplicate(tx(1, 1).hash()))
        );

        mempool.remove(&tx(1, 1)).unwrap();
        assert_eq!(
            mempool.remove(&tx(1, 1)),
            Err(MempoolError::NotFound(tx(1, 1).hash()))
        );
        assert_eq!(mempool.count(), 0);
    }

    #[traced_test]
    #[test]
    fn test_full_pool_evicts_only_for_higher_priority() {
        let mempool = PriorityMempool::new(2);
        mempool.insert(tx(1, 5)).unwrap();
        mempool.insert(tx(2, 3)).unwrap();

        assert_eq!(
            mempool.insert(tx(3, 3)),
            Err(MempoolError::Full { capacity: 2 })
        );

        mempool.insert(tx(4, 4)).unwrap();
        assert_eq!(mempool.count(), 2);
        assert!(!mempool.contains(&tx(2, 3).hash()));
        assert!(mempool.contains(&tx(4, 4).hash()));
    }

    #[traced_test]
    #[test]
    fn test_concurrent_insert_and_remove() {
        let mempool = Arc::new(PriorityMempool::new(1_000));

        let handles: Vec<_> = (0..4u64)
            .map(|worker| {
                let mempool = Arc::clone(&mempool);
                std::thread::spawn(move || {
                    for i in 0..50u64 {
                        let t = tx(worker * 1_000 + i, i);
                        mempool.insert(t.clone()).unwrap();
                        if i % 2 == 0 {
                            mempool.remove(&t).unwrap();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(mempool.count(), 100);
        assert_eq!(mempool.iterate(Vec::new()).len(), 100);
    }
}
