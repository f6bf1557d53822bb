//! Mempool interface and implementations.
//!
//! - [`Mempool`] - the interface the consensus driver and proposal selector use
//! - [`NoOpMempool`] - passthrough that stores nothing
//! - [`PriorityMempool`] - bounded pool ordered by transaction priority

mod mempool;
mod noop;
mod priority;

pub use mempool::{Mempool, MempoolError};
pub use noop::NoOpMempool;
pub use priority::{PriorityMempool, DEFAULT_MEMPOOL_CAPACITY};
