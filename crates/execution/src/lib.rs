//! Block execution for the consensus driver.
//!
//! - [`execute_block`] / [`execute_block_blocking`] - run the state-transition
//!   function over a branched state, honouring cancellation
//! - [`OptimisticExecution`] - speculative execution keyed by (height, hash)

mod executor;
mod optimistic;

pub use executor::{execute_block, execute_block_blocking, ExecutedBlock};
pub use optimistic::{OptimisticError, OptimisticExecution};
