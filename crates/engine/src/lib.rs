//! State-transition interface, branched state and versioned storage.
//!
//! The consensus driver never mutates committed state directly. Every
//! execution attempt works on a [`BranchedState`] taken from a
//! [`StateSnapshot`] of the last committed version; only a successful commit
//! turns the branch into a [`cadence_types::Changeset`] written to a
//! [`VersionedStore`].

mod error;
mod overlay;
mod snapshot;
mod stf;
mod store;

pub use error::{ExecutionError, StoreError};
pub use overlay::BranchedState;
pub use snapshot::{ActorStore, StateSnapshot};
pub use stf::{BlockContext, StateTransition};
pub use store::{MemoryStore, VersionedStore};
