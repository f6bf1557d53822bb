//! Core types for the Cadence consensus adapter.
//!
//! These types are shared by the storage engine, the execution layer, the
//! mempool and the consensus driver. They carry no behaviour beyond hashing
//! and small helpers.

mod hash;
mod params;
mod results;
mod state;
mod transaction;

pub use hash::Hash;
pub use params::{
    BlockParams, ConsensusParams, FeatureParams, VersionParams, DEFAULT_MAX_BLOCK_BYTES,
};
pub use results::{codes, BlockResponse, Event, EventAttribute, TxResult, ValidatorUpdate};
pub use state::{Changeset, CommitInfo, KvPair, StateChanges, StoreInfo};
pub use transaction::{DecodeError, Transaction, TxCodec};
