//! Execution results returned to the consensus engine.

use crate::ConsensusParams;
use serde::{Deserialize, Serialize};

/// Well-known result codes.
///
/// Zero is success; every other value is an application-defined failure.
pub mod codes {
    /// Execution succeeded.
    pub const OK: u32 = 0;

    /// Generic failure, also used for malformed queries.
    pub const INTERNAL: u32 = 1;

    /// Transaction bytes could not be decoded.
    pub const TX_DECODE: u32 = 2;

    /// Transaction ran out of gas.
    pub const OUT_OF_GAS: u32 = 11;

    /// Requested query target does not exist.
    pub const UNKNOWN_REQUEST: u32 = 6;
}

/// A key/value attribute attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
    /// Whether the consensus engine should index this attribute.
    pub index: bool,
}

/// A typed event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Create an event with no attributes.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Append an indexed attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
            index: true,
        });
        self
    }
}

/// Outcome of executing one transaction.
///
/// A failing transaction is reported through a non-zero `code`; it never
/// fails the block it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxResult {
    pub code: u32,
    pub codespace: String,
    pub data: Vec<u8>,
    pub log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub events: Vec<Event>,
}

impl TxResult {
    /// Successful result.
    pub fn ok(gas_wanted: u64, gas_used: u64) -> Self {
        Self {
            code: codes::OK,
            gas_wanted,
            gas_used,
            ..Default::default()
        }
    }

    /// Failed result with a code and log line.
    pub fn error(code: u32, codespace: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            code,
            codespace: codespace.into(),
            log: log.into(),
            ..Default::default()
        }
    }

    /// Whether the transaction succeeded.
    pub fn is_ok(&self) -> bool {
        self.code == codes::OK
    }
}

/// A change to a validator's voting power.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Key type, e.g. `ed25519`.
    pub pub_key_type: String,
    pub pub_key: Vec<u8>,
    /// New voting power; zero removes the validator.
    pub power: i64,
}

/// Output of the state-transition function for one block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockResponse {
    /// One result per executed transaction, in block order.
    pub tx_results: Vec<TxResult>,

    /// Block-level events (begin/end block hooks).
    pub events: Vec<Event>,

    /// Validator set changes to hand back to the consensus engine.
    pub validator_updates: Vec<ValidatorUpdate>,

    /// New consensus params, applied once the block commits.
    pub consensus_param_updates: Option<ConsensusParams>,
}
