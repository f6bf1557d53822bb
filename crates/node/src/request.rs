//! Request and response types for the block lifecycle.
//!
//! Times are unix milliseconds. Transactions travel as raw bytes; decoding
//! happens inside the driver.

use cadence_types::{ConsensusParams, Event, Hash, TxResult, ValidatorUpdate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct InitChainRequest {
    pub time: u64,
    pub chain_id: String,
    /// First height the chain will decide. 0 is treated as 1.
    pub initial_height: u64,
    pub consensus_params: ConsensusParams,
    /// Application genesis document, passed to the state-transition function.
    pub app_state: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitChainResponse {
    pub validators: Vec<ValidatorUpdate>,
    pub consensus_params: ConsensusParams,
    pub app_hash: Hash,
}

/// Why a transaction is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckTxKind {
    /// First time the node sees the transaction.
    #[default]
    New,
    /// Re-validation of a pooled transaction after a commit.
    Recheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckTxResponse {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
}

impl CheckTxResponse {
    pub fn is_ok(&self) -> bool {
        self.code == cadence_types::codes::OK
    }
}

impl From<TxResult> for CheckTxResponse {
    fn from(result: TxResult) -> Self {
        Self {
            code: result.code,
            codespace: result.codespace,
            log: result.log,
            gas_wanted: result.gas_wanted,
            gas_used: result.gas_used,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrepareProposalRequest {
    pub height: u64,
    pub time: u64,
    /// Byte budget for the selected transactions.
    pub max_tx_bytes: u64,
    /// Candidates offered by the consensus engine's own mempool.
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrepareProposalResponse {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessProposalRequest {
    pub height: u64,
    pub hash: Hash,
    pub time: u64,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProposalResponse {
    pub status: ProposalStatus,
}

#[derive(Debug, Clone, Default)]
pub struct FinalizeBlockRequest {
    pub height: u64,
    pub hash: Hash,
    pub time: u64,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeBlockResponse {
    /// One result per request transaction, in request order.
    pub tx_results: Vec<TxResult>,
    pub events: Vec<Event>,
    pub validator_updates: Vec<ValidatorUpdate>,
    /// Params that take effect once this block is committed.
    pub consensus_param_updates: Option<ConsensusParams>,
    /// App hash the block will have once committed.
    pub app_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    /// Blocks below this height may be pruned by the consensus engine.
    pub retain_height: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExtendVoteRequest {
    pub height: u64,
    pub hash: Hash,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendVoteResponse {
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyVoteExtensionRequest {
    pub height: u64,
    pub hash: Hash,
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyVoteExtensionResponse {
    pub status: VerifyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    /// Application name.
    pub data: String,
    pub version: String,
    pub app_version: u64,
    pub last_block_height: u64,
    pub last_block_app_hash: Hash,
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub path: String,
    pub data: Vec<u8>,
    /// Height to read at. 0 reads the latest committed version.
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResponse {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub height: u64,
}

impl QueryResponse {
    /// Successful response carrying `value`.
    pub fn ok(value: Vec<u8>, height: u64) -> Self {
        Self {
            value,
            height,
            ..Default::default()
        }
    }

    /// Response carrying only a result code, as returned by peer filters.
    pub fn with_code(code: u32) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == cadence_types::codes::OK
    }
}
