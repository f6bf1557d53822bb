//! The state-transition interface.

use crate::{BranchedState, ExecutionError};
use cadence_types::{BlockResponse, Hash, Transaction, TxResult, ValidatorUpdate};
use tokio_util::sync::CancellationToken;

/// Block-level inputs to the state-transition function.
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// Height being executed.
    pub height: u64,

    /// Proposal/block hash supplied by the consensus engine.
    pub hash: Hash,

    /// Block time (unix milliseconds).
    pub timestamp: u64,

    /// Chain this block belongs to.
    pub chain_id: String,

    /// Block gas limit in force, if any.
    pub max_block_gas: Option<u64>,

    /// Signalled when the result of this execution is no longer wanted.
    cancel: CancellationToken,
}

impl BlockContext {
    /// Create a context with a fresh cancellation token.
    pub fn new(
        height: u64,
        hash: Hash,
        timestamp: u64,
        chain_id: impl Into<String>,
        max_block_gas: Option<u64>,
    ) -> Self {
        Self {
            height,
            hash,
            timestamp,
            chain_id: chain_id.into(),
            max_block_gas,
            cancel: CancellationToken::new(),
        }
    }

    /// The (height, hash) pair identifying this execution.
    pub fn key(&self) -> (u64, Hash) {
        (self.height, self.hash)
    }

    /// Whether the execution has been abandoned.
    ///
    /// Long-running state-transition functions should check this between
    /// transactions and return [`ExecutionError::Cancelled`] when set.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle that cancels this execution.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Error to return when bailing out on cancellation.
    pub fn cancelled(&self) -> ExecutionError {
        ExecutionError::Cancelled {
            height: self.height,
        }
    }
}

/// The application's state-transition function.
///
/// Implementations must be deterministic: the same context, transactions and
/// starting state must produce the same results and writes on every node.
/// All writes go to the supplied [`BranchedState`]; the driver decides
/// whether they are ever committed.
pub trait StateTransition<T: Transaction>: Send + Sync + 'static {
    /// Initialise genesis state from the application's genesis document.
    fn init_genesis(
        &self,
        _ctx: &BlockContext,
        _app_state: &[u8],
        _state: &mut BranchedState,
    ) -> Result<Vec<ValidatorUpdate>, ExecutionError> {
        Ok(Vec::new())
    }

    /// Execute a block.
    ///
    /// Per-transaction failures (out of gas, failed messages) are reported in
    /// the returned results and must leave no writes behind. Returning an
    /// error fails the whole block.
    fn deliver_block(
        &self,
        ctx: &BlockContext,
        txs: &[T],
        state: &mut BranchedState,
    ) -> Result<BlockResponse, ExecutionError>;

    /// Stateless and cheap stateful checks for mempool admission, metered
    /// against `gas_limit`.
    fn validate_tx(&self, tx: &T, gas_limit: u64, state: &mut BranchedState) -> TxResult;

    /// Run a transaction as if it were delivered, metered against
    /// `gas_limit`. Writes land in `state` and are discarded by the caller.
    fn simulate(&self, tx: &T, gas_limit: u64, state: &mut BranchedState) -> TxResult;
}
