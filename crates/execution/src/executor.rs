//! Block execution shared by synchronous and speculative runs.

use cadence_engine::{BlockContext, BranchedState, ExecutionError, StateTransition};
use cadence_types::{BlockResponse, Transaction};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Output of a successful block execution.
#[derive(Debug, Clone)]
pub struct ExecutedBlock {
    /// Results, events and updates returned by the state-transition function.
    pub response: BlockResponse,

    /// Branched state holding the block's writes, pending commit.
    pub state: BranchedState,
}

/// Execute `txs` over `state`.
///
/// Cancellation is checked before and after the state-transition function
/// runs, so a cancelled execution never yields a result even when the
/// function itself ignores the token.
pub fn execute_block<T: Transaction>(
    stf: &dyn StateTransition<T>,
    ctx: &BlockContext,
    txs: &[T],
    mut state: BranchedState,
) -> Result<ExecutedBlock, ExecutionError> {
    if ctx.is_cancelled() {
        return Err(ctx.cancelled());
    }

    let response = stf.deliver_block(ctx, txs, &mut state)?;

    if ctx.is_cancelled() {
        return Err(ctx.cancelled());
    }

    debug!(
        height = ctx.height,
        txs = txs.len(),
        writes = state.write_count(),
        "Block executed"
    );
    Ok(ExecutedBlock { response, state })
}

/// Run [`execute_block`] on the blocking thread pool and await it.
#[instrument(level = "debug", skip_all, fields(height = ctx.height))]
pub async fn execute_block_blocking<T: Transaction>(
    stf: Arc<dyn StateTransition<T>>,
    ctx: BlockContext,
    txs: Vec<T>,
    state: BranchedState,
) -> Result<ExecutedBlock, ExecutionError> {
    tokio::task::spawn_blocking(move || execute_block(stf.as_ref(), &ctx, &txs, state))
        .await
        .map_err(|e| ExecutionError::Worker(e.to_string()))?
}
