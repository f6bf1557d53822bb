//! Optimistic (speculative) block execution.
//!
//! Once a proposal is accepted the driver starts executing it in the
//! background while the consensus engine is still voting. If the block that
//! is finally decided carries the same (height, hash), `FinalizeBlock` reuses
//! that output instead of executing again.
//!
//! At most one execution is tracked. Starting another for a different key,
//! or waiting on a key that does not match the tracked one, cancels the stale
//! worker and awaits its exit before its state is dropped, so an abandoned
//! result can never reach commit.

use crate::executor::{execute_block, ExecutedBlock};
use cadence_engine::{BlockContext, BranchedState, ExecutionError, StateTransition};
use cadence_types::{Hash, Transaction};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors from waiting on an optimistic execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimisticError {
    /// The tracked execution is for a different block, or nothing is tracked.
    /// The caller must execute synchronously.
    #[error("Optimistic execution aborted: no result for height {height} hash {hash}")]
    Aborted {
        /// Requested height.
        height: u64,
        /// Requested block hash.
        hash: Hash,
    },

    /// The speculative run itself failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

enum RunState {
    Running(JoinHandle<Result<ExecutedBlock, ExecutionError>>),
    /// Result already handed to the caller; kept until reset.
    Consumed,
}

struct Tracked {
    height: u64,
    hash: Hash,
    cancel: CancellationToken,
    run: RunState,
}

impl Tracked {
    fn matches(&self, height: u64, hash: &Hash) -> bool {
        self.height == height && self.hash == *hash
    }

    /// Cancel the worker and wait for it to exit, dropping its output.
    async fn abort(self) {
        self.cancel.cancel();
        if let RunState::Running(handle) = self.run {
            match handle.await {
                Ok(Ok(_)) => debug!(height = self.height, "Stale execution finished before cancel"),
                Ok(Err(e)) => debug!(height = self.height, error = %e, "Stale execution stopped"),
                Err(e) => warn!(height = self.height, error = %e, "Stale execution worker failed"),
            }
        }
    }
}

/// Runs the state-transition function speculatively, keyed by (height, hash).
pub struct OptimisticExecution<T: Transaction> {
    stf: Arc<dyn StateTransition<T>>,
    tracked: Mutex<Option<Tracked>>,
}

impl<T: Transaction> std::fmt::Debug for OptimisticExecution<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracked = self.tracked.lock();
        f.debug_struct("OptimisticExecution")
            .field("height", &tracked.as_ref().map(|t| t.height))
            .field("hash", &tracked.as_ref().map(|t| t.hash))
            .finish()
    }
}

impl<T: Transaction> OptimisticExecution<T> {
    pub fn new(stf: Arc<dyn StateTransition<T>>) -> Self {
        Self {
            stf,
            tracked: Mutex::new(None),
        }
    }

    /// Start executing `txs` over `state` on a blocking worker.
    ///
    /// Returns once the worker is spawned. A start for the key already
    /// tracked is ignored; a start for any other key first aborts the
    /// tracked execution.
    pub async fn start(&self, ctx: BlockContext, txs: Vec<T>, state: BranchedState) {
        let (height, hash) = ctx.key();

        let stale = {
            let mut tracked = self.tracked.lock();
            if tracked.as_ref().is_some_and(|t| t.matches(height, &hash)) {
                debug!(height, %hash, "Optimistic execution already running");
                return;
            }
            tracked.take()
        };

        if let Some(stale) = stale {
            info!(
                stale_height = stale.height,
                stale_hash = %stale.hash,
                height,
                %hash,
                "Aborting superseded optimistic execution"
            );
            stale.abort().await;
        }

        let cancel = ctx.cancellation_token();
        let stf = Arc::clone(&self.stf);
        let handle =
            tokio::task::spawn_blocking(move || execute_block(stf.as_ref(), &ctx, &txs, state));

        debug!(height, %hash, "Optimistic execution started");
        *self.tracked.lock() = Some(Tracked {
            height,
            hash,
            cancel,
            run: RunState::Running(handle),
        });
    }

    /// Wait for the execution tracked under (height, hash) and take its output.
    ///
    /// On a key mismatch the tracked execution is aborted and untracked, and
    /// [`OptimisticError::Aborted`] is returned. A failed run is untracked and
    /// its error returned as-is.
    pub async fn wait_for_result(
        &self,
        height: u64,
        hash: Hash,
    ) -> Result<ExecutedBlock, OptimisticError> {
        let tracked = self.tracked.lock().take();

        let Some(tracked) = tracked else {
            return Err(OptimisticError::Aborted { height, hash });
        };

        if !tracked.matches(height, &hash) {
            info!(
                tracked_height = tracked.height,
                tracked_hash = %tracked.hash,
                height,
                %hash,
                "Optimistic execution does not match decided block"
            );
            tracked.abort().await;
            return Err(OptimisticError::Aborted { height, hash });
        }

        let Tracked {
            cancel, run, ..
        } = tracked;
        let handle = match run {
            RunState::Running(handle) => handle,
            RunState::Consumed => {
                // Output already taken; the block must be re-executed.
                return Err(OptimisticError::Aborted { height, hash });
            }
        };

        let executed = handle
            .await
            .map_err(|e| ExecutionError::Worker(e.to_string()))??;

        debug!(height, %hash, "Reusing optimistic execution result");
        *self.tracked.lock() = Some(Tracked {
            height,
            hash,
            cancel,
            run: RunState::Consumed,
        });
        Ok(executed)
    }

    /// Whether the tracked execution (running or consumed) is for this key.
    pub fn is_tracking(&self, height: u64, hash: &Hash) -> bool {
        self.tracked
            .lock()
            .as_ref()
            .is_some_and(|t| t.matches(height, hash))
    }

    /// Whether anything is tracked.
    pub fn initialized(&self) -> bool {
        self.tracked.lock().is_some()
    }

    /// Abort any tracked execution and clear bookkeeping.
    pub async fn reset(&self) {
        let tracked = self.tracked.lock().take();
        if let Some(tracked) = tracked {
            tracked.abort().await;
        }
    }
}
