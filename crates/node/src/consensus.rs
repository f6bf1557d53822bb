//! The consensus driver.
//!
//! [`Consensus`] implements the application side of the block lifecycle:
//!
//! ```text
//! InitChain ─▶ PrepareProposal / ProcessProposal ─▶ FinalizeBlock ─▶ Commit ─┐
//!                      ▲                                                      │
//!                      └──────────────────────────────────────────────────────┘
//! ```
//!
//! Every execution attempt (tx check, simulation, speculative run, final run)
//! works on its own [`BranchedState`] rooted at the last committed version.
//! Only `Commit` writes to the store, and only the branch produced by the
//! most recent successful `FinalizeBlock`.

use crate::config::ServerConfig;
use crate::handlers::{ProposalContext, ServerOptions};
use crate::query::{normalize, QueryHandler, QueryRouter, Route};
use crate::request::*;
use crate::ConsensusError;
use cadence_engine::{BlockContext, BranchedState, StateTransition, VersionedStore};
use cadence_execution::{
    execute_block_blocking, ExecutedBlock, OptimisticError, OptimisticExecution,
};
use cadence_mempool::{Mempool, MempoolError, NoOpMempool};
use cadence_types::{codes, ConsensusParams, Hash, Transaction, TxCodec, TxResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A finalized block waiting for `Commit`.
struct PendingBlock<T> {
    height: u64,
    state: BranchedState,
    txs: Vec<T>,
    param_updates: Option<ConsensusParams>,
}

/// Drives a state-transition function through the consensus lifecycle.
///
/// Methods take `&self`; the consensus engine serialises lifecycle calls for
/// a height, while `check_tx`, `query` and `info` may run concurrently with
/// them.
pub struct Consensus<T: Transaction> {
    app_name: String,
    version: String,
    chain_id: RwLock<String>,

    codec: Arc<dyn TxCodec<T>>,
    stf: Arc<dyn StateTransition<T>>,
    store: Arc<dyn VersionedStore>,
    mempool: Arc<dyn Mempool<T>>,

    options: ServerOptions<T>,
    config: ServerConfig,
    queries: QueryRouter,

    params: RwLock<ConsensusParams>,
    last_committed_height: AtomicU64,
    initialized: AtomicBool,
    pending: Mutex<Option<PendingBlock<T>>>,
    optimistic: Option<OptimisticExecution<T>>,
}

impl<T: Transaction> Consensus<T> {
    /// Create a driver over `store`.
    ///
    /// If the store already holds committed versions the driver resumes from
    /// the latest one instead of waiting for `InitChain`.
    pub fn new(
        app_name: impl Into<String>,
        version: impl Into<String>,
        codec: Arc<dyn TxCodec<T>>,
        stf: Arc<dyn StateTransition<T>>,
        store: Arc<dyn VersionedStore>,
    ) -> Self {
        let app_name = app_name.into();
        let resumed = !store.is_empty();
        let last_committed_height = if resumed { store.latest_version() } else { 0 };

        if resumed {
            info!(
                app = %app_name,
                height = last_committed_height,
                "Resuming from committed state"
            );
        }

        Self {
            app_name,
            version: version.into(),
            chain_id: RwLock::new(String::new()),
            codec,
            stf,
            store,
            mempool: Arc::new(NoOpMempool),
            options: ServerOptions::default(),
            config: ServerConfig::default(),
            queries: QueryRouter::new(),
            params: RwLock::new(ConsensusParams::default()),
            last_committed_height: AtomicU64::new(last_committed_height),
            initialized: AtomicBool::new(resumed),
            pending: Mutex::new(None),
            optimistic: None,
        }
    }

    pub fn with_mempool(mut self, mempool: Arc<dyn Mempool<T>>) -> Self {
        self.mempool = mempool;
        self
    }

    pub fn with_options(mut self, options: ServerOptions<T>) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Params to use until `InitChain` supplies them. Useful when resuming.
    pub fn with_consensus_params(self, params: ConsensusParams) -> Self {
        *self.params.write() = params;
        self
    }

    /// Execute accepted proposals speculatively.
    pub fn with_optimistic_execution(mut self) -> Self {
        self.optimistic = Some(OptimisticExecution::new(Arc::clone(&self.stf)));
        self
    }

    /// Serve `path` from `handler`.
    pub fn with_query_handler(mut self, path: &str, handler: QueryHandler) -> Self {
        self.queries.register(path, handler);
        self
    }

    pub fn last_committed_height(&self) -> u64 {
        self.last_committed_height.load(Ordering::SeqCst)
    }

    pub fn consensus_params(&self) -> ConsensusParams {
        self.params.read().clone()
    }

    pub fn chain_id(&self) -> String {
        self.chain_id.read().clone()
    }

    /// The speculative engine, when enabled.
    pub fn optimistic_execution(&self) -> Option<&OptimisticExecution<T>> {
        self.optimistic.as_ref()
    }

    /// Commit genesis state as version `initial_height - 1`.
    #[instrument(level = "debug", skip_all, fields(chain_id = %req.chain_id))]
    pub async fn init_chain(
        &self,
        req: InitChainRequest,
    ) -> Result<InitChainResponse, ConsensusError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Err(ConsensusError::InvalidGenesis(format!(
                "chain already initialized at height {}",
                self.last_committed_height()
            )));
        }

        let initial_height = req.initial_height.max(1);
        let genesis_version = initial_height - 1;

        let ctx = BlockContext::new(
            initial_height,
            Hash::default(),
            req.time,
            req.chain_id.clone(),
            req.consensus_params.max_block_gas(),
        );
        let mut state = BranchedState::new(self.store.latest_snapshot()?);
        let validators = self.stf.init_genesis(&ctx, &req.app_state, &mut state)?;

        let commit_info = self.store.write_changeset(&state.to_changeset(genesis_version))?;

        *self.params.write() = req.consensus_params.clone();
        *self.chain_id.write() = req.chain_id.clone();
        self.last_committed_height
            .store(genesis_version, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            chain_id = %req.chain_id,
            initial_height,
            validators = validators.len(),
            app_hash = %commit_info.app_hash,
            "Chain initialized"
        );

        Ok(InitChainResponse {
            validators,
            consensus_params: req.consensus_params,
            app_hash: commit_info.app_hash,
        })
    }

    /// Validate a transaction for the mempool.
    ///
    /// A passing `New` check inserts the transaction into the mempool; a
    /// failing `Recheck` evicts it.
    pub async fn check_tx(
        &self,
        raw: &[u8],
        kind: CheckTxKind,
    ) -> Result<CheckTxResponse, ConsensusError> {
        let tx = self.codec.decode(raw)?;

        let mut state = BranchedState::new(self.store.latest_snapshot()?);
        let result = self
            .stf
            .validate_tx(&tx, self.config.validate_tx_gas_limit, &mut state);

        match kind {
            CheckTxKind::New if result.is_ok() => self.mempool.insert(tx)?,
            CheckTxKind::Recheck if !result.is_ok() => {
                debug!(tx = %tx.hash(), code = result.code, "Evicting tx that failed recheck");
                self.remove_from_mempool(&tx);
            }
            _ => {}
        }

        Ok(result.into())
    }

    /// Build a proposal for the next height.
    #[instrument(level = "debug", skip_all, fields(height = req.height))]
    pub async fn prepare_proposal(
        &self,
        req: PrepareProposalRequest,
    ) -> Result<PrepareProposalResponse, ConsensusError> {
        self.check_height(req.height)?;
        let handler = self
            .options
            .prepare
            .as_ref()
            .ok_or(ConsensusError::NoHandler("prepare"))?;

        let txs = handler(&self.proposal_context(req.height), &req)?;
        debug!(height = req.height, txs = txs.len(), "Prepared proposal");

        Ok(PrepareProposalResponse {
            txs: txs.iter().map(|tx| tx.bytes().to_vec()).collect(),
        })
    }

    /// Accept or reject a proposal, starting speculative execution on accept.
    #[instrument(level = "debug", skip_all, fields(height = req.height, hash = %req.hash))]
    pub async fn process_proposal(
        &self,
        req: ProcessProposalRequest,
    ) -> Result<ProcessProposalResponse, ConsensusError> {
        self.check_height(req.height)?;
        let handler = self
            .options
            .process
            .as_ref()
            .ok_or(ConsensusError::NoHandler("process"))?;

        if let Err(e) = handler(&self.proposal_context(req.height), &req) {
            warn!(height = req.height, hash = %req.hash, error = %e, "Rejecting proposal");
            return Ok(ProcessProposalResponse {
                status: ProposalStatus::Reject,
            });
        }

        if let Some(optimistic) = &self.optimistic {
            let (txs, _) = self.decode_block(&req.txs);
            let state = self.fresh_state()?;
            optimistic
                .start(self.block_context(req.height, req.hash, req.time), txs, state)
                .await;
        }

        Ok(ProcessProposalResponse {
            status: ProposalStatus::Accept,
        })
    }

    /// Execute the decided block, reusing a matching speculative run.
    ///
    /// On success the resulting state is held until [`Consensus::commit`].
    #[instrument(level = "debug", skip_all, fields(height = req.height, hash = %req.hash))]
    pub async fn finalize_block(
        &self,
        req: FinalizeBlockRequest,
    ) -> Result<FinalizeBlockResponse, ConsensusError> {
        self.check_height(req.height)?;
        if let Some(reason) = self.config.halt_reason(req.height, req.time) {
            warn!(height = req.height, %reason, "Halting");
            return Err(ConsensusError::Halted(reason));
        }

        // A retried height replaces whatever the previous attempt left behind.
        self.pending.lock().take();

        let (txs, decode_failures) = self.decode_block(&req.txs);
        let executed = self.execute(&req, &txs).await?;

        if executed.response.tx_results.len() != txs.len() {
            return Err(cadence_engine::ExecutionError::Execution(format!(
                "expected {} tx results, got {}",
                txs.len(),
                executed.response.tx_results.len()
            ))
            .into());
        }

        let ExecutedBlock { response, state } = executed;
        let tx_results = merge_results(req.txs.len(), response.tx_results, decode_failures);
        let app_hash = state.working_hash();

        info!(
            height = req.height,
            txs = tx_results.len(),
            writes = state.write_count(),
            %app_hash,
            "Block finalized"
        );

        *self.pending.lock() = Some(PendingBlock {
            height: req.height,
            state,
            txs,
            param_updates: response.consensus_param_updates.clone(),
        });

        Ok(FinalizeBlockResponse {
            tx_results,
            events: response.events,
            validator_updates: response.validator_updates,
            consensus_param_updates: response.consensus_param_updates,
            app_hash,
        })
    }

    /// Persist the finalized block and advance height.
    pub async fn commit(&self) -> Result<CommitResponse, ConsensusError> {
        let pending = self
            .pending
            .lock()
            .take()
            .ok_or(ConsensusError::NothingToCommit)?;

        let height = pending.height;
        let expected = self.last_committed_height() + 1;
        if height != expected {
            return Err(ConsensusError::InvalidHeight {
                expected,
                got: height,
            });
        }

        let commit_info = match self.store.write_changeset(&pending.state.to_changeset(height)) {
            Ok(info) => info,
            Err(e) => {
                *self.pending.lock() = Some(pending);
                return Err(e.into());
            }
        };

        self.last_committed_height.store(height, Ordering::SeqCst);

        if let Some(params) = pending.param_updates {
            info!(height, ?params, "Applying consensus param update");
            *self.params.write() = params;
        }

        for tx in &pending.txs {
            self.remove_from_mempool(tx);
        }

        if let Some(optimistic) = &self.optimistic {
            optimistic.reset().await;
        }

        let retain_height = self.config.retain_height(height);
        if self.config.pruning && retain_height > 0 {
            self.store.prune(retain_height);
        }
        info!(
            height,
            app_hash = %commit_info.app_hash,
            retain_height,
            "Block committed"
        );

        Ok(CommitResponse { retain_height })
    }

    /// Produce this node's vote extension.
    pub async fn extend_vote(
        &self,
        req: ExtendVoteRequest,
    ) -> Result<ExtendVoteResponse, ConsensusError> {
        self.check_vote_extensions(req.height)?;
        let handler = self
            .options
            .extend_vote
            .as_ref()
            .ok_or(ConsensusError::NoHandler("extend"))?;

        Ok(ExtendVoteResponse {
            vote_extension: handler(&req)?,
        })
    }

    /// Check another validator's vote extension.
    pub async fn verify_vote_extension(
        &self,
        req: VerifyVoteExtensionRequest,
    ) -> Result<VerifyVoteExtensionResponse, ConsensusError> {
        self.check_vote_extensions(req.height)?;
        let handler = self
            .options
            .verify_vote_extension
            .as_ref()
            .ok_or(ConsensusError::NoHandler("verify"))?;

        Ok(VerifyVoteExtensionResponse {
            status: handler(&req)?,
        })
    }

    pub async fn info(&self) -> Result<InfoResponse, ConsensusError> {
        let last_block_height = self.last_committed_height();
        let last_block_app_hash = if self.initialized.load(Ordering::SeqCst) {
            self.store.commit_info(last_block_height)?.app_hash
        } else {
            Hash::default()
        };

        Ok(InfoResponse {
            data: self.app_name.clone(),
            version: self.version.clone(),
            app_version: self.params.read().version.app,
            last_block_height,
            last_block_app_hash,
        })
    }

    /// Serve an out-of-band read.
    ///
    /// An empty path is answered in-band with code 1. Unknown paths and
    /// handler failures are returned as errors.
    pub async fn query(&self, req: QueryRequest) -> Result<QueryResponse, ConsensusError> {
        let path = normalize(&req.path);
        if path.is_empty() {
            let err = ConsensusError::MissingQueryPath;
            return Ok(QueryResponse {
                code: err.code(),
                log: err.to_string(),
                ..Default::default()
            });
        }

        let latest = self.last_committed_height();
        match Route::parse(path)? {
            Route::Store { name } => {
                let height = if req.height == 0 { latest } else { req.height };
                let value = self
                    .store
                    .get(name.as_bytes(), &req.data, height)?
                    .unwrap_or_default();
                Ok(QueryResponse {
                    key: req.data,
                    value,
                    height,
                    ..Default::default()
                })
            }
            Route::FilterAddr(addr) => {
                let filter = self
                    .options
                    .addr_filter
                    .as_ref()
                    .ok_or(ConsensusError::NoHandler("addr filter"))?;
                Ok(filter(addr))
            }
            Route::FilterId(id) => {
                let filter = self
                    .options
                    .id_filter
                    .as_ref()
                    .ok_or(ConsensusError::NoHandler("id filter"))?;
                Ok(filter(id))
            }
            Route::Simulate => {
                let tx = self.codec.decode(&req.data)?;
                let mut state = self.fresh_state()?;
                let result = self
                    .stf
                    .simulate(&tx, self.config.simulation_gas_limit, &mut state);
                Ok(QueryResponse::ok(serde_json::to_vec(&result)?, latest))
            }
            Route::Version => Ok(QueryResponse::ok(self.version.as_bytes().to_vec(), latest)),
            Route::Custom(path) => {
                let handler = self
                    .queries
                    .route(path)
                    .ok_or_else(|| ConsensusError::NoQueryHandler(path.to_string()))?;
                Ok(QueryResponse::ok(handler(&req.data)?, latest))
            }
        }
    }

    fn check_height(&self, height: u64) -> Result<(), ConsensusError> {
        let expected = self.last_committed_height() + 1;
        if height != expected {
            return Err(ConsensusError::InvalidHeight {
                expected,
                got: height,
            });
        }
        Ok(())
    }

    fn check_vote_extensions(&self, height: u64) -> Result<(), ConsensusError> {
        if !self.params.read().vote_extensions_enabled(height) {
            return Err(ConsensusError::FeatureDisabled { height });
        }
        Ok(())
    }

    fn proposal_context(&self, height: u64) -> ProposalContext<T> {
        ProposalContext::new(
            height,
            self.chain_id(),
            self.consensus_params(),
            Arc::clone(&self.codec),
        )
    }

    fn block_context(&self, height: u64, hash: Hash, time: u64) -> BlockContext {
        BlockContext::new(
            height,
            hash,
            time,
            self.chain_id(),
            self.params.read().max_block_gas(),
        )
    }

    /// A branch over the last committed version.
    fn fresh_state(&self) -> Result<BranchedState, ConsensusError> {
        let snapshot = self.store.snapshot(self.last_committed_height())?;
        Ok(BranchedState::new(snapshot))
    }

    /// Decode block transactions, collecting failures by position.
    fn decode_block(&self, raw: &[Vec<u8>]) -> (Vec<T>, Vec<(usize, TxResult)>) {
        let mut txs = Vec::with_capacity(raw.len());
        let mut failures = Vec::new();
        for (i, bytes) in raw.iter().enumerate() {
            match self.codec.decode(bytes) {
                Ok(tx) => txs.push(tx),
                Err(e) => {
                    debug!(index = i, error = %e, "Undecodable block transaction");
                    failures.push((i, TxResult::error(codes::TX_DECODE, "sdk", e.to_string())));
                }
            }
        }
        (txs, failures)
    }

    async fn execute(
        &self,
        req: &FinalizeBlockRequest,
        txs: &[T],
    ) -> Result<ExecutedBlock, ConsensusError> {
        if let Some(optimistic) = &self.optimistic {
            match optimistic.wait_for_result(req.height, req.hash).await {
                Ok(executed) => return Ok(executed),
                Err(OptimisticError::Execution(e)) => return Err(e.into()),
                Err(OptimisticError::Aborted { .. }) => {
                    debug!(height = req.height, "Falling back to synchronous execution");
                }
            }
        }

        let ctx = self.block_context(req.height, req.hash, req.time);
        let executed =
            execute_block_blocking(Arc::clone(&self.stf), ctx, txs.to_vec(), self.fresh_state()?)
                .await?;
        Ok(executed)
    }

    fn remove_from_mempool(&self, tx: &T) {
        match self.mempool.remove(tx) {
            Ok(()) | Err(MempoolError::NotFound(_)) => {}
            Err(e) => warn!(tx = %tx.hash(), error = %e, "Failed to remove tx from mempool"),
        }
    }
}

/// Interleave execution results with decode failures, restoring request order.
fn merge_results(
    total: usize,
    executed: Vec<TxResult>,
    failures: Vec<(usize, TxResult)>,
) -> Vec<TxResult> {
    let mut executed = executed.into_iter();
    let mut failures = failures.into_iter().peekable();
    let mut results = Vec::with_capacity(total);

    for i in 0..total {
        match failures.next_if(|(index, _)| *index == i) {
            Some((_, failure)) => results.push(failure),
            None => results.extend(executed.next()),
        }
    }
    results
}
