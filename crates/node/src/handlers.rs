//! Proposal, vote-extension and peer-filter handlers.
//!
//! The driver delegates application-specific decisions to plain function
//! objects bundled in [`ServerOptions`]. [`DefaultProposalHandler`] provides
//! the standard budget-based proposal building and validation.

use crate::request::{
    ExtendVoteRequest, PrepareProposalRequest, ProcessProposalRequest, QueryResponse,
    VerifyStatus, VerifyVoteExtensionRequest,
};
use crate::ConsensusError;
use cadence_mempool::Mempool;
use cadence_types::{ConsensusParams, DecodeError, Transaction, TxCodec};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a proposal handler can see about the height being proposed.
pub struct ProposalContext<T: Transaction> {
    pub height: u64,
    pub chain_id: String,
    /// Params in force for `height`.
    pub params: ConsensusParams,
    codec: Arc<dyn TxCodec<T>>,
}

impl<T: Transaction> ProposalContext<T> {
    pub fn new(
        height: u64,
        chain_id: impl Into<String>,
        params: ConsensusParams,
        codec: Arc<dyn TxCodec<T>>,
    ) -> Self {
        Self {
            height,
            chain_id: chain_id.into(),
            params,
            codec,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        self.codec.decode(bytes)
    }
}

/// Selects the transactions for a proposal this node builds.
pub type PrepareHandler<T> = Arc<
    dyn Fn(&ProposalContext<T>, &PrepareProposalRequest) -> Result<Vec<T>, ConsensusError>
        + Send
        + Sync,
>;

/// Validates a proposal built by another node. An error rejects it.
pub type ProcessHandler<T> = Arc<
    dyn Fn(&ProposalContext<T>, &ProcessProposalRequest) -> Result<(), ConsensusError>
        + Send
        + Sync,
>;

/// Produces this node's vote extension.
pub type ExtendVoteHandler =
    Arc<dyn Fn(&ExtendVoteRequest) -> Result<Vec<u8>, ConsensusError> + Send + Sync>;

/// Checks another validator's vote extension.
pub type VerifyVoteExtensionHandler = Arc<
    dyn Fn(&VerifyVoteExtensionRequest) -> Result<VerifyStatus, ConsensusError> + Send + Sync,
>;

/// Decides whether to connect to a peer address or node id. The response
/// code is returned to the consensus engine unchanged.
pub type PeerFilter = Arc<dyn Fn(&str) -> QueryResponse + Send + Sync>;

/// Handler functions used by the driver.
///
/// `Default` installs no-op handlers: prepare selects nothing, process
/// accepts, extend returns an empty extension and verify accepts. Peer
/// filters have no default. [`ServerOptions::empty`] leaves everything unset,
/// so the corresponding calls fail with [`ConsensusError::NoHandler`].
pub struct ServerOptions<T: Transaction> {
    pub prepare: Option<PrepareHandler<T>>,
    pub process: Option<ProcessHandler<T>>,
    pub extend_vote: Option<ExtendVoteHandler>,
    pub verify_vote_extension: Option<VerifyVoteExtensionHandler>,
    pub addr_filter: Option<PeerFilter>,
    pub id_filter: Option<PeerFilter>,
}

impl<T: Transaction> Default for ServerOptions<T> {
    fn default() -> Self {
        Self {
            prepare: Some(Arc::new(
                |_: &ProposalContext<T>,
                 _: &PrepareProposalRequest|
                 -> Result<Vec<T>, ConsensusError> { Ok(Vec::new()) },
            )),
            process: Some(Arc::new(
                |_: &ProposalContext<T>,
                 _: &ProcessProposalRequest|
                 -> Result<(), ConsensusError> { Ok(()) },
            )),
            extend_vote: Some(Arc::new(
                |_: &ExtendVoteRequest| -> Result<Vec<u8>, ConsensusError> { Ok(Vec::new()) },
            )),
            verify_vote_extension: Some(Arc::new(
                |_: &VerifyVoteExtensionRequest| -> Result<VerifyStatus, ConsensusError> {
                    Ok(VerifyStatus::Accept)
                },
            )),
            addr_filter: None,
            id_filter: None,
        }
    }
}

impl<T: Transaction> ServerOptions<T> {
    /// Options with no handlers at all.
    pub fn empty() -> Self {
        Self {
            prepare: None,
            process: None,
            extend_vote: None,
            verify_vote_extension: None,
            addr_filter: None,
            id_filter: None,
        }
    }

    /// Use `handler` for both building and validating proposals.
    pub fn with_proposal_handler(mut self, handler: DefaultProposalHandler<T>) -> Self {
        let handler = Arc::new(handler);
        let prepare = Arc::clone(&handler);
        self.prepare = Some(Arc::new(
            move |ctx: &ProposalContext<T>, req: &PrepareProposalRequest| {
                prepare.prepare(ctx, req)
            },
        ));
        self.process = Some(Arc::new(
            move |ctx: &ProposalContext<T>, req: &ProcessProposalRequest| {
                handler.process(ctx, req)
            },
        ));
        self
    }

    pub fn with_prepare_handler(mut self, handler: PrepareHandler<T>) -> Self {
        self.prepare = Some(handler);
        self
    }

    pub fn with_process_handler(mut self, handler: ProcessHandler<T>) -> Self {
        self.process = Some(handler);
        self
    }

    pub fn with_extend_vote_handler(mut self, handler: ExtendVoteHandler) -> Self {
        self.extend_vote = Some(handler);
        self
    }

    pub fn with_verify_vote_extension_handler(
        mut self,
        handler: VerifyVoteExtensionHandler,
    ) -> Self {
        self.verify_vote_extension = Some(handler);
        self
    }

    pub fn with_addr_filter(mut self, filter: PeerFilter) -> Self {
        self.addr_filter = Some(filter);
        self
    }

    pub fn with_id_filter(mut self, filter: PeerFilter) -> Self {
        self.id_filter = Some(filter);
        self
    }
}

/// Budget-based proposal building and validation over a mempool.
///
/// Building is greedy first-fit over the mempool's priority order: candidates
/// that fail to decode are skipped, and selection stops at the first
/// transaction that would push the running byte total past `max_tx_bytes` or
/// the running gas total past the block gas limit. Validation applies the
/// same budgets (bytes against the block's `max_bytes`) but rejects the whole
/// proposal on any decode failure or overrun.
pub struct DefaultProposalHandler<T: Transaction> {
    mempool: Arc<dyn Mempool<T>>,
}

impl<T: Transaction> DefaultProposalHandler<T> {
    pub fn new(mempool: Arc<dyn Mempool<T>>) -> Self {
        Self { mempool }
    }

    /// Select transactions for a new proposal.
    pub fn prepare(
        &self,
        ctx: &ProposalContext<T>,
        req: &PrepareProposalRequest,
    ) -> Result<Vec<T>, ConsensusError> {
        let candidates: Vec<T> = req
            .txs
            .iter()
            .filter_map(|raw| match ctx.decode(raw) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    debug!(height = ctx.height, error = %e, "Skipping undecodable candidate");
                    None
                }
            })
            .collect();

        let max_gas = ctx.params.max_block_gas();
        let mut total_bytes = 0u64;
        let mut total_gas = 0u64;
        let mut selected = Vec::new();

        for tx in self.mempool.iterate(candidates) {
            let bytes = total_bytes.saturating_add(tx.size());
            let gas = total_gas.saturating_add(tx.gas_limit());

            if bytes > req.max_tx_bytes || max_gas.is_some_and(|max| gas > max) {
                trace!(
                    height = ctx.height,
                    bytes,
                    gas,
                    "Proposal budget reached"
                );
                break;
            }

            total_bytes = bytes;
            total_gas = gas;
            selected.push(tx);
        }

        debug!(
            height = ctx.height,
            selected = selected.len(),
            total_bytes,
            total_gas,
            "Built proposal"
        );
        Ok(selected)
    }

    /// Validate a proposal from another node.
    pub fn process(
        &self,
        ctx: &ProposalContext<T>,
        req: &ProcessProposalRequest,
    ) -> Result<(), ConsensusError> {
        let max_bytes = ctx.params.block.max_bytes;
        let max_gas = ctx.params.max_block_gas();
        let mut total_bytes = 0u64;
        let mut total_gas = 0u64;

        for raw in &req.txs {
            let tx = ctx.decode(raw)?;

            total_bytes = total_bytes.saturating_add(tx.size());
            if total_bytes > max_bytes {
                return Err(ConsensusError::ProposalRejected(format!(
                    "block size {total_bytes} exceeds max bytes {max_bytes}"
                )));
            }

            total_gas = total_gas.saturating_add(tx.gas_limit());
            if let Some(max) = max_gas {
                if total_gas > max {
                    return Err(ConsensusError::ProposalRejected(format!(
                        "block gas {total_gas} exceeds max gas {max}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_mempool::{NoOpMempool, PriorityMempool};
    use cadence_test_helpers::{
        mock_tx, numbered_tx, undecodable_tx_bytes, MockTx, MockTxCodec, MOCK_TX_GAS,
    };
    use tracing_test::traced_test;

    fn context(params: ConsensusParams) -> ProposalContext<MockTx> {
        ProposalContext::new(1, "test-chain", params, Arc::new(MockTxCodec))
    }

    fn passthrough() -> DefaultProposalHandler<MockTx> {
        DefaultProposalHandler::new(Arc::new(NoOpMempool))
    }

    fn prepare_request(max_tx_bytes: u64, txs: Vec<Vec<u8>>) -> PrepareProposalRequest {
        PrepareProposalRequest {
            height: 1,
            max_tx_bytes,
            txs,
            ..Default::default()
        }
    }

    fn raw(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|_| mock_tx().bytes().to_vec()).collect()
    }

    #[traced_test]
    #[test]
    fn test_prepare_respects_byte_budget() {
        let handler = passthrough();
        let ctx = context(ConsensusParams::default());

        let cases = [(0, 3, 0), (300, 3, 2), (256, 2, 2), (10_000, 3, 3)];
        for (max_tx_bytes, offered, expected) in cases {
            let selected = handler
                .prepare(&ctx, &prepare_request(max_tx_bytes, raw(offered)))
                .unwrap();
            assert_eq!(selected.len(), expected, "max_tx_bytes = {max_tx_bytes}");
        }
    }

    #[traced_test]
    #[test]
    fn test_prepare_respects_gas_budget() {
        let handler = passthrough();
        let ctx = context(ConsensusParams::default().with_max_gas(3 * MOCK_TX_GAS));

        let selected = handler
            .prepare(&ctx, &prepare_request(10_000, raw(4)))
            .unwrap();
        assert_eq!(selected.len(), 3);

        let selected = handler
            .prepare(&ctx, &prepare_request(10_000, raw(3)))
            .unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[traced_test]
    #[test]
    fn test_prepare_skips_undecodable() {
        let handler = passthrough();
        let ctx = context(ConsensusParams::default());
        let txs = vec![
            mock_tx().bytes().to_vec(),
            undecodable_tx_bytes(),
            mock_tx().bytes().to_vec(),
        ];

        let selected = handler.prepare(&ctx, &prepare_request(10_000, txs)).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[traced_test]
    #[test]
    fn test_prepare_is_first_fit() {
        let handler = passthrough();
        let ctx = context(ConsensusParams::default());
        let small = numbered_tx(1, 1_000);
        let txs = vec![
            mock_tx().bytes().to_vec(),
            mock_tx().bytes().to_vec(),
            small.bytes().to_vec(),
        ];

        // The small tx would fit after the second one is refused, but
        // selection stops at the first overrun.
        let budget = mock_tx().size() + small.size();
        let selected = handler.prepare(&ctx, &prepare_request(budget, txs)).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_prepare_uses_mempool_priority_order() {
        let mempool = Arc::new(PriorityMempool::new(10));
        mempool.insert(numbered_tx(1, 1_000).with_priority(1)).unwrap();
        mempool.insert(numbered_tx(2, 1_000).with_priority(9)).unwrap();
        let handler = DefaultProposalHandler::new(mempool as Arc<dyn Mempool<MockTx>>);
        let ctx = context(ConsensusParams::default());

        let selected = handler.prepare(&ctx, &prepare_request(10_000, raw(3))).unwrap();
        assert_eq!(selected, vec![
            numbered_tx(2, 1_000).with_priority(9),
            numbered_tx(1, 1_000).with_priority(1),
        ]);
    }

    #[traced_test]
    #[test]
    fn test_process_rejects_gas_overrun_and_bad_tx() {
        let handler = passthrough();
        let ctx = context(ConsensusParams::default().with_max_gas(3 * MOCK_TX_GAS));

        let accepted = ProcessProposalRequest {
            height: 1,
            txs: raw(3),
            ..Default::default()
        };
        assert!(handler.process(&ctx, &accepted).is_ok());

        let too_much_gas = ProcessProposalRequest {
            height: 1,
            txs: raw(4),
            ..Default::default()
        };
        assert!(matches!(
            handler.process(&ctx, &too_much_gas),
            Err(ConsensusError::ProposalRejected(_))
        ));

        let bad_tx = ProcessProposalRequest {
            height: 1,
            txs: vec![
                mock_tx().bytes().to_vec(),
                undecodable_tx_bytes(),
                mock_tx().bytes().to_vec(),
            ],
            ..Default::default()
        };
        assert!(matches!(
            handler.process(&ctx, &bad_tx),
            Err(ConsensusError::Decode(_))
        ));
    }

    #[traced_test]
    #[test]
    fn test_process_rejects_byte_overrun() {
        let handler = passthrough();
        let ctx = context(ConsensusParams::default().with_max_bytes(256));

        let req = ProcessProposalRequest {
            height: 1,
            txs: raw(3),
            ..Default::default()
        };
        assert!(matches!(
            handler.process(&ctx, &req),
            Err(ConsensusError::ProposalRejected(_))
        ));
    }
}
