//! Consensus-engine adapter.
//!
//! Implements the application side of an ABCI-style block lifecycle on top
//! of a [`cadence_engine::StateTransition`], a
//! [`cadence_engine::VersionedStore`] and a [`cadence_mempool::Mempool`]:
//!
//! - [`Consensus`] - the driver: genesis, tx checks, proposals, finalize,
//!   commit, vote extensions, info and queries
//! - [`DefaultProposalHandler`] - budget-based proposal building/validation
//! - [`QueryRouter`] - registry for application query paths
//! - [`ServerConfig`] / [`ServerOptions`] - operator settings and handlers

mod config;
mod consensus;
mod error;
mod handlers;
mod query;
mod request;


pub use config::{
    ConfigError, ServerConfig, DEFAULT_SIMULATION_GAS_LIMIT, DEFAULT_VALIDATE_TX_GAS_LIMIT,
};
pub use consensus::Consensus;
pub use error::ConsensusError;
pub use handlers::{
    DefaultProposalHandler, ExtendVoteHandler, PeerFilter, PrepareHandler, ProcessHandler,
    ProposalContext, ServerOptions, VerifyVoteExtensionHandler,
};
pub use query::{QueryHandler, QueryRouter};
pub use request::{
    CheckTxKind, CheckTxResponse, CommitResponse, ExtendVoteRequest, ExtendVoteResponse,
    FinalizeBlockRequest, FinalizeBlockResponse, InfoResponse, InitChainRequest,
    InitChainResponse, PrepareProposalRequest, PrepareProposalResponse, ProcessProposalRequest,
    ProcessProposalResponse, ProposalStatus, QueryRequest, QueryResponse, VerifyStatus,
    VerifyVoteExtensionRequest, VerifyVoteExtensionResponse,
};
