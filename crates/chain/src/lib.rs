//! # Watchtower Chain Library
//!
//! Chain-facing collaborators of the watchtower reporting engine.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `execution` | Execution-layer reads, submission calls, transaction sender |
//! | `protocol` | Staking protocol and AMM pool contract reads |
//! | `consensus` | Beacon-chain reads |
//! | `beacon` | Beacon API HTTP client |
//! | `storage_keys` | Submission flag key layout |
//! | `mock` | In-memory chain for tests and dry runs |
//! | `error` | [`ChainError`] |
//!
//! ## Concurrency
//!
//! Every trait here is `Send + Sync` and object safe; the engine shares one
//! instance of each across both report categories via [`ChainClients`].

use std::sync::Arc;

pub mod beacon;
pub mod consensus;
pub mod error;
pub mod execution;
pub mod mock;
pub mod protocol;
pub mod storage_keys;

pub use beacon::HttpBeaconClient;
pub use consensus::ConsensusClient;
pub use error::ChainError;
pub use execution::{
    ExecutionClient, GasInfo, SubmissionCall, TransactionSender, TxOptions, TxReceipt,
};
pub use mock::MockChain;
pub use protocol::{MinipoolInfo, PoolReader, PoolReserves, ProtocolReader, RewardsIntervalInfo};

/// Every chain collaborator the engine needs, shared across tasks.
#[derive(Clone)]
pub struct ChainClients {
    pub execution: Arc<dyn ExecutionClient>,
    pub protocol: Arc<dyn ProtocolReader>,
    pub pools: Arc<dyn PoolReader>,
    pub consensus: Arc<dyn ConsensusClient>,
    pub sender: Arc<dyn TransactionSender>,
}
