//! Errors raised by the reporting engine.

use alloy_primitives::Address;
use thiserror::Error;
use watchtower_chain::ChainError;
use watchtower_common::ConfigError;

/// Failure of one report attempt.
///
/// None of these are fatal to the process: the failing report is logged
/// and the category's next tick starts from scratch.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Chain read or write failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Chain read failed inside a named sub-computation.
    #[error("{context}: {source}")]
    Read {
        context: &'static str,
        #[source]
        source: ChainError,
    },

    /// Per-minipool computation failed.
    #[error("minipool {address}: {reason}")]
    Minipool { address: Address, reason: String },

    /// Target epoch is ahead of the consensus head.
    #[error("target epoch {target} is ahead of head epoch {head}")]
    EpochAhead { target: u64, head: u64 },

    /// On-chain submission frequency is zero.
    #[error("submission frequency for {0} is zero")]
    InvalidFrequency(String),

    /// TWAP window has no elapsed time between the two observations.
    #[error("no time elapsed between price observations at blocks {previous} and {current}")]
    ZeroElapsedTime { previous: u64, current: u64 },

    #[error("tick {0} out of range")]
    TickOutOfRange(i64),

    #[error("expected at least 2 pool observations, got {0}")]
    InsufficientObservations(usize),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Pool reserve for the priced token is zero.
    #[error("pool reserve of the reward token is zero")]
    EmptyReserve,

    #[error("smoothing pool estimator: {0}")]
    Estimator(String),

    #[error("no price pool address configured")]
    MissingPoolAddress,

    /// Inclusion succeeded but the transaction reverted.
    #[error("submission {call} reverted in tx {tx_hash}")]
    Reverted {
        call: String,
        tx_hash: alloy_primitives::B256,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Background report task panicked or was cancelled.
    #[error("report task aborted: {0}")]
    TaskAborted(String),
}

impl OracleError {
    /// Attaches a sub-computation name to a chain error.
    pub fn read(context: &'static str) -> impl FnOnce(ChainError) -> OracleError {
        move |source| OracleError::Read { context, source }
    }
}
