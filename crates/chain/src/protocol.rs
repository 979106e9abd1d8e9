//! # Protocol Contract Reads
//!
//! Typed, read-only view of the staking protocol's contracts and of the
//! TWAP liquidity pool. Implementations sit on top of whatever contract
//! binding layer the deployment uses; the reporting engine only ever sees
//! these typed calls.
//!
//! Reads that take a `block` MUST be evaluated against state at exactly
//! that block. Reads without one use the latest state.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use watchtower_common::{MinipoolDepositType, MinipoolStatus, ReportCategory, ValidatorPubkey};

use crate::error::ChainError;

// ════════════════════════════════════════════════════════════════════════════════
// TYPES
// ════════════════════════════════════════════════════════════════════════════════

/// On-chain state of a single minipool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinipoolInfo {
    pub address: Address,
    pub pubkey: ValidatorPubkey,
    pub status: MinipoolStatus,
    pub deposit_type: MinipoolDepositType,
    pub user_deposit_balance: U256,
    pub node_deposit_balance: U256,
    /// Node commission, 1e18 = 100%.
    pub node_fee: U256,
    pub node_address: Address,
}

/// Rewards interval bookkeeping used to approximate the smoothing pool share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardsIntervalInfo {
    /// Index of the interval currently accruing.
    pub index: u64,
    /// Unix timestamp the current interval started.
    pub start_time: u64,
    /// Nominal interval length in seconds.
    pub interval_duration: u64,
}

/// Constant-product pool reserves as returned by `getReserves()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    pub reserve0: U256,
    pub reserve1: U256,
    /// Timestamp (mod 2^32) of the pool's last cumulative update.
    pub block_timestamp_last: u32,
}

// ════════════════════════════════════════════════════════════════════════════════
// PROTOCOL READER
// ════════════════════════════════════════════════════════════════════════════════

/// Typed reads of the staking protocol's contracts.
#[async_trait]
pub trait ProtocolReader: Send + Sync {
    /// Whether `node` is a member of the trusted oracle set.
    async fn is_trusted_member(&self, node: Address) -> Result<bool, ChainError>;

    /// Whether submissions are currently enabled for `category`.
    async fn submissions_enabled(&self, category: ReportCategory) -> Result<bool, ChainError>;

    /// Last block for which `category` reached consensus on-chain
    /// (`getBalancesBlock` / `getPricesBlock`).
    async fn recorded_block(&self, category: ReportCategory) -> Result<u64, ChainError>;

    /// Latest block the protocol currently accepts reports for.
    async fn latest_reportable_block(&self, category: ReportCategory) -> Result<u64, ChainError>;

    /// Submission frequency of `category`, in blocks.
    async fn submission_frequency(&self, category: ReportCategory) -> Result<u64, ChainError>;

    /// Boolean flag from the protocol's key-value storage.
    async fn storage_bool(&self, key: B256) -> Result<bool, ChainError>;

    async fn deposit_pool_balance(&self, block: u64) -> Result<U256, ChainError>;

    async fn minipool_addresses(&self, block: u64) -> Result<Vec<Address>, ChainError>;

    async fn minipool_info(&self, minipool: Address, block: u64) -> Result<MinipoolInfo, ChainError>;

    async fn node_addresses(&self, block: u64) -> Result<Vec<Address>, ChainError>;

    /// Fee distributor contract owned by `node`.
    async fn fee_distributor(&self, node: Address, block: u64) -> Result<Address, ChainError>;

    /// Address of the receipt-token (rETH) contract.
    async fn reth_address(&self, block: u64) -> Result<Address, ChainError>;

    async fn reth_total_supply(&self, block: u64) -> Result<U256, ChainError>;

    async fn rewards_interval(&self, block: u64) -> Result<RewardsIntervalInfo, ChainError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// POOL READER
// ════════════════════════════════════════════════════════════════════════════════

/// Typed reads of AMM pools used as price oracles.
#[async_trait]
pub trait PoolReader: Send + Sync {
    /// Concentrated-liquidity `observe(secondsAgos)`: one tick cumulative
    /// per requested offset, in request order.
    async fn observe(
        &self,
        pool: Address,
        seconds_agos: &[u32],
        block: u64,
    ) -> Result<Vec<i64>, ChainError>;

    /// Constant-product `getReserves()`.
    async fn reserves(&self, pool: Address, block: u64) -> Result<PoolReserves, ChainError>;

    /// `price0CumulativeLast()` when `token0` is true, else
    /// `price1CumulativeLast()`.
    async fn price_cumulative_last(
        &self,
        pool: Address,
        token0: bool,
        block: u64,
    ) -> Result<U256, ChainError>;
}
