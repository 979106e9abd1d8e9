//! # Execution Layer & Transaction Submission
//!
//! [`ExecutionClient`] is the read side of the base chain: headers,
//! balances, sync status. [`TransactionSender`] is the write side: it is
//! backed by the node wallet, which signs every transaction it sends.
//!
//! ## Contract
//!
//! - Implementations MUST NOT retry internally; the reporting engine
//!   treats every error as "try again next tick".
//! - Implementations MUST be safe for concurrent use.

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use watchtower_common::{BlockHeader, NetworkBalances, PriceObservation, ReportCategory};

use crate::error::ChainError;

// ════════════════════════════════════════════════════════════════════════════════
// READS
// ════════════════════════════════════════════════════════════════════════════════

/// Read access to the execution layer.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Whether the client is synced to the network head.
    async fn is_synced(&self) -> Result<bool, ChainError>;

    /// Current head block number.
    async fn latest_block_number(&self) -> Result<u64, ChainError>;

    /// Header of a specific block.
    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, ChainError>;

    /// Native balance of `address` at `block`.
    async fn balance_at(&self, address: Address, block: u64) -> Result<U256, ChainError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// SUBMISSION CALLS
// ════════════════════════════════════════════════════════════════════════════════

/// Oracle report transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionCall {
    /// `submitBalances(block, totalEth, stakingEth, rethSupply)`
    SubmitBalances {
        block: u64,
        total_eth: U256,
        staking_eth: U256,
        reth_supply: U256,
    },
    /// `submitPrices(block, price)`
    SubmitPrices { block: u64, price: U256 },
}

impl SubmissionCall {
    pub fn balances(balances: &NetworkBalances) -> Self {
        Self::SubmitBalances {
            block: balances.block,
            total_eth: balances.total_eth(),
            staking_eth: balances.minipools_staking,
            reth_supply: balances.reth_supply,
        }
    }

    pub fn prices(observation: &PriceObservation) -> Self {
        Self::SubmitPrices {
            block: observation.block,
            price: observation.price,
        }
    }

    pub fn category(&self) -> ReportCategory {
        match self {
            Self::SubmitBalances { .. } => ReportCategory::Balances,
            Self::SubmitPrices { .. } => ReportCategory::Prices,
        }
    }

    pub fn block(&self) -> u64 {
        match self {
            Self::SubmitBalances { block, .. } | Self::SubmitPrices { block, .. } => *block,
        }
    }

    /// The submitted values in argument order, excluding the block.
    /// These are exactly the words folded into the exact submission key.
    pub fn values(&self) -> Vec<U256> {
        match self {
            Self::SubmitBalances {
                total_eth,
                staking_eth,
                reth_supply,
                ..
            } => vec![*total_eth, *staking_eth, *reth_supply],
            Self::SubmitPrices { price, .. } => vec![*price],
        }
    }
}

impl fmt::Display for SubmissionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubmitBalances { block, .. } => write!(f, "submitBalances@{}", block),
            Self::SubmitPrices { block, .. } => write!(f, "submitPrices@{}", block),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GAS / RECEIPTS
// ════════════════════════════════════════════════════════════════════════════════

/// Gas estimate for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasInfo {
    /// Raw `eth_estimateGas` result.
    pub estimated_gas_limit: u64,
    /// Estimate padded for safety; used as the transaction gas limit.
    pub safe_gas_limit: u64,
    /// Current network base fee per gas, wei.
    pub base_fee: U256,
}

/// Fee and gas settings applied to an outgoing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub gas_limit: u64,
}

/// Inclusion result of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// SENDER TRAIT
// ════════════════════════════════════════════════════════════════════════════════

/// Wallet-backed transaction submission.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    /// Address of the node account that signs submissions.
    fn node_address(&self) -> Address;

    async fn estimate_gas(&self, call: &SubmissionCall) -> Result<GasInfo, ChainError>;

    /// Signs and broadcasts `call`; returns the transaction hash.
    async fn send(&self, call: &SubmissionCall, options: &TxOptions) -> Result<B256, ChainError>;

    /// Blocks until `tx_hash` is included in a block.
    async fn wait_for_inclusion(&self, tx_hash: B256) -> Result<TxReceipt, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_common::units::eth_to_wei;

    #[test]
    fn balances_call_carries_total_staking_and_supply() {
        let balances = NetworkBalances {
            block: 42,
            deposit_pool: eth_to_wei(1),
            minipools_total: eth_to_wei(2),
            minipools_staking: eth_to_wei(1),
            distributor_share_total: eth_to_wei(3),
            smoothing_pool_share: eth_to_wei(4),
            reth_contract_balance: eth_to_wei(5),
            reth_supply: eth_to_wei(14),
        };
        let call = SubmissionCall::balances(&balances);

        assert_eq!(call.category(), ReportCategory::Balances);
        assert_eq!(call.block(), 42);
        assert_eq!(
            call.values(),
            vec![eth_to_wei(15), eth_to_wei(1), eth_to_wei(14)]
        );
        assert_eq!(call.to_string(), "submitBalances@42");
    }

    #[test]
    fn prices_call_values() {
        let call = SubmissionCall::prices(&PriceObservation {
            block: 9,
            price: U256::from(77u64),
        });
        assert_eq!(call.category(), ReportCategory::Prices);
        assert_eq!(call.values(), vec![U256::from(77u64)]);
    }
}
