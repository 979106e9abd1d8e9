//! # Submission Executor
//!
//! Sends one report transaction:
//!
//! 1. estimate gas
//! 2. abort (not an error) if `base_fee + priority_fee > max_fee`
//! 3. send with the fee cap, tip cap and safe gas limit
//! 4. wait for inclusion; a reverted receipt is an error
//!
//! Callers hold the category's flight guard for the whole call.

use std::sync::Arc;

use alloy_primitives::U256;
use tracing::{info, warn};
use watchtower_chain::{SubmissionCall, TransactionSender, TxOptions, TxReceipt};
use watchtower_common::config::FeeConfig;
use watchtower_common::units::format_eth;
use watchtower_common::ConfigError;

use crate::error::OracleError;

/// Fee ceiling applied to every submission, wei per gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeLimits {
    pub max_fee: U256,
    pub priority_fee: U256,
}

impl FeeLimits {
    pub fn from_config(config: &FeeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_fee: config.max_fee_wei()?,
            priority_fee: config.max_priority_fee_wei()?,
        })
    }
}

/// Result of a submission attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Included(TxReceipt),
    /// Network fees are above the configured ceiling; nothing was sent.
    FeeCeilingExceeded { base_fee: U256, priority_fee: U256, max_fee: U256 },
}

pub struct SubmissionExecutor {
    sender: Arc<dyn TransactionSender>,
    limits: FeeLimits,
}

impl SubmissionExecutor {
    pub fn new(sender: Arc<dyn TransactionSender>, limits: FeeLimits) -> Self {
        Self { sender, limits }
    }

    pub async fn submit(&self, call: &SubmissionCall) -> Result<SubmissionOutcome, OracleError> {
        let prefix = call.category().log_prefix();

        let gas = self.sender.estimate_gas(call).await?;
        let required = gas.base_fee.saturating_add(self.limits.priority_fee);
        if required > self.limits.max_fee {
            warn!(
                "{} base fee {} wei + priority fee {} wei exceeds max fee {} wei, not submitting {}",
                prefix, gas.base_fee, self.limits.priority_fee, self.limits.max_fee, call
            );
            return Ok(SubmissionOutcome::FeeCeilingExceeded {
                base_fee: gas.base_fee,
                priority_fee: self.limits.priority_fee,
                max_fee: self.limits.max_fee,
            });
        }

        let options = TxOptions {
            max_fee_per_gas: self.limits.max_fee,
            max_priority_fee_per_gas: self.limits.priority_fee,
            gas_limit: gas.safe_gas_limit,
        };
        let max_cost = self.limits.max_fee.saturating_mul(U256::from(gas.safe_gas_limit));
        info!(
            "{} sending {} (gas estimate {}, limit {}, max cost {} ETH)",
            prefix,
            call,
            gas.estimated_gas_limit,
            gas.safe_gas_limit,
            format_eth(max_cost)
        );

        let tx_hash = self.sender.send(call, &options).await?;
        info!("{} {} sent in tx {}, waiting for inclusion", prefix, call, tx_hash);

        let receipt = self.sender.wait_for_inclusion(tx_hash).await?;
        if !receipt.success {
            return Err(OracleError::Reverted {
                call: call.to_string(),
                tx_hash,
            });
        }

        info!(
            "{} {} included in block {} (gas used {})",
            prefix, call, receipt.block_number, receipt.gas_used
        );
        Ok(SubmissionOutcome::Included(receipt))
    }
}
