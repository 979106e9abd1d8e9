//! # Domain Types
//!
//! Values that flow between the chain-facing collaborators and the
//! reporting engine. Monetary amounts are `U256` wei throughout; block
//! numbers, slots and epochs are `u64`.
//!
//! ## Invariants
//!
//! - [`NetworkBalances::minipools_staking`] never exceeds
//!   [`NetworkBalances::minipools_total`] when built through
//!   [`NetworkBalances::from_parts`].
//! - [`NetworkBalances::total_eth`] is an exact integer sum of its five
//!   components.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::units::WEI_PER_ETH;

// ════════════════════════════════════════════════════════════════════════════════
// REPORT CATEGORY
// ════════════════════════════════════════════════════════════════════════════════

/// Oracle report category. Each category has its own checkpoint, its own
/// submission flags on-chain and its own scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    /// Network ETH balances (`submitBalances`).
    Balances,
    /// Reward-token price (`submitPrices`).
    Prices,
}

impl ReportCategory {
    /// All categories, in a stable order.
    pub const ALL: [ReportCategory; 2] = [ReportCategory::Balances, ReportCategory::Prices];

    /// Prefix used on every log line emitted by this category's pipeline.
    pub fn log_prefix(&self) -> &'static str {
        match self {
            Self::Balances => "[Balances Report]",
            Self::Prices => "[Price Report]",
        }
    }

    /// Storage namespace under which the protocol records per-node
    /// submission flags for this category.
    pub fn submission_key(&self) -> &'static str {
        match self {
            Self::Balances => "network.balances.submitted.node",
            Self::Prices => "network.prices.submitted.node.key",
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balances => f.write_str("balances"),
            Self::Prices => f.write_str("prices"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// EXECUTION LAYER
// ════════════════════════════════════════════════════════════════════════════════

/// The subset of an execution-layer block header the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block height.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// CONSENSUS LAYER
// ════════════════════════════════════════════════════════════════════════════════

/// Consensus-layer timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconChainConfig {
    /// Unix timestamp of the genesis slot.
    pub genesis_time: u64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
}

/// Current consensus head summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconHead {
    /// Epoch of the head slot.
    pub epoch: u64,
    /// Latest finalized epoch.
    pub finalized_epoch: u64,
}

/// 48-byte BLS public key of a validator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidatorPubkey(pub [u8; 48]);

/// Error parsing a [`ValidatorPubkey`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid validator pubkey: {0}")]
pub struct PubkeyParseError(pub String);

impl ValidatorPubkey {
    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for ValidatorPubkey {
    type Err = PubkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| PubkeyParseError(e.to_string()))?;
        let arr: [u8; 48] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| PubkeyParseError(format!("expected 48 bytes, found {}", b.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ValidatorPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ValidatorPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorPubkey({})", self.to_hex())
    }
}

/// Validator status at a specific epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorStatus {
    /// Whether the consensus layer knows this validator at all.
    pub exists: bool,
    pub activation_epoch: u64,
    /// `u64::MAX` (far future) while the validator has not exited.
    pub exit_epoch: u64,
    /// Live balance in gwei.
    pub balance_gwei: u64,
}

impl ValidatorStatus {
    /// Status reported for a pubkey the consensus layer does not know.
    pub const fn missing() -> Self {
        Self {
            exists: false,
            activation_epoch: u64::MAX,
            exit_epoch: u64::MAX,
            balance_gwei: 0,
        }
    }

    /// Whether the validator was active at `epoch`.
    pub fn is_active_at(&self, epoch: u64) -> bool {
        self.exists && self.activation_epoch < epoch
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// MINIPOOLS
// ════════════════════════════════════════════════════════════════════════════════

/// On-chain minipool lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinipoolStatus {
    Initialized,
    Prelaunch,
    Staking,
    Withdrawable,
    Dissolved,
}

impl MinipoolStatus {
    /// Statuses for which the user deposit is still held as-is.
    pub fn is_pre_stake(&self) -> bool {
        matches!(self, Self::Initialized | Self::Prelaunch)
    }
}

/// How the minipool's launch balance was funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinipoolDepositType {
    None,
    /// Node pre-funded the full launch balance and awaits a refund of half.
    Full,
    /// Node funded half.
    Half,
    /// Node funded nothing (unbonded).
    Empty,
    /// Capital split recorded per minipool.
    Variable,
}

/// Per-minipool contribution to a balances report. Recomputed for every
/// checkpoint, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinipoolBalanceDetail {
    pub status: MinipoolStatus,
    /// User (depositor) share of the minipool, wei.
    pub user_balance: U256,
    pub node_address: Address,
    /// Node commission, 1e18 = 100%.
    pub node_fee: U256,
    pub is_staking: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// NETWORK BALANCES
// ════════════════════════════════════════════════════════════════════════════════

/// Snapshot of the protocol's backing ETH at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBalances {
    pub block: u64,
    pub deposit_pool: U256,
    pub minipools_total: U256,
    pub minipools_staking: U256,
    pub distributor_share_total: U256,
    pub smoothing_pool_share: U256,
    pub reth_contract_balance: U256,
    pub reth_supply: U256,
}

impl NetworkBalances {
    /// Folds per-minipool details and per-distributor shares into a
    /// snapshot. Staking balances are a subset of the total by construction.
    pub fn from_parts(
        block: u64,
        deposit_pool: U256,
        minipools: &[MinipoolBalanceDetail],
        distributor_shares: &[U256],
        smoothing_pool_share: U256,
        reth_contract_balance: U256,
        reth_supply: U256,
    ) -> Self {
        let mut minipools_total = U256::ZERO;
        let mut minipools_staking = U256::ZERO;
        for mp in minipools {
            minipools_total = minipools_total.saturating_add(mp.user_balance);
            if mp.is_staking {
                minipools_staking = minipools_staking.saturating_add(mp.user_balance);
            }
        }

        let distributor_share_total = distributor_shares
            .iter()
            .fold(U256::ZERO, |acc, share| acc.saturating_add(*share));

        Self {
            block,
            deposit_pool,
            minipools_total,
            minipools_staking,
            distributor_share_total,
            smoothing_pool_share,
            reth_contract_balance,
            reth_supply,
        }
    }

    /// Total backing ETH in wei.
    pub fn total_eth(&self) -> U256 {
        self.deposit_pool
            .saturating_add(self.minipools_total)
            .saturating_add(self.reth_contract_balance)
            .saturating_add(self.distributor_share_total)
            .saturating_add(self.smoothing_pool_share)
    }

    /// ETH per rETH scaled by 1e18. `None` when the supply is zero.
    pub fn exchange_ratio(&self) -> Option<U256> {
        if self.reth_supply.is_zero() {
            return None;
        }
        self.total_eth()
            .checked_mul(WEI_PER_ETH)
            .map(|scaled| scaled / self.reth_supply)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// PRICE
// ════════════════════════════════════════════════════════════════════════════════

/// Reward-token price at a checkpoint block: wei of the base asset per
/// 1e18 units of the reward token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceObservation {
    pub block: u64,
    pub price: U256,
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
