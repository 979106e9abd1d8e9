//! # Watchtower Common Crate
//!
//! Shared vocabulary for the watchtower oracle reporter.
//!
//! ## Modules
//! - `types`: report categories, block/consensus summaries, minipool and
//!   network balance snapshots, price observations
//! - `units`: wei / gwei / ether conversions
//! - `config`: TOML configuration
//!
//! Chain-facing interfaces live in `watchtower-chain`; the reporting engine
//! lives in `watchtower-oracle`.

pub mod config;
pub mod types;
pub mod units;

pub use alloy_primitives::{Address, B256, U256};
pub use config::{ConfigError, WatchtowerConfig};
pub use types::{
    BeaconChainConfig, BeaconHead, BlockHeader, MinipoolBalanceDetail, MinipoolDepositType,
    MinipoolStatus, NetworkBalances, PriceObservation, ReportCategory, ValidatorPubkey,
    ValidatorStatus,
};
