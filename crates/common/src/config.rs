//! Watchtower configuration loaded from TOML with serde.
//!
//! Every field has a default so an empty file is a valid configuration;
//! [`WatchtowerConfig::validate`] rejects values the engine cannot run with.

use std::fs;
use std::path::Path;

use alloy_primitives::{Address, U256};
use serde::Deserialize;

use crate::types::ReportCategory;
use crate::units::{eth_to_wei, gwei_f64_to_wei};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the checkpoint scheduler gets the latest reportable block.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportableBlockSource {
    /// Read the protocol's own "latest reportable block" getter.
    OnChain,
    /// Round the current head down to a multiple of the on-chain frequency.
    Frequency,
}

/// Selects the price computation strategy.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    /// Concentrated-liquidity pool, cumulative ticks.
    Tick,
    /// Constant-product pool, cumulative reserve ratio.
    Reserve,
}

/// Per-category scheduling.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Poll interval in seconds.
    pub interval_secs: u64,
    pub reportable_block_source: ReportableBlockSource,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            reportable_block_source: ReportableBlockSource::OnChain,
        }
    }
}

/// Transaction fee ceiling for watchtower submissions.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeeConfig {
    /// Max fee per gas, gwei.
    pub max_fee_gwei: f64,
    /// Priority fee per gas, gwei.
    pub max_priority_fee_gwei: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            max_fee_gwei: 200.0,
            max_priority_fee_gwei: 2.0,
        }
    }
}

impl FeeConfig {
    pub fn max_fee_wei(&self) -> Result<U256, ConfigError> {
        gwei_f64_to_wei(self.max_fee_gwei)
            .ok_or_else(|| ConfigError::Invalid(format!("max_fee_gwei {}", self.max_fee_gwei)))
    }

    pub fn max_priority_fee_wei(&self) -> Result<U256, ConfigError> {
        gwei_f64_to_wei(self.max_priority_fee_gwei).ok_or_else(|| {
            ConfigError::Invalid(format!("max_priority_fee_gwei {}", self.max_priority_fee_gwei))
        })
    }
}

/// Balance aggregation parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AggregationConfig {
    /// Maximum concurrent per-minipool / per-node reads.
    pub batch_size: usize,
    /// Validator launch balance, whole ether units.
    pub launch_balance_eth: u64,
    /// Deducted from the user share of a `Full` minipool still waiting
    /// for its user deposit, whole ether units.
    pub full_refund_eth: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            launch_balance_eth: 32_000_000,
            full_refund_eth: 16_000_000,
        }
    }
}

impl AggregationConfig {
    pub fn launch_balance_wei(&self) -> U256 {
        eth_to_wei(self.launch_balance_eth)
    }

    pub fn full_refund_wei(&self) -> U256 {
        eth_to_wei(self.full_refund_eth)
    }
}

/// TWAP pool settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceConfig {
    pub source: PriceSourceKind,
    /// Pool contract; required to report prices.
    pub pool_address: Option<Address>,
    /// Lookback window for the tick source, seconds.
    pub twap_window_secs: u32,
    /// Whether the reward token is `token0` of the reserve pool.
    pub reward_token_is_token0: bool,
    /// Reserve source lookback, in blocks, when no price was ever recorded.
    pub bootstrap_lookback_blocks: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            source: PriceSourceKind::Tick,
            pool_address: None,
            twap_window_secs: 60 * 60 * 12,
            reward_token_is_token0: true,
            bootstrap_lookback_blocks: 3600,
        }
    }
}

/// Beacon node HTTP endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BeaconEndpointConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for BeaconEndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5052".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Top-level watchtower configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WatchtowerConfig {
    pub balances: ScheduleConfig,
    pub prices: ScheduleConfig,
    pub fees: FeeConfig,
    pub aggregation: AggregationConfig,
    pub price: PriceConfig,
    pub beacon: BeaconEndpointConfig,
}

impl WatchtowerConfig {
    /// Load and validate config from a TOML file path.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&s)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: WatchtowerConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn schedule(&self, category: ReportCategory) -> &ScheduleConfig {
        match category {
            ReportCategory::Balances => &self.balances,
            ReportCategory::Prices => &self.prices,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in ReportCategory::ALL {
            if self.schedule(category).interval_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} interval_secs must be non-zero",
                    category
                )));
            }
        }
        if self.aggregation.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be non-zero".into()));
        }
        if self.aggregation.full_refund_eth > self.aggregation.launch_balance_eth {
            return Err(ConfigError::Invalid(
                "full_refund_eth exceeds launch_balance_eth".into(),
            ));
        }
        if self.price.twap_window_secs == 0 {
            return Err(ConfigError::Invalid("twap_window_secs must be non-zero".into()));
        }
        let max_fee = self.fees.max_fee_wei()?;
        let priority_fee = self.fees.max_priority_fee_wei()?;
        if priority_fee > max_fee {
            return Err(ConfigError::Invalid(
                "max_priority_fee_gwei exceeds max_fee_gwei".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let def = WatchtowerConfig::default();
        assert_eq!(def.balances.interval_secs, 60);
        assert_eq!(def.aggregation.batch_size, 8);
        assert_eq!(def.price.twap_window_secs, 43_200);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg = WatchtowerConfig::from_toml_str("").expect("parse");
        assert_eq!(cfg.prices.reportable_block_source, ReportableBlockSource::OnChain);
        assert_eq!(cfg.price.source, PriceSourceKind::Tick);
    }

    #[test]
    fn test_load_from_file_roundtrip() {
        use std::io::Write;
        let tmp = tempfile::NamedTempFile::new().expect("temp file");
        let toml = r#"
            [balances]
            interval_secs = 30
            reportable_block_source = "frequency"

            [fees]
            max_fee_gwei = 50.5
            max_priority_fee_gwei = 1.5

            [aggregation]
            batch_size = 4

            [price]
            source = "reserve"
            pool_address = "0x1111111111111111111111111111111111111111"
            reward_token_is_token0 = false
        "#;
        let mut f = tmp.reopen().expect("reopen");
        write!(f, "{}", toml).expect("write");
        let cfg = WatchtowerConfig::load_from_file(tmp.path()).expect("load");

        assert_eq!(cfg.balances.interval_secs, 30);
        assert_eq!(cfg.balances.reportable_block_source, ReportableBlockSource::Frequency);
        assert_eq!(cfg.prices.interval_secs, 60);
        assert_eq!(cfg.aggregation.batch_size, 4);
        assert_eq!(cfg.price.source, PriceSourceKind::Reserve);
        assert_eq!(cfg.price.pool_address, Some(Address::repeat_byte(0x11)));
        assert!(!cfg.price.reward_token_is_token0);
        assert_eq!(cfg.fees.max_fee_wei().unwrap(), U256::from(50_500_000_000u64));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = WatchtowerConfig::from_toml_str("[prices]\ninterval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_priority_fee_above_max_fee() {
        let err = WatchtowerConfig::from_toml_str(
            "[fees]\nmax_fee_gwei = 1.0\nmax_priority_fee_gwei = 2.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_priority_fee_gwei"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WatchtowerConfig::load_from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
