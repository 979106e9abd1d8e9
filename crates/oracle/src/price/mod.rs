//! # Price Oracle Reader
//!
//! Reward-token price at a checkpoint block, in wei of the base asset per
//! 1e18 reward-token units. The strategy is fixed at construction:
//!
//! | Source | Pool type | Module |
//! |--------|-----------|--------|
//! | [`TickTwapSource`] | concentrated liquidity (`observe`) | `tick` |
//! | [`ReserveTwapSource`] | constant product (`getReserves`) | `reserve` |

use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use watchtower_chain::ChainClients;
use watchtower_common::config::{PriceConfig, PriceSourceKind};

use crate::error::OracleError;

pub mod reserve;
pub mod tick;

pub use reserve::ReserveTwapSource;
pub use tick::TickTwapSource;

/// Strategy for reading a TWAP price from chain state.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Price at `block`; a pure function of chain state at fixed heights.
    async fn price_at(&self, block: u64) -> Result<U256, OracleError>;
}

/// Builds the configured price source.
pub fn from_config(
    config: &PriceConfig,
    clients: &ChainClients,
) -> Result<Arc<dyn PriceSource>, OracleError> {
    let pool = config.pool_address.ok_or(OracleError::MissingPoolAddress)?;
    let source: Arc<dyn PriceSource> = match config.source {
        PriceSourceKind::Tick => Arc::new(TickTwapSource::new(
            clients.pools.clone(),
            pool,
            config.twap_window_secs,
        )),
        PriceSourceKind::Reserve => Arc::new(ReserveTwapSource::new(
            clients.pools.clone(),
            clients.protocol.clone(),
            clients.execution.clone(),
            pool,
            config.reward_token_is_token0,
            config.bootstrap_lookback_blocks,
        )),
    };
    Ok(source)
}
