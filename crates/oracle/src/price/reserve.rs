//! Cumulative-reserve TWAP from a constant-product pool.
//!
//! Both endpoints of the window are chain state: the checkpoint block and
//! the last block a price was recorded for. Each pool cumulative is first
//! brought forward to its block's timestamp, then
//!
//! ```text
//! twap  = (cum_now - cum_prev) / (t_now - t_prev)    UQ112.112, wrapping
//! price = twap * 1e18 >> 112
//! ```
//!
//! Pool timestamps are `u32` and the cumulatives are designed to overflow,
//! so all of that arithmetic wraps.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;
use watchtower_chain::{ExecutionClient, PoolReader, PoolReserves, ProtocolReader};
use watchtower_common::units::WEI_PER_ETH;
use watchtower_common::ReportCategory;

use super::PriceSource;
use crate::error::OracleError;

const Q112: usize = 112;

/// Pool cumulative price brought forward to a block's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeObservation {
    pub block: u64,
    pub timestamp: u64,
    /// UQ112.112 cumulative, wrapping.
    pub cumulative: U256,
}

/// Extends `cumulative` from the pool's last update to `block_time`.
pub fn extrapolate_cumulative(
    cumulative: U256,
    reserves: &PoolReserves,
    reward_token_is_token0: bool,
    block_time: u64,
) -> Result<U256, OracleError> {
    let now = block_time as u32;
    if reserves.block_timestamp_last == now {
        return Ok(cumulative);
    }

    let (token, quote) = if reward_token_is_token0 {
        (reserves.reserve0, reserves.reserve1)
    } else {
        (reserves.reserve1, reserves.reserve0)
    };
    if token.is_zero() {
        return Err(OracleError::EmptyReserve);
    }

    let elapsed = now.wrapping_sub(reserves.block_timestamp_last);
    let spot = (quote << Q112) / token;
    Ok(cumulative.wrapping_add(spot.wrapping_mul(U256::from(elapsed))))
}

/// UQ112.112 average price between two observations.
pub fn twap(previous: &CumulativeObservation, current: &CumulativeObservation) -> Result<U256, OracleError> {
    let elapsed = current.timestamp.saturating_sub(previous.timestamp);
    if elapsed == 0 {
        return Err(OracleError::ZeroElapsedTime {
            previous: previous.block,
            current: current.block,
        });
    }
    Ok(current.cumulative.wrapping_sub(previous.cumulative) / U256::from(elapsed))
}

/// Decodes a UQ112.112 price into wei per 1e18 units.
pub fn uq112_to_wei(price: U256) -> U256 {
    let mask = (U256::from(1u8) << Q112) - U256::from(1u8);
    let whole = (price >> Q112) * WEI_PER_ETH;
    let fraction = ((price & mask) * WEI_PER_ETH) >> Q112;
    whole + fraction
}

pub struct ReserveTwapSource {
    pools: Arc<dyn PoolReader>,
    protocol: Arc<dyn ProtocolReader>,
    execution: Arc<dyn ExecutionClient>,
    pool: Address,
    reward_token_is_token0: bool,
    bootstrap_lookback_blocks: u64,
}

impl ReserveTwapSource {
    pub fn new(
        pools: Arc<dyn PoolReader>,
        protocol: Arc<dyn ProtocolReader>,
        execution: Arc<dyn ExecutionClient>,
        pool: Address,
        reward_token_is_token0: bool,
        bootstrap_lookback_blocks: u64,
    ) -> Self {
        Self {
            pools,
            protocol,
            execution,
            pool,
            reward_token_is_token0,
            bootstrap_lookback_blocks,
        }
    }

    /// Start of the window: the recorded prices block, or a fixed lookback
    /// when nothing was recorded yet.
    async fn window_start(&self, block: u64) -> Result<u64, OracleError> {
        let recorded = self
            .protocol
            .recorded_block(ReportCategory::Prices)
            .await
            .map_err(OracleError::read("recorded prices block"))?;
        if recorded == 0 {
            return Ok(block.saturating_sub(self.bootstrap_lookback_blocks));
        }
        Ok(recorded)
    }

    async fn observe(&self, block: u64) -> Result<CumulativeObservation, OracleError> {
        let (reserves, cumulative, header) = tokio::try_join!(
            async {
                self.pools
                    .reserves(self.pool, block)
                    .await
                    .map_err(OracleError::read("pool reserves"))
            },
            async {
                self.pools
                    .price_cumulative_last(self.pool, self.reward_token_is_token0, block)
                    .await
                    .map_err(OracleError::read("pool cumulative price"))
            },
            async {
                self.execution
                    .header_by_number(block)
                    .await
                    .map_err(OracleError::read("block header"))
            },
        )?;

        Ok(CumulativeObservation {
            block,
            timestamp: header.timestamp,
            cumulative: extrapolate_cumulative(
                cumulative,
                &reserves,
                self.reward_token_is_token0,
                header.timestamp,
            )?,
        })
    }
}

#[async_trait]
impl PriceSource for ReserveTwapSource {
    fn name(&self) -> &'static str {
        "reserve-twap"
    }

    async fn price_at(&self, block: u64) -> Result<U256, OracleError> {
        let start = self.window_start(block).await?;
        if start >= block {
            return Err(OracleError::ZeroElapsedTime {
                previous: start,
                current: block,
            });
        }

        let (previous, current) = tokio::try_join!(self.observe(start), self.observe(block))?;
        let average = twap(&previous, &current)?;
        debug!(
            "blocks {}..{}: uq112 twap {} over {}s",
            start,
            block,
            average,
            current.timestamp.saturating_sub(previous.timestamp)
        );
        Ok(uq112_to_wei(average))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_chain::mock::MOCK_BLOCK_TIME;
    use watchtower_chain::MockChain;

    fn q112(x: u64) -> U256 {
        U256::from(x) << Q112
    }

    fn obs(block: u64, timestamp: u64, cumulative: U256) -> CumulativeObservation {
        CumulativeObservation {
            block,
            timestamp,
            cumulative,
        }
    }

    #[test]
    fn twap_is_exact_cumulative_slope() {
        let cum0 = U256::from(123_456_789u64);
        let cum1 = cum0 + U256::from(987_654_321_000u64);
        let t = twap(&obs(1, 1_000, cum0), &obs(2, 1_600, cum1)).unwrap();
        assert_eq!(t, (cum1 - cum0) / U256::from(600u64));
    }

    #[test]
    fn twap_wraps_around_cumulative_overflow() {
        let cum0 = U256::MAX - q112(100) + U256::from(1u8);
        let cum1 = q112(500);
        let t = twap(&obs(1, 0, cum0), &obs(2, 200, cum1)).unwrap();
        assert_eq!(t, q112(3));
        assert_eq!(uq112_to_wei(t), WEI_PER_ETH * U256::from(3u8));
    }

    #[test]
    fn zero_elapsed_time_is_an_error() {
        let err = twap(&obs(5, 100, U256::ZERO), &obs(6, 100, q112(1))).unwrap_err();
        assert!(matches!(
            err,
            OracleError::ZeroElapsedTime {
                previous: 5,
                current: 6
            }
        ));
    }

    #[test]
    fn uq112_fraction_is_decoded() {
        // 1.5
        let half = U256::from(1u8) << (Q112 - 1);
        assert_eq!(
            uq112_to_wei(q112(1) + half),
            U256::from(1_500_000_000_000_000_000u64)
        );
    }

    #[test]
    fn extrapolation_uses_quote_over_token_with_wrapping_time() {
        let reserves = PoolReserves {
            reserve0: U256::from(1_000u64),
            reserve1: U256::from(4_000u64),
            block_timestamp_last: u32::MAX - 9,
        };
        // 20 seconds after the last update, across the u32 boundary.
        let block_time = (u64::from(u32::MAX) + 1) + 10;

        let token0 = extrapolate_cumulative(U256::ZERO, &reserves, true, block_time).unwrap();
        assert_eq!(token0, q112(4) * U256::from(20u8));

        let token1 = extrapolate_cumulative(U256::ZERO, &reserves, false, block_time).unwrap();
        assert_eq!(token1, (q112(1) / U256::from(4u8)) * U256::from(20u8));

        let up_to_date = PoolReserves {
            block_timestamp_last: block_time as u32,
            ..reserves
        };
        assert_eq!(
            extrapolate_cumulative(q112(7), &up_to_date, true, block_time).unwrap(),
            q112(7)
        );
    }

    #[tokio::test]
    async fn source_prices_window_since_recorded_block() {
        let chain = Arc::new(MockChain::new());
        chain.set_latest_block(200);
        chain.set_recorded_block(ReportCategory::Prices, 100);

        let t100 = 1_600_000_000 + 100 * MOCK_BLOCK_TIME;
        let t200 = 1_600_000_000 + 200 * MOCK_BLOCK_TIME;
        let reserves = |t: u64| PoolReserves {
            reserve0: U256::from(1u8),
            reserve1: U256::from(1u8),
            block_timestamp_last: t as u32,
        };
        let elapsed = t200 - t100;
        chain.set_pool_state(100, reserves(t100), q112(10), U256::ZERO);
        chain.set_pool_state(
            200,
            reserves(t200),
            q112(10) + q112(2) * U256::from(elapsed),
            U256::ZERO,
        );

        let source = ReserveTwapSource::new(
            chain.clone(),
            chain.clone(),
            chain.clone(),
            Address::repeat_byte(3),
            true,
            3_600,
        );
        let price = source.price_at(200).await.unwrap();
        assert_eq!(price, U256::from(2_000_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn source_needs_a_non_empty_window() {
        let chain = Arc::new(MockChain::new());
        chain.set_latest_block(200);
        chain.set_recorded_block(ReportCategory::Prices, 200);
        let source = ReserveTwapSource::new(
            chain.clone(),
            chain.clone(),
            chain.clone(),
            Address::repeat_byte(3),
            true,
            3_600,
        );
        assert!(matches!(
            source.price_at(200).await,
            Err(OracleError::ZeroElapsedTime { .. })
        ));
    }
}
