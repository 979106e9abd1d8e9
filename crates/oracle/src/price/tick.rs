//! Tick-cumulative TWAP from a concentrated-liquidity pool.
//!
//! ```text
//! tick  = floor((cum[now] - cum[now - window]) / window)
//! price = 1e18 / 1.0001^tick
//! ```
//!
//! `1.0001^tick` is evaluated as `ratio²` with `ratio = sqrt(1.0001)^tick`
//! in Q128.128, built from the pool's own fixed-point bit decomposition,
//! so the result is exact integer arithmetic and independent of floats.

use std::sync::Arc;

use alloy_primitives::{Address, U256, U512};
use async_trait::async_trait;
use tracing::debug;
use watchtower_chain::PoolReader;

use super::PriceSource;
use crate::error::OracleError;

/// Largest tick magnitude a pool can report.
pub const MAX_TICK: i64 = 887_272;

/// `sqrt(1.0001)^-(2^i)` in Q128.128 for bit `i` of |tick|, bit 0 first.
const SQRT_RATIO_FACTORS: [u128; 20] = [
    0xfffcb933bd6fad37aa2d162d1a594001,
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// `sqrt(1.0001)^tick` in Q128.128.
pub fn sqrt_ratio_at_tick(tick: i64) -> Result<U256, OracleError> {
    let abs = tick.unsigned_abs();
    if abs > MAX_TICK as u64 {
        return Err(OracleError::TickOutOfRange(tick));
    }

    let mut ratio = if abs & 1 != 0 {
        U256::from(SQRT_RATIO_FACTORS[0])
    } else {
        U256::from(1u8) << 128
    };
    for (bit, factor) in SQRT_RATIO_FACTORS.iter().enumerate().skip(1) {
        if abs & (1u64 << bit) != 0 {
            ratio = (ratio * U256::from(*factor)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }
    Ok(ratio)
}

/// `1e18 / 1.0001^tick`, truncated.
pub fn price_from_tick(tick: i64) -> Result<U256, OracleError> {
    let ratio = widen(sqrt_ratio_at_tick(tick)?);
    let denominator = ratio * ratio;
    if denominator.is_zero() {
        return Err(OracleError::TickOutOfRange(tick));
    }
    let numerator = U512::from(1_000_000_000_000_000_000u64) << 256;
    narrow(numerator / denominator).ok_or(OracleError::Overflow("tick price"))
}

/// Arithmetic mean tick over `window` seconds, rounded toward negative infinity.
pub fn mean_tick(cumulatives: &[i64], window: u32) -> Result<i64, OracleError> {
    if cumulatives.len() < 2 {
        return Err(OracleError::InsufficientObservations(cumulatives.len()));
    }
    let delta = cumulatives[1]
        .checked_sub(cumulatives[0])
        .ok_or(OracleError::Overflow("tick cumulative delta"))?;
    if window == 0 {
        return Err(OracleError::ZeroElapsedTime {
            previous: 0,
            current: 0,
        });
    }
    Ok(delta.div_euclid(i64::from(window)))
}

fn widen(x: U256) -> U512 {
    U512::from_be_slice(&x.to_be_bytes::<32>())
}

fn narrow(x: U512) -> Option<U256> {
    let bytes = x.to_be_bytes::<64>();
    if bytes[..32].iter().any(|b| *b != 0) {
        return None;
    }
    Some(U256::from_be_slice(&bytes[32..]))
}

/// `observe([window, 0])` based price source.
pub struct TickTwapSource {
    pools: Arc<dyn PoolReader>,
    pool: Address,
    window_secs: u32,
}

impl TickTwapSource {
    pub fn new(pools: Arc<dyn PoolReader>, pool: Address, window_secs: u32) -> Self {
        Self {
            pools,
            pool,
            window_secs,
        }
    }
}

#[async_trait]
impl PriceSource for TickTwapSource {
    fn name(&self) -> &'static str {
        "tick-twap"
    }

    async fn price_at(&self, block: u64) -> Result<U256, OracleError> {
        let cumulatives = self
            .pools
            .observe(self.pool, &[self.window_secs, 0], block)
            .await
            .map_err(OracleError::read("pool observe"))?;
        let tick = mean_tick(&cumulatives, self.window_secs)?;
        debug!("block {}: mean tick {} over {}s", block, tick, self.window_secs);
        price_from_tick(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_chain::MockChain;

    fn as_f64(x: U256) -> f64 {
        x.to_string().parse().unwrap()
    }

    fn assert_close(actual: U256, expected: f64, rel: f64) {
        let a = as_f64(actual);
        assert!(
            ((a - expected) / expected).abs() < rel,
            "{} vs {}",
            a,
            expected
        );
    }

    #[test]
    fn tick_zero_is_exactly_one() {
        assert_eq!(sqrt_ratio_at_tick(0).unwrap(), U256::from(1u8) << 128);
        assert_eq!(
            price_from_tick(0).unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
    }

    #[test]
    fn price_follows_power_of_1_0001() {
        for tick in [1i64, -1, 100, -100, 46_054, -46_054, 150_000] {
            let expected = 1e18 / 1.0001f64.powi(tick as i32);
            assert_close(price_from_tick(tick).unwrap(), expected, 1e-9);
        }
    }

    #[test]
    fn price_strictly_decreases_with_tick() {
        let mut previous = price_from_tick(-1_000).unwrap();
        for tick in (-999..=1_000).step_by(37) {
            let p = price_from_tick(tick).unwrap();
            assert!(p < previous, "tick {}", tick);
            previous = p;
        }
    }

    #[test]
    fn extreme_ticks() {
        assert!(price_from_tick(MAX_TICK).is_ok());
        assert!(price_from_tick(-MAX_TICK).is_ok());
        assert!(matches!(
            price_from_tick(MAX_TICK + 1),
            Err(OracleError::TickOutOfRange(_))
        ));
    }

    #[test]
    fn mean_tick_rounds_toward_negative_infinity() {
        assert_eq!(mean_tick(&[0, 100], 30).unwrap(), 3);
        assert_eq!(mean_tick(&[0, -100], 30).unwrap(), -4);
        assert_eq!(mean_tick(&[-90, -180], 30).unwrap(), -3);
        assert!(matches!(
            mean_tick(&[5], 30),
            Err(OracleError::InsufficientObservations(1))
        ));
    }

    #[tokio::test]
    async fn source_reads_observation_window() {
        let chain = Arc::new(MockChain::new());
        chain.set_tick_cumulatives(vec![1_000, 1_000 + 43_200 * 46_054]);
        let source = TickTwapSource::new(chain.clone(), Address::repeat_byte(9), 43_200);

        let price = source.price_at(50).await.unwrap();
        assert_eq!(price, price_from_tick(46_054).unwrap());
        assert_eq!(chain.calls("observe"), 1);
    }
}
