//! Wei / gwei / ether conversions and log formatting.

use alloy_primitives::U256;

/// 1 ether in wei.
pub const WEI_PER_ETH: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 1 gwei in wei.
pub const WEI_PER_GWEI: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

/// Whole ether to wei.
pub fn eth_to_wei(eth: u64) -> U256 {
    U256::from(eth) * WEI_PER_ETH
}

/// Whole gwei to wei (consensus-layer balances are reported in gwei).
pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei) * WEI_PER_GWEI
}

/// Fractional gwei (as written in configuration) to wei.
///
/// Returns `None` for negative, non-finite or absurdly large values.
pub fn gwei_f64_to_wei(gwei: f64) -> Option<U256> {
    if !gwei.is_finite() || gwei < 0.0 {
        return None;
    }
    let wei = (gwei * 1e9).round();
    if wei > u128::MAX as f64 {
        return None;
    }
    Some(U256::from(wei as u128))
}

/// Formats a wei amount as ether, rounded down to 6 decimals.
pub fn format_eth(wei: U256) -> String {
    let whole = wei / WEI_PER_ETH;
    let micro = (wei % WEI_PER_ETH) / U256::from(1_000_000_000_000u64);
    format!("{}.{:06}", whole, micro.to::<u64>())
}
