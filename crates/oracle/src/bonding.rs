//! # Bonding Curve
//!
//! User (depositor) share of a validator's live balance.
//!
//! Capital split by deposit type, with launch balance `L`:
//!
//! | Deposit type | User capital `U` | Node capital `N` |
//! |--------------|------------------|------------------|
//! | `Full`, `Half` | `L/2` | `L/2` |
//! | `Empty` | `L` | `0` |
//! | `Variable` | minipool user deposit | minipool node deposit |
//!
//! Given balance `B` and node fee `f` (1e18 = 100%):
//!
//! ```text
//! B >= U + N      share = U + r·U/(U+N) · (1 − f)     where r = B − U − N
//! U <= B < U + N  share = U                           node capital absorbs losses
//! B < U           share = B
//! ```
//!
//! A `Full` minipool whose user deposit has not been assigned yet still
//! owes the node its refund; the refund is deducted from the share,
//! saturating at zero.

use alloy_primitives::U256;
use watchtower_chain::MinipoolInfo;
use watchtower_common::units::WEI_PER_ETH;
use watchtower_common::MinipoolDepositType;

use crate::error::OracleError;

/// Protocol constants of the bonding curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondingCurve {
    /// Validator launch balance, wei.
    pub launch_balance: U256,
    /// Refund deducted from unassigned `Full` minipools, wei.
    pub full_refund: U256,
}

impl BondingCurve {
    pub fn new(launch_balance: U256, full_refund: U256) -> Self {
        Self {
            launch_balance,
            full_refund,
        }
    }

    /// `(user, node)` capital of a minipool.
    pub fn capital_split(&self, info: &MinipoolInfo) -> (U256, U256) {
        let half = self.launch_balance / U256::from(2u64);
        match info.deposit_type {
            MinipoolDepositType::Full | MinipoolDepositType::Half => (half, half),
            MinipoolDepositType::Empty => (self.launch_balance, U256::ZERO),
            MinipoolDepositType::Variable | MinipoolDepositType::None => {
                (info.user_deposit_balance, info.node_deposit_balance)
            }
        }
    }

    /// User share of `balance` for a staking minipool, refund applied.
    pub fn minipool_user_share(
        &self,
        info: &MinipoolInfo,
        balance: U256,
    ) -> Result<U256, OracleError> {
        let (user, node) = self.capital_split(info);
        let share = user_share(balance, user, node, info.node_fee)?;

        if info.deposit_type == MinipoolDepositType::Full && info.user_deposit_balance.is_zero() {
            return Ok(share.saturating_sub(self.full_refund));
        }
        Ok(share)
    }
}

/// User share of `balance` given the capital split and node fee.
pub fn user_share(
    balance: U256,
    user_capital: U256,
    node_capital: U256,
    node_fee: U256,
) -> Result<U256, OracleError> {
    let capital = user_capital
        .checked_add(node_capital)
        .ok_or(OracleError::Overflow("bonding capital"))?;

    if balance < user_capital {
        return Ok(balance);
    }
    if balance < capital {
        return Ok(user_capital);
    }
    if capital.is_zero() {
        return Ok(U256::ZERO);
    }

    let rewards = balance - capital;
    let user_rewards = rewards
        .checked_mul(user_capital)
        .ok_or(OracleError::Overflow("bonding rewards"))?
        / capital;
    let commission = user_rewards
        .checked_mul(node_fee.min(WEI_PER_ETH))
        .ok_or(OracleError::Overflow("bonding commission"))?
        / WEI_PER_ETH;

    Ok(user_capital + user_rewards - commission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use watchtower_common::units::eth_to_wei;
    use watchtower_common::{MinipoolStatus, ValidatorPubkey};

    fn curve() -> BondingCurve {
        BondingCurve::new(eth_to_wei(32_000_000), eth_to_wei(16_000_000))
    }

    fn minipool(deposit_type: MinipoolDepositType, user_deposit: U256, fee: U256) -> MinipoolInfo {
        MinipoolInfo {
            address: Address::repeat_byte(1),
            pubkey: ValidatorPubkey([1; 48]),
            status: MinipoolStatus::Staking,
            deposit_type,
            user_deposit_balance: user_deposit,
            node_deposit_balance: U256::ZERO,
            node_fee: fee,
            node_address: Address::repeat_byte(2),
        }
    }

    fn percent(p: u64) -> U256 {
        U256::from(p) * WEI_PER_ETH / U256::from(100u64)
    }

    #[test]
    fn full_minipool_awaiting_user_deposit() {
        let mp = minipool(MinipoolDepositType::Full, U256::ZERO, percent(15));
        let share = curve()
            .minipool_user_share(&mp, eth_to_wei(48_000_000))
            .unwrap();
        // 16M + 8M - 1.2M - 16M
        assert_eq!(share, eth_to_wei(6_800_000));
    }

    #[test]
    fn full_minipool_refund_saturates() {
        let mp = minipool(MinipoolDepositType::Full, U256::ZERO, percent(15));
        let share = curve()
            .minipool_user_share(&mp, eth_to_wei(10_000_000))
            .unwrap();
        assert_eq!(share, U256::ZERO);
    }

    #[test]
    fn half_minipool_keeps_full_share_once_assigned() {
        let mp = minipool(MinipoolDepositType::Half, eth_to_wei(16_000_000), percent(10));
        let share = curve()
            .minipool_user_share(&mp, eth_to_wei(36_000_000))
            .unwrap();
        // rewards 4M, user half 2M, commission 0.2M
        assert_eq!(share, eth_to_wei(17_800_000));
    }

    #[test]
    fn losses_hit_node_capital_first() {
        let u = eth_to_wei(16);
        let n = eth_to_wei(16);
        assert_eq!(user_share(eth_to_wei(20), u, n, percent(15)).unwrap(), u);
        assert_eq!(user_share(eth_to_wei(32), u, n, percent(15)).unwrap(), u);
        assert_eq!(
            user_share(eth_to_wei(12), u, n, percent(15)).unwrap(),
            eth_to_wei(12)
        );
    }

    #[test]
    fn empty_deposit_gives_users_everything_minus_fee() {
        let mp = minipool(MinipoolDepositType::Empty, eth_to_wei(32_000_000), percent(20));
        let share = curve()
            .minipool_user_share(&mp, eth_to_wei(33_000_000))
            .unwrap();
        assert_eq!(share, eth_to_wei(32_800_000));
    }

    #[test]
    fn variable_split_read_from_minipool() {
        let mut mp = minipool(MinipoolDepositType::Variable, eth_to_wei(24), percent(0));
        mp.node_deposit_balance = eth_to_wei(8);
        assert_eq!(curve().capital_split(&mp), (eth_to_wei(24), eth_to_wei(8)));
        assert_eq!(
            curve().minipool_user_share(&mp, eth_to_wei(36)).unwrap(),
            eth_to_wei(27)
        );
    }
}
