//! # Network Balance Aggregator
//!
//! Computes [`NetworkBalances`] at one checkpoint block. Four independent
//! sub-computations run concurrently and are joined fail-fast:
//!
//! 1. deposit pool balance
//! 2. minipool details, then fee distributor shares per node (the node's
//!    average commission comes from its minipools)
//! 3. smoothing pool depositor share, via [`SmoothingPoolEstimator`]
//! 4. rETH contract balance and total supply
//!
//! Minipool and node reads fan out in batches of `batch_size`; batches run
//! one after another. Any failure aborts the whole aggregation, so a
//! snapshot is either complete at `block` or not produced at all.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::debug;
use watchtower_chain::{ConsensusClient, ExecutionClient, MinipoolInfo, ProtocolReader};
use watchtower_common::units::{gwei_to_wei, WEI_PER_ETH};
use watchtower_common::{MinipoolBalanceDetail, NetworkBalances, ValidatorStatus};

use crate::bonding::BondingCurve;
use crate::error::OracleError;

// ════════════════════════════════════════════════════════════════════════════════
// SMOOTHING POOL ESTIMATOR
// ════════════════════════════════════════════════════════════════════════════════

/// Inputs for approximating the smoothing pool's depositor share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingEstimateRequest {
    pub block: u64,
    pub block_time: u64,
    pub slot: u64,
    pub epoch: u64,
    /// Index of the rewards interval currently accruing.
    pub interval_index: u64,
    pub interval_start_time: u64,
    /// Whole intervals elapsed since the current one started.
    pub intervals_passed: u64,
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EstimatorError(pub String);

/// Approximates the depositor share of the smoothing pool balance.
///
/// This is the rewards tree generator's job; the aggregator only feeds it
/// the interval position of the checkpoint.
#[async_trait]
pub trait SmoothingPoolEstimator: Send + Sync {
    async fn estimate_user_share(
        &self,
        request: &SmoothingEstimateRequest,
    ) -> Result<U256, EstimatorError>;
}

/// Estimator for deployments without a smoothing pool: always zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSmoothingPool;

#[async_trait]
impl SmoothingPoolEstimator for NoSmoothingPool {
    async fn estimate_user_share(
        &self,
        _request: &SmoothingEstimateRequest,
    ) -> Result<U256, EstimatorError> {
        Ok(U256::ZERO)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// AGGREGATOR
// ════════════════════════════════════════════════════════════════════════════════

/// Block and consensus position a snapshot is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationTarget {
    pub block: u64,
    pub block_time: u64,
    pub slot: u64,
    pub epoch: u64,
}

pub struct BalanceAggregator {
    protocol: Arc<dyn ProtocolReader>,
    execution: Arc<dyn ExecutionClient>,
    consensus: Arc<dyn ConsensusClient>,
    estimator: Arc<dyn SmoothingPoolEstimator>,
    curve: BondingCurve,
    batch_size: usize,
}

impl BalanceAggregator {
    pub fn new(
        protocol: Arc<dyn ProtocolReader>,
        execution: Arc<dyn ExecutionClient>,
        consensus: Arc<dyn ConsensusClient>,
        estimator: Arc<dyn SmoothingPoolEstimator>,
        curve: BondingCurve,
        batch_size: usize,
    ) -> Self {
        Self {
            protocol,
            execution,
            consensus,
            estimator,
            curve,
            batch_size: batch_size.max(1),
        }
    }

    /// Full network snapshot at `target.block`.
    pub async fn aggregate(&self, target: &AggregationTarget) -> Result<NetworkBalances, OracleError> {
        let block = target.block;

        let (deposit_pool, (minipools, distributor_shares), smoothing, (reth_balance, reth_supply)) = tokio::try_join!(
            self.deposit_pool(block),
            self.minipools_and_distributors(target),
            self.smoothing_pool_share(target),
            self.reth(block),
        )?;

        debug!(
            "aggregated block {}: {} minipools, {} distributors",
            block,
            minipools.len(),
            distributor_shares.len()
        );

        Ok(NetworkBalances::from_parts(
            block,
            deposit_pool,
            &minipools,
            &distributor_shares,
            smoothing,
            reth_balance,
            reth_supply,
        ))
    }

    async fn deposit_pool(&self, block: u64) -> Result<U256, OracleError> {
        self.protocol
            .deposit_pool_balance(block)
            .await
            .map_err(OracleError::read("deposit pool balance"))
    }

    async fn reth(&self, block: u64) -> Result<(U256, U256), OracleError> {
        let balance = async {
            let address = self
                .protocol
                .reth_address(block)
                .await
                .map_err(OracleError::read("rETH address"))?;
            self.execution
                .balance_at(address, block)
                .await
                .map_err(OracleError::read("rETH contract balance"))
        };
        let supply = async {
            self.protocol
                .reth_total_supply(block)
                .await
                .map_err(OracleError::read("rETH total supply"))
        };
        tokio::try_join!(balance, supply)
    }

    async fn smoothing_pool_share(&self, target: &AggregationTarget) -> Result<U256, OracleError> {
        let interval = self
            .protocol
            .rewards_interval(target.block)
            .await
            .map_err(OracleError::read("rewards interval"))?;

        let intervals_passed = target
            .block_time
            .saturating_sub(interval.start_time)
            .checked_div(interval.interval_duration)
            .unwrap_or(0);

        let request = SmoothingEstimateRequest {
            block: target.block,
            block_time: target.block_time,
            slot: target.slot,
            epoch: target.epoch,
            interval_index: interval.index,
            interval_start_time: interval.start_time,
            intervals_passed,
        };

        self.estimator
            .estimate_user_share(&request)
            .await
            .map_err(|e| OracleError::Estimator(e.0))
    }

    async fn minipools_and_distributors(
        &self,
        target: &AggregationTarget,
    ) -> Result<(Vec<MinipoolBalanceDetail>, Vec<U256>), OracleError> {
        let infos = self.minipool_infos(target.block).await?;
        let details = self.minipool_details(&infos, target.epoch).await?;
        let shares = self.distributor_shares(&infos, target.block).await?;
        Ok((details, shares))
    }

    async fn minipool_infos(&self, block: u64) -> Result<Vec<MinipoolInfo>, OracleError> {
        let addresses = self
            .protocol
            .minipool_addresses(block)
            .await
            .map_err(OracleError::read("minipool addresses"))?;

        run_batched(&addresses, self.batch_size, move |address| async move {
            self.protocol
                .minipool_info(address, block)
                .await
                .map_err(OracleError::read("minipool details"))
        })
        .await
    }

    /// Per-minipool user balances at `epoch`.
    pub async fn minipool_details(
        &self,
        infos: &[MinipoolInfo],
        epoch: u64,
    ) -> Result<Vec<MinipoolBalanceDetail>, OracleError> {
        let head = self
            .consensus
            .head()
            .await
            .map_err(OracleError::read("beacon head"))?;
        if epoch > head.epoch {
            return Err(OracleError::EpochAhead {
                target: epoch,
                head: head.epoch,
            });
        }

        let pubkeys: Vec<_> = infos
            .iter()
            .filter(|info| !info.status.is_pre_stake())
            .map(|info| info.pubkey)
            .collect();
        let statuses = if pubkeys.is_empty() {
            HashMap::new()
        } else {
            self.consensus
                .validator_statuses(&pubkeys, epoch)
                .await
                .map_err(OracleError::read("validator statuses"))?
        };

        infos
            .iter()
            .map(|info| self.minipool_detail(info, statuses.get(&info.pubkey), epoch))
            .collect()
    }

    fn minipool_detail(
        &self,
        info: &MinipoolInfo,
        validator: Option<&ValidatorStatus>,
        epoch: u64,
    ) -> Result<MinipoolBalanceDetail, OracleError> {
        let unstaked = MinipoolBalanceDetail {
            status: info.status,
            user_balance: info.user_deposit_balance,
            node_address: info.node_address,
            node_fee: info.node_fee,
            is_staking: false,
        };

        if info.status.is_pre_stake() {
            return Ok(unstaked);
        }
        let validator = match validator {
            Some(v) if v.is_active_at(epoch) => v,
            _ => return Ok(unstaked),
        };

        let user_balance = self
            .curve
            .minipool_user_share(info, gwei_to_wei(validator.balance_gwei))
            .map_err(|e| OracleError::Minipool {
                address: info.address,
                reason: e.to_string(),
            })?;

        Ok(MinipoolBalanceDetail {
            user_balance,
            is_staking: validator.exit_epoch > epoch,
            ..unstaked
        })
    }

    async fn distributor_shares(
        &self,
        infos: &[MinipoolInfo],
        block: u64,
    ) -> Result<Vec<U256>, OracleError> {
        let nodes = self
            .protocol
            .node_addresses(block)
            .await
            .map_err(OracleError::read("node addresses"))?;
        let fees = average_fees(infos);
        let fees = &fees;

        run_batched(&nodes, self.batch_size, move |node| async move {
            let distributor = self
                .protocol
                .fee_distributor(node, block)
                .await
                .map_err(OracleError::read("fee distributor address"))?;
            let balance = self
                .execution
                .balance_at(distributor, block)
                .await
                .map_err(OracleError::read("fee distributor balance"))?;
            Ok(distributor_share(balance, fees.get(&node).copied()))
        })
        .await
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════════

/// Runs `f` over `items` in sequential batches of concurrent calls.
/// Results keep the order of `items`; the first error aborts.
pub async fn run_batched<T, R, F, Fut>(
    items: &[T],
    batch_size: usize,
    f: F,
) -> Result<Vec<R>, OracleError>
where
    T: Copy,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, OracleError>>,
{
    let mut out = Vec::with_capacity(items.len());
    for chunk in items.chunks(batch_size.max(1)) {
        let results = try_join_all(chunk.iter().copied().map(&f)).await?;
        out.extend(results);
    }
    Ok(out)
}

/// Arithmetic mean of each node's minipool commissions.
pub fn average_fees(infos: &[MinipoolInfo]) -> HashMap<Address, U256> {
    let mut totals: HashMap<Address, (U256, u64)> = HashMap::new();
    for info in infos {
        let entry = totals.entry(info.node_address).or_insert((U256::ZERO, 0));
        entry.0 = entry.0.saturating_add(info.node_fee);
        entry.1 += 1;
    }
    totals
        .into_iter()
        .map(|(node, (sum, count))| (node, sum / U256::from(count)))
        .collect()
}

/// Depositor half of a fee distributor balance, net of the node's average
/// commission. Nodes without minipools are charged 50%.
pub fn distributor_share(balance: U256, average_fee: Option<U256>) -> U256 {
    if balance.is_zero() {
        return U256::ZERO;
    }
    let fee = average_fee
        .unwrap_or(WEI_PER_ETH / U256::from(2u64))
        .min(WEI_PER_ETH);
    let user_portion = WEI_PER_ETH - fee;
    balance.saturating_mul(user_portion) / (WEI_PER_ETH * U256::from(2u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_chain::MockChain;
    use watchtower_common::units::eth_to_wei;
    use watchtower_common::{MinipoolDepositType, MinipoolStatus, ValidatorPubkey};

    fn percent(p: u64) -> U256 {
        U256::from(p) * WEI_PER_ETH / U256::from(100u64)
    }

    fn info(n: u8, node: Address, status: MinipoolStatus, fee: U256) -> MinipoolInfo {
        MinipoolInfo {
            address: Address::repeat_byte(n),
            pubkey: ValidatorPubkey([n; 48]),
            status,
            deposit_type: MinipoolDepositType::Half,
            user_deposit_balance: eth_to_wei(16),
            node_deposit_balance: eth_to_wei(16),
            node_fee: fee,
            node_address: node,
        }
    }

    fn aggregator(chain: &Arc<MockChain>) -> BalanceAggregator {
        BalanceAggregator::new(
            chain.clone(),
            chain.clone(),
            chain.clone(),
            Arc::new(NoSmoothingPool),
            BondingCurve::new(eth_to_wei(32), eth_to_wei(16)),
            8,
        )
    }

    #[test]
    fn distributor_share_rules() {
        assert_eq!(distributor_share(U256::ZERO, Some(percent(10))), U256::ZERO);
        // no minipools: 50% fee, half of the remainder
        assert_eq!(distributor_share(eth_to_wei(4), None), eth_to_wei(1));
        // 20% fee: 10 * 0.8 / 2
        assert_eq!(distributor_share(eth_to_wei(10), Some(percent(20))), eth_to_wei(4));
        // fee clamped at 100%
        assert_eq!(distributor_share(eth_to_wei(10), Some(percent(150))), U256::ZERO);
    }

    #[test]
    fn average_fee_per_node() {
        let a = Address::repeat_byte(0xA);
        let b = Address::repeat_byte(0xB);
        let infos = vec![
            info(1, a, MinipoolStatus::Staking, percent(10)),
            info(2, a, MinipoolStatus::Staking, percent(20)),
            info(3, b, MinipoolStatus::Staking, percent(5)),
        ];
        let fees = average_fees(&infos);
        assert_eq!(fees[&a], percent(15));
        assert_eq!(fees[&b], percent(5));
    }

    #[tokio::test]
    async fn run_batched_preserves_order_and_fails_fast() {
        let items: Vec<u64> = (0..20).collect();
        let doubled = run_batched(&items, 8, |x| async move { Ok::<_, OracleError>(x * 2) })
            .await
            .unwrap();
        assert_eq!(doubled, items.iter().map(|x| x * 2).collect::<Vec<_>>());

        let failed = run_batched(&items, 8, |x| async move {
            if x == 13 {
                Err(OracleError::Overflow("test"))
            } else {
                Ok(x)
            }
        })
        .await;
        assert!(failed.is_err());
    }

    #[tokio::test]
    async fn minipool_detail_classification() {
        let chain = Arc::new(MockChain::new());
        chain.set_beacon_head(100, 98);
        let node = Address::repeat_byte(0xC);

        let prelaunch = info(1, node, MinipoolStatus::Prelaunch, percent(10));
        let missing = info(2, node, MinipoolStatus::Staking, percent(10));
        let not_active = info(3, node, MinipoolStatus::Staking, percent(10));
        let active = info(4, node, MinipoolStatus::Staking, percent(10));
        let exited = info(5, node, MinipoolStatus::Withdrawable, percent(10));

        chain.set_validator(
            not_active.pubkey,
            ValidatorStatus {
                exists: true,
                activation_epoch: 50,
                exit_epoch: u64::MAX,
                balance_gwei: 32_000_000_000,
            },
        );
        chain.set_validator(
            active.pubkey,
            ValidatorStatus {
                exists: true,
                activation_epoch: 10,
                exit_epoch: u64::MAX,
                balance_gwei: 34_000_000_000,
            },
        );
        chain.set_validator(
            exited.pubkey,
            ValidatorStatus {
                exists: true,
                activation_epoch: 10,
                exit_epoch: 40,
                balance_gwei: 32_000_000_000,
            },
        );

        let details = aggregator(&chain)
            .minipool_details(
                &[prelaunch, missing, not_active, active, exited],
                50,
            )
            .await
            .unwrap();

        let raw = eth_to_wei(16);
        assert_eq!((details[0].user_balance, details[0].is_staking), (raw, false));
        assert_eq!((details[1].user_balance, details[1].is_staking), (raw, false));
        assert_eq!((details[2].user_balance, details[2].is_staking), (raw, false));
        // rewards 2, user half 1, fee 10%
        assert_eq!(details[3].user_balance, eth_to_wei(16) + percent(90));
        assert!(details[3].is_staking);
        assert_eq!(details[4].user_balance, raw);
        assert!(!details[4].is_staking);
    }

    #[tokio::test]
    async fn epoch_ahead_of_head_is_rejected() {
        let chain = Arc::new(MockChain::new());
        chain.set_beacon_head(10, 8);
        let err = aggregator(&chain).minipool_details(&[], 11).await.unwrap_err();
        assert!(matches!(err, OracleError::EpochAhead { target: 11, head: 10 }));
    }
}
