//! # Report Task
//!
//! One [`ReportTask`] per category drives the whole reporting pipeline.
//! Only the [`ReportSource`] differs between categories: balances are
//! aggregated, prices are read from a pool.
//!
//! ## Tick Pipeline
//!
//! ```text
//! tick
//!   ├─ clients synced?            no → NotSynced
//!   ├─ node trusted?              no → NotTrusted
//!   ├─ submissions enabled?       no → Disabled
//!   ├─ checkpoint due?            no → NotDue
//!   ├─ checkpoint epoch final?    no → AwaitingFinality
//!   ├─ flight free?               no → AlreadyRunning
//!   └─ spawn report               → Started(handle)
//!         ├─ compute values
//!         ├─ exact values on-chain? yes → AlreadySubmitted
//!         └─ submit               → Submitted | FeeCeilingExceeded
//! ```
//!
//! Everything before the spawn is cheap reads and runs inline. The report
//! itself runs on its own task holding the category's [`FlightGuard`], so
//! the flight is released on every exit path.
//!
//! [`FlightGuard`]: crate::single_flight::FlightGuard

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use watchtower_chain::{ChainClients, SubmissionCall, TxReceipt};
use watchtower_common::config::ReportableBlockSource;
use watchtower_common::units::format_eth;
use watchtower_common::{PriceObservation, ReportCategory};

use crate::balances::{AggregationTarget, BalanceAggregator};
use crate::error::OracleError;
use crate::executor::{FeeLimits, SubmissionExecutor, SubmissionOutcome};
use crate::finality::{check_finality, FinalityStatus};
use crate::ledger::{LedgerStatus, SubmissionLedger};
use crate::price::PriceSource;
use crate::scheduler::{CheckpointDecision, CheckpointScheduler};
use crate::single_flight::SingleFlight;

// ════════════════════════════════════════════════════════════════════════════════
// CHECKPOINT & OUTCOMES
// ════════════════════════════════════════════════════════════════════════════════

/// A due, finalized checkpoint ready to be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub category: ReportCategory,
    pub block: u64,
    /// Last block recorded on-chain for the category.
    pub recorded_block: u64,
    pub block_time: u64,
    pub slot: u64,
    pub epoch: u64,
}

/// What one scheduling tick decided.
#[derive(Debug)]
pub enum TickOutcome {
    NotSynced,
    NotTrusted,
    Disabled,
    NotDue { reportable: u64, recorded: u64 },
    AwaitingFinality { block: u64, epoch: u64, finalized_epoch: u64 },
    AlreadyRunning,
    /// A report was spawned for the checkpoint.
    Started(JoinHandle<Result<ReportOutcome, OracleError>>),
}

/// Final result of a spawned report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Submitted(TxReceipt),
    /// The same values are already recorded for this node.
    AlreadySubmitted,
    FeeCeilingExceeded,
}

// ════════════════════════════════════════════════════════════════════════════════
// REPORT SOURCES
// ════════════════════════════════════════════════════════════════════════════════

/// Category-specific value computation.
#[async_trait]
pub trait ReportSource: Send + Sync {
    fn category(&self) -> ReportCategory;

    /// Submission for `checkpoint`, computed entirely at `checkpoint.block`.
    async fn compute(&self, checkpoint: &Checkpoint) -> Result<SubmissionCall, OracleError>;
}

/// Network balances report.
pub struct BalancesReport {
    aggregator: BalanceAggregator,
}

impl BalancesReport {
    pub fn new(aggregator: BalanceAggregator) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl ReportSource for BalancesReport {
    fn category(&self) -> ReportCategory {
        ReportCategory::Balances
    }

    async fn compute(&self, checkpoint: &Checkpoint) -> Result<SubmissionCall, OracleError> {
        let prefix = self.category().log_prefix();
        let balances = self
            .aggregator
            .aggregate(&AggregationTarget {
                block: checkpoint.block,
                block_time: checkpoint.block_time,
                slot: checkpoint.slot,
                epoch: checkpoint.epoch,
            })
            .await?;

        info!("{} Balances at block {}:", prefix, balances.block);
        info!("{}   deposit pool: {} wei", prefix, balances.deposit_pool);
        info!("{}   minipools total: {} wei", prefix, balances.minipools_total);
        info!("{}   minipools staking: {} wei", prefix, balances.minipools_staking);
        info!("{}   fee distributors: {} wei", prefix, balances.distributor_share_total);
        info!("{}   smoothing pool: {} wei", prefix, balances.smoothing_pool_share);
        info!("{}   rETH contract: {} wei", prefix, balances.reth_contract_balance);
        info!(
            "{}   total: {} wei ({} ETH)",
            prefix,
            balances.total_eth(),
            format_eth(balances.total_eth())
        );
        info!("{}   rETH supply: {} wei", prefix, balances.reth_supply);
        match balances.exchange_ratio() {
            Some(ratio) => info!("{}   exchange ratio: {} ETH/rETH", prefix, format_eth(ratio)),
            None => warn!("{}   exchange ratio unavailable: rETH supply is zero", prefix),
        }

        Ok(SubmissionCall::balances(&balances))
    }
}

/// Reward-token price report.
pub struct PriceReport {
    source: Arc<dyn PriceSource>,
}

impl PriceReport {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ReportSource for PriceReport {
    fn category(&self) -> ReportCategory {
        ReportCategory::Prices
    }

    async fn compute(&self, checkpoint: &Checkpoint) -> Result<SubmissionCall, OracleError> {
        let price = self.source.price_at(checkpoint.block).await?;
        info!(
            "{} {} price at block {}: {} wei ({} ETH)",
            self.category().log_prefix(),
            self.source.name(),
            checkpoint.block,
            price,
            format_eth(price)
        );
        Ok(SubmissionCall::prices(&PriceObservation {
            block: checkpoint.block,
            price,
        }))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// REPORT TASK
// ════════════════════════════════════════════════════════════════════════════════

/// Scheduling, gating and submission for one category.
pub struct ReportTask {
    category: ReportCategory,
    clients: ChainClients,
    scheduler: CheckpointScheduler,
    ledger: SubmissionLedger,
    executor: SubmissionExecutor,
    source: Arc<dyn ReportSource>,
    flight: SingleFlight,
}

impl ReportTask {
    pub fn new(
        source: Arc<dyn ReportSource>,
        clients: ChainClients,
        block_source: ReportableBlockSource,
        limits: FeeLimits,
    ) -> Self {
        let category = source.category();
        Self {
            category,
            scheduler: CheckpointScheduler::new(
                category,
                block_source,
                clients.protocol.clone(),
                clients.execution.clone(),
            ),
            ledger: SubmissionLedger::new(clients.protocol.clone()),
            executor: SubmissionExecutor::new(clients.sender.clone(), limits),
            clients,
            source,
            flight: SingleFlight::new(),
        }
    }

    pub fn category(&self) -> ReportCategory {
        self.category
    }

    /// Whether a report is currently in flight.
    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    /// Runs the gating pipeline once and spawns a report when due.
    pub async fn tick(self: &Arc<Self>) -> Result<TickOutcome, OracleError> {
        let prefix = self.category.log_prefix();

        // ── Step 1: client sync ─────────────────────────────────────────
        let (el_synced, cl_synced) = tokio::try_join!(
            async {
                self.clients
                    .execution
                    .is_synced()
                    .await
                    .map_err(OracleError::read("execution sync status"))
            },
            async {
                self.clients
                    .consensus
                    .is_synced()
                    .await
                    .map_err(OracleError::read("consensus sync status"))
            },
        )?;
        if !(el_synced && cl_synced) {
            info!(
                "{} clients not synced (execution: {}, consensus: {}), waiting",
                prefix, el_synced, cl_synced
            );
            return Ok(TickOutcome::NotSynced);
        }

        // ── Step 2: trusted membership & enabled flag ───────────────────
        let node = self.clients.sender.node_address();
        let trusted = self
            .clients
            .protocol
            .is_trusted_member(node)
            .await
            .map_err(OracleError::read("trusted member check"))?;
        if !trusted {
            debug!("{} node {} is not a trusted member", prefix, node);
            return Ok(TickOutcome::NotTrusted);
        }

        let enabled = self
            .clients
            .protocol
            .submissions_enabled(self.category)
            .await
            .map_err(OracleError::read("submissions enabled flag"))?;
        if !enabled {
            debug!("{} submissions are disabled", prefix);
            return Ok(TickOutcome::Disabled);
        }

        // ── Step 3: checkpoint ──────────────────────────────────────────
        let (block, recorded_block) = match self.scheduler.decide().await? {
            CheckpointDecision::Due { block, recorded } => (block, recorded),
            CheckpointDecision::NotDue {
                reportable,
                recorded,
            } => {
                debug!(
                    "{} latest reportable block {} is not above recorded block {}",
                    prefix, reportable, recorded
                );
                return Ok(TickOutcome::NotDue {
                    reportable,
                    recorded,
                });
            }
        };

        // ── Step 4: finality ────────────────────────────────────────────
        let header = self
            .clients
            .execution
            .header_by_number(block)
            .await
            .map_err(OracleError::read("checkpoint header"))?;
        let (config, head) = tokio::try_join!(
            async {
                self.clients
                    .consensus
                    .config()
                    .await
                    .map_err(OracleError::read("beacon config"))
            },
            async {
                self.clients
                    .consensus
                    .head()
                    .await
                    .map_err(OracleError::read("beacon head"))
            },
        )?;
        let position = match check_finality(header.timestamp, &config, &head) {
            FinalityStatus::Finalized(position) => position,
            FinalityStatus::Pending {
                position,
                finalized_epoch,
            } => {
                info!(
                    "{} block {} is in epoch {} which is not finalized yet (finalized: {}), waiting",
                    prefix, block, position.epoch, finalized_epoch
                );
                return Ok(TickOutcome::AwaitingFinality {
                    block,
                    epoch: position.epoch,
                    finalized_epoch,
                });
            }
        };

        // ── Step 5: single flight ───────────────────────────────────────
        let Some(guard) = self.flight.try_acquire() else {
            info!("{} report already in progress", prefix);
            return Ok(TickOutcome::AlreadyRunning);
        };

        let checkpoint = Checkpoint {
            category: self.category,
            block,
            recorded_block,
            block_time: header.timestamp,
            slot: position.slot,
            epoch: position.epoch,
        };
        info!(
            "{} starting report for block {} (slot {}, epoch {})",
            prefix, block, checkpoint.slot, checkpoint.epoch
        );

        // ── Step 6: spawn ───────────────────────────────────────────────
        let task = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let result = task.run(&checkpoint).await;
            if let Err(e) = &result {
                error!("{} report for block {} failed: {}", prefix, checkpoint.block, e);
            }
            result
        });
        Ok(TickOutcome::Started(handle))
    }

    /// Computes, de-duplicates and submits one checkpoint.
    async fn run(&self, checkpoint: &Checkpoint) -> Result<ReportOutcome, OracleError> {
        let prefix = self.category.log_prefix();
        let call = self.source.compute(checkpoint).await?;

        let node = self.clients.sender.node_address();
        match self
            .ledger
            .status(node, self.category, checkpoint.block, &call.values())
            .await?
        {
            LedgerStatus::AlreadySubmitted => {
                info!(
                    "{} already submitted these values for block {}",
                    prefix, checkpoint.block
                );
                return Ok(ReportOutcome::AlreadySubmitted);
            }
            LedgerStatus::Stale => {
                info!(
                    "{} already submitted for block {} but values changed, resubmitting stale values",
                    prefix, checkpoint.block
                );
            }
            LedgerStatus::Fresh => {}
        }

        match self.executor.submit(&call).await? {
            SubmissionOutcome::Included(receipt) => Ok(ReportOutcome::Submitted(receipt)),
            SubmissionOutcome::FeeCeilingExceeded { .. } => Ok(ReportOutcome::FeeCeilingExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use watchtower_chain::MockChain;

    struct FixedPrice(U256);

    #[async_trait]
    impl PriceSource for FixedPrice {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn price_at(&self, _block: u64) -> Result<U256, OracleError> {
            Ok(self.0)
        }
    }

    fn price_task(chain: &Arc<MockChain>) -> Arc<ReportTask> {
        let source = Arc::new(PriceReport::new(Arc::new(FixedPrice(U256::from(42u64)))));
        Arc::new(ReportTask::new(
            source,
            chain.clients(),
            ReportableBlockSource::OnChain,
            FeeLimits {
                max_fee: U256::from(100_000_000_000u64),
                priority_fee: U256::from(1_000_000_000u64),
            },
        ))
    }

    fn due_chain() -> Arc<MockChain> {
        let chain = Arc::new(MockChain::new());
        chain.set_latest_block(120);
        chain.set_reportable_block(ReportCategory::Prices, 100);
        chain.set_recorded_block(ReportCategory::Prices, 50);
        chain
    }

    #[tokio::test]
    async fn gates_short_circuit_in_order() {
        let chain = due_chain();
        let task = price_task(&chain);

        chain.set_synced(true, false);
        assert!(matches!(task.tick().await.unwrap(), TickOutcome::NotSynced));
        chain.set_synced(true, true);

        chain.set_enabled(ReportCategory::Prices, false);
        assert!(matches!(task.tick().await.unwrap(), TickOutcome::Disabled));
        chain.set_enabled(ReportCategory::Prices, true);

        chain.set_trusted(watchtower_chain::mock::MOCK_NODE, false);
        assert!(matches!(task.tick().await.unwrap(), TickOutcome::NotTrusted));
        assert_eq!(chain.calls("recorded_block"), 0);
    }

    #[tokio::test]
    async fn started_report_submits_price() {
        let chain = due_chain();
        let task = price_task(&chain);

        let TickOutcome::Started(handle) = task.tick().await.unwrap() else {
            panic!("expected a started report");
        };
        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, ReportOutcome::Submitted(_)));
        assert!(!task.is_running());

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].call,
            SubmissionCall::SubmitPrices {
                block: 100,
                price: U256::from(42u64)
            }
        );
    }

    #[tokio::test]
    async fn compute_failure_releases_flight() {
        let chain = due_chain();
        let source = Arc::new(BalancesReport::new(BalanceAggregator::new(
            chain.clone(),
            chain.clone(),
            chain.clone(),
            Arc::new(crate::balances::NoSmoothingPool),
            crate::bonding::BondingCurve::new(U256::from(32u64), U256::from(16u64)),
            8,
        )));
        chain.set_reportable_block(ReportCategory::Balances, 100);
        chain.fail_on("deposit_pool_balance");
        let task = Arc::new(ReportTask::new(
            source,
            chain.clients(),
            ReportableBlockSource::OnChain,
            FeeLimits {
                max_fee: U256::from(100u64),
                priority_fee: U256::from(1u64),
            },
        ));

        let TickOutcome::Started(handle) = task.tick().await.unwrap() else {
            panic!("expected a started report");
        };
        assert!(handle.await.unwrap().is_err());
        assert!(!task.is_running());
        assert!(chain.sent().is_empty());
    }
}
