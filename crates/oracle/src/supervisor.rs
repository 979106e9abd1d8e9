//! # Supervisor
//!
//! Owns one periodic loop per report category. Loops run independently on
//! their own interval and stop together on [`SupervisorHandle::shutdown`].
//!
//! Shutdown is observed between ticks only. A report already spawned by a
//! loop is awaited before the loop exits, so no submission is cut off
//! half-way.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use watchtower_chain::ChainClients;
use watchtower_common::{ReportCategory, WatchtowerConfig};

use crate::balances::{BalanceAggregator, SmoothingPoolEstimator};
use crate::bonding::BondingCurve;
use crate::error::OracleError;
use crate::executor::FeeLimits;
use crate::price;
use crate::report::{BalancesReport, PriceReport, ReportOutcome, ReportTask, TickOutcome};

/// Report tasks with their poll intervals, not yet running.
#[derive(Default)]
pub struct Supervisor {
    tasks: Vec<(Arc<ReportTask>, Duration)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: Arc<ReportTask>, period: Duration) -> Self {
        self.tasks.push((task, period));
        self
    }

    /// Builds the balances and price tasks from configuration.
    ///
    /// The price task is left out when no pool address is configured.
    pub fn from_config(
        config: &WatchtowerConfig,
        clients: ChainClients,
        estimator: Arc<dyn SmoothingPoolEstimator>,
    ) -> Result<Self, OracleError> {
        config.validate()?;
        let limits = FeeLimits::from_config(&config.fees)?;

        let aggregator = BalanceAggregator::new(
            clients.protocol.clone(),
            clients.execution.clone(),
            clients.consensus.clone(),
            estimator,
            BondingCurve::new(
                config.aggregation.launch_balance_wei(),
                config.aggregation.full_refund_wei(),
            ),
            config.aggregation.batch_size,
        );
        let balances = Arc::new(ReportTask::new(
            Arc::new(BalancesReport::new(aggregator)),
            clients.clone(),
            config.balances.reportable_block_source,
            limits,
        ));
        let mut supervisor = Self::new().with_task(
            balances,
            Duration::from_secs(config.balances.interval_secs),
        );

        match price::from_config(&config.price, &clients) {
            Ok(source) => {
                let prices = Arc::new(ReportTask::new(
                    Arc::new(PriceReport::new(source)),
                    clients,
                    config.prices.reportable_block_source,
                    limits,
                ));
                supervisor =
                    supervisor.with_task(prices, Duration::from_secs(config.prices.interval_secs));
            }
            Err(OracleError::MissingPoolAddress) => {
                warn!(
                    "{} no price pool configured, price reports disabled",
                    ReportCategory::Prices.log_prefix()
                );
            }
            Err(e) => return Err(e),
        }

        Ok(supervisor)
    }

    pub fn categories(&self) -> Vec<ReportCategory> {
        self.tasks.iter().map(|(task, _)| task.category()).collect()
    }

    /// Starts every loop.
    pub fn spawn(self) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loops = self
            .tasks
            .into_iter()
            .map(|(task, period)| spawn_report_loop(task, period, shutdown_rx.clone()))
            .collect();
        SupervisorHandle {
            shutdown_tx,
            loops,
        }
    }
}

/// Running loops of a [`Supervisor`].
pub struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Signals every loop and waits until all have stopped.
    pub async fn shutdown(self) {
        // Receivers live inside the loops; a send error means they are gone.
        let _ = self.shutdown_tx.send(true);
        for result in join_all(self.loops).await {
            if let Err(e) = result {
                error!("report loop terminated abnormally: {}", e);
            }
        }
    }
}

/// Periodic tick loop for one category.
pub fn spawn_report_loop(
    task: Arc<ReportTask>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let prefix = task.category().log_prefix();
        info!("{} loop started (interval: {:?})", prefix, period);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Vec<JoinHandle<Result<ReportOutcome, OracleError>>> = Vec::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("{} loop shutting down", prefix);
                        break;
                    }
                    continue;
                }
            }

            in_flight.retain(|handle| !handle.is_finished());
            match task.tick().await {
                Ok(TickOutcome::Started(handle)) => in_flight.push(handle),
                Ok(_) => {}
                Err(e) => warn!("{} tick failed: {}", prefix, e),
            }
        }

        if !in_flight.is_empty() {
            info!("{} waiting for in-flight report", prefix);
        }
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("{} report task aborted: {}", prefix, e);
            }
        }
        info!("{} loop stopped", prefix);
    })
}
