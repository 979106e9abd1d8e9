//! # Checkpoint Scheduler
//!
//! Decides whether a category has a new checkpoint block to report.
//!
//! | Source | Reportable block |
//! |--------|------------------|
//! | `OnChain` | protocol's latest reportable block getter |
//! | `Frequency` | `floor(head / frequency) * frequency` |
//!
//! A checkpoint is due iff `reportable > recorded`, where `recorded` is the
//! last block the category reached consensus on. The scheduler therefore
//! never selects a block at or below the recorded one.

use std::sync::Arc;

use tracing::debug;
use watchtower_chain::{ExecutionClient, ProtocolReader};
use watchtower_common::config::ReportableBlockSource;
use watchtower_common::ReportCategory;

use crate::error::OracleError;

/// Outcome of a scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    /// `block` should be reported; it is strictly above `recorded`.
    Due { block: u64, recorded: u64 },
    /// Nothing new to report.
    NotDue { reportable: u64, recorded: u64 },
}

/// Per-category checkpoint scheduler.
pub struct CheckpointScheduler {
    category: ReportCategory,
    source: ReportableBlockSource,
    protocol: Arc<dyn ProtocolReader>,
    execution: Arc<dyn ExecutionClient>,
}

impl CheckpointScheduler {
    pub fn new(
        category: ReportCategory,
        source: ReportableBlockSource,
        protocol: Arc<dyn ProtocolReader>,
        execution: Arc<dyn ExecutionClient>,
    ) -> Self {
        Self {
            category,
            source,
            protocol,
            execution,
        }
    }

    /// Latest block the category may report for.
    pub async fn reportable_block(&self) -> Result<u64, OracleError> {
        match self.source {
            ReportableBlockSource::OnChain => Ok(self
                .protocol
                .latest_reportable_block(self.category)
                .await
                .map_err(OracleError::read("latest reportable block"))?),
            ReportableBlockSource::Frequency => {
                let head = self
                    .execution
                    .latest_block_number()
                    .await
                    .map_err(OracleError::read("latest block number"))?;
                let frequency = self
                    .protocol
                    .submission_frequency(self.category)
                    .await
                    .map_err(OracleError::read("submission frequency"))?;
                round_to_frequency(head, frequency)
                    .ok_or_else(|| OracleError::InvalidFrequency(self.category.to_string()))
            }
        }
    }

    /// Compares the reportable block with the recorded one.
    pub async fn decide(&self) -> Result<CheckpointDecision, OracleError> {
        let reportable = self.reportable_block().await?;
        let recorded = self
            .protocol
            .recorded_block(self.category)
            .await
            .map_err(OracleError::read("recorded block"))?;

        debug!(
            category = %self.category,
            reportable,
            recorded,
            "checkpoint decision"
        );

        if reportable > recorded {
            Ok(CheckpointDecision::Due {
                block: reportable,
                recorded,
            })
        } else {
            Ok(CheckpointDecision::NotDue {
                reportable,
                recorded,
            })
        }
    }
}

/// `head` rounded down to a multiple of `frequency`; `None` when
/// `frequency` is zero.
pub fn round_to_frequency(head: u64, frequency: u64) -> Option<u64> {
    if frequency == 0 {
        return None;
    }
    Some(head / frequency * frequency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_chain::MockChain;

    fn scheduler(chain: &Arc<MockChain>, source: ReportableBlockSource) -> CheckpointScheduler {
        CheckpointScheduler::new(ReportCategory::Balances, source, chain.clone(), chain.clone())
    }

    #[test]
    fn rounding_to_frequency() {
        assert_eq!(round_to_frequency(12_345, 100), Some(12_300));
        assert_eq!(round_to_frequency(12_300, 100), Some(12_300));
        assert_eq!(round_to_frequency(99, 100), Some(0));
        assert_eq!(round_to_frequency(5, 0), None);
    }

    #[tokio::test]
    async fn due_only_strictly_above_recorded() {
        let chain = Arc::new(MockChain::new());
        chain.set_recorded_block(ReportCategory::Balances, 1000);
        let s = scheduler(&chain, ReportableBlockSource::OnChain);

        chain.set_reportable_block(ReportCategory::Balances, 1000);
        assert_eq!(
            s.decide().await.unwrap(),
            CheckpointDecision::NotDue {
                reportable: 1000,
                recorded: 1000
            }
        );

        chain.set_reportable_block(ReportCategory::Balances, 900);
        assert!(matches!(s.decide().await.unwrap(), CheckpointDecision::NotDue { .. }));

        chain.set_reportable_block(ReportCategory::Balances, 1001);
        assert_eq!(
            s.decide().await.unwrap(),
            CheckpointDecision::Due {
                block: 1001,
                recorded: 1000
            }
        );
    }

    #[tokio::test]
    async fn frequency_source_rounds_head() {
        let chain = Arc::new(MockChain::new());
        chain.set_latest_block(5_432);
        chain.set_frequency(ReportCategory::Balances, 1_000);
        chain.set_recorded_block(ReportCategory::Balances, 4_000);

        let s = scheduler(&chain, ReportableBlockSource::Frequency);
        assert_eq!(
            s.decide().await.unwrap(),
            CheckpointDecision::Due {
                block: 5_000,
                recorded: 4_000
            }
        );
    }

    #[tokio::test]
    async fn zero_frequency_is_an_error() {
        let chain = Arc::new(MockChain::new());
        chain.set_latest_block(10);
        let s = scheduler(&chain, ReportableBlockSource::Frequency);
        assert!(matches!(
            s.decide().await,
            Err(OracleError::InvalidFrequency(_))
        ));
    }

    #[tokio::test]
    async fn read_errors_propagate() {
        let chain = Arc::new(MockChain::new());
        chain.fail_on("recorded_block");
        let s = scheduler(&chain, ReportableBlockSource::OnChain);
        assert!(matches!(s.decide().await, Err(OracleError::Read { .. })));
    }
}
