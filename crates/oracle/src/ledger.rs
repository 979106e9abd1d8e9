//! # Submission De-duplication Ledger
//!
//! Reads the per-node submission flags the protocol records on-chain.
//!
//! | Exact flag | Coarse flag | Decision |
//! |------------|-------------|----------|
//! | set | - | [`LedgerStatus::AlreadySubmitted`] |
//! | unset | set | [`LedgerStatus::Stale`] (resubmit new values) |
//! | unset | unset | [`LedgerStatus::Fresh`] |
//!
//! The exact flag is the idempotency key: identical `(node, block, values)`
//! is never submitted twice.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use watchtower_chain::storage_keys::{coarse_key, exact_key};
use watchtower_chain::ProtocolReader;
use watchtower_common::ReportCategory;

use crate::error::OracleError;

/// Submission history of one node for one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Nothing submitted yet.
    Fresh,
    /// Different values were submitted earlier.
    Stale,
    /// These exact values are already on-chain.
    AlreadySubmitted,
}

/// On-chain submission flag reader.
#[derive(Clone)]
pub struct SubmissionLedger {
    protocol: Arc<dyn ProtocolReader>,
}

impl SubmissionLedger {
    pub fn new(protocol: Arc<dyn ProtocolReader>) -> Self {
        Self { protocol }
    }

    pub async fn has_submitted_exact(
        &self,
        node: Address,
        category: ReportCategory,
        block: u64,
        values: &[U256],
    ) -> Result<bool, OracleError> {
        self.protocol
            .storage_bool(exact_key(category, node, block, values))
            .await
            .map_err(OracleError::read("exact submission flag"))
    }

    pub async fn has_submitted_any(
        &self,
        node: Address,
        category: ReportCategory,
        block: u64,
    ) -> Result<bool, OracleError> {
        self.protocol
            .storage_bool(coarse_key(category, node, block))
            .await
            .map_err(OracleError::read("coarse submission flag"))
    }

    /// Combined check; the coarse flag is only read when the exact one is unset.
    pub async fn status(
        &self,
        node: Address,
        category: ReportCategory,
        block: u64,
        values: &[U256],
    ) -> Result<LedgerStatus, OracleError> {
        if self.has_submitted_exact(node, category, block, values).await? {
            return Ok(LedgerStatus::AlreadySubmitted);
        }
        if self.has_submitted_any(node, category, block).await? {
            return Ok(LedgerStatus::Stale);
        }
        Ok(LedgerStatus::Fresh)
    }
}
