//! Consensus-layer reads.

use std::collections::HashMap;

use async_trait::async_trait;
use watchtower_common::{BeaconChainConfig, BeaconHead, ValidatorPubkey, ValidatorStatus};

use crate::error::ChainError;

/// Read access to the consensus layer (beacon node).
#[async_trait]
pub trait ConsensusClient: Send + Sync {
    async fn is_synced(&self) -> Result<bool, ChainError>;

    /// Genesis time and slot/epoch timing.
    async fn config(&self) -> Result<BeaconChainConfig, ChainError>;

    /// Head epoch and latest finalized epoch.
    async fn head(&self) -> Result<BeaconHead, ChainError>;

    /// Status of each requested validator as of `epoch`.
    ///
    /// The result contains an entry for every requested pubkey; pubkeys
    /// unknown to the consensus layer map to [`ValidatorStatus::missing`].
    async fn validator_statuses(
        &self,
        pubkeys: &[ValidatorPubkey],
        epoch: u64,
    ) -> Result<HashMap<ValidatorPubkey, ValidatorStatus>, ChainError>;
}
