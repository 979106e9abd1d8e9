//! # Beacon API Client
//!
//! [`ConsensusClient`] implementation over the standard Beacon node HTTP API.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | `is_synced` | `GET /eth/v1/node/syncing` |
//! | `config` | `GET /eth/v1/beacon/genesis` + `GET /eth/v1/config/spec` |
//! | `head` | `GET /eth/v1/node/syncing` + `GET /eth/v1/beacon/states/head/finality_checkpoints` |
//! | `validator_statuses` | `GET /eth/v1/beacon/states/{slot}/validators?id=...` |
//!
//! Beacon API integers are JSON strings; they are parsed into `u64` here.
//! The chain config never changes for a running node and is fetched once.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use tokio::sync::OnceCell;
use tracing::debug;
use watchtower_common::config::BeaconEndpointConfig;
use watchtower_common::{BeaconChainConfig, BeaconHead, ValidatorPubkey, ValidatorStatus};

use crate::consensus::ConsensusClient;
use crate::error::ChainError;

/// Pubkeys per `validators` request; keeps the query string bounded.
pub const VALIDATOR_QUERY_CHUNK: usize = 64;

// ════════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct GenesisData {
    #[serde(deserialize_with = "string_u64")]
    genesis_time: u64,
}

#[derive(Debug, Deserialize)]
struct SpecData {
    #[serde(rename = "SECONDS_PER_SLOT", deserialize_with = "string_u64")]
    seconds_per_slot: u64,
    #[serde(rename = "SLOTS_PER_EPOCH", deserialize_with = "string_u64")]
    slots_per_epoch: u64,
}

#[derive(Debug, Deserialize)]
struct SyncingData {
    #[serde(deserialize_with = "string_u64")]
    head_slot: u64,
    is_syncing: bool,
}

#[derive(Debug, Deserialize)]
struct Checkpoint {
    #[serde(deserialize_with = "string_u64")]
    epoch: u64,
}

#[derive(Debug, Deserialize)]
struct FinalityData {
    finalized: Checkpoint,
}

#[derive(Debug, Deserialize)]
struct ValidatorEntry {
    #[serde(deserialize_with = "string_u64")]
    balance: u64,
    validator: ValidatorData,
}

#[derive(Debug, Deserialize)]
struct ValidatorData {
    pubkey: String,
    #[serde(deserialize_with = "string_u64")]
    activation_epoch: u64,
    #[serde(deserialize_with = "string_u64")]
    exit_epoch: u64,
}

fn string_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<u64>().map_err(de::Error::custom)
}

// ════════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════════

/// Beacon node HTTP client.
#[derive(Debug)]
pub struct HttpBeaconClient {
    base: String,
    client: Client,
    chain_config: OnceCell<BeaconChainConfig>,
}

impl HttpBeaconClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = base.into().trim_end_matches('/').to_string();
        Ok(Self {
            base,
            client,
            chain_config: OnceCell::new(),
        })
    }

    pub fn from_config(config: &BeaconEndpointConfig) -> Result<Self, ChainError> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = format!("{}{}", self.base, path);
        let r = self.client.get(&url).send().await?;
        let status = r.status();
        if !status.is_success() {
            let body = r.text().await.unwrap_or_default();
            return Err(ChainError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let envelope = r.json::<Envelope<T>>().await?;
        Ok(envelope.data)
    }

    async fn syncing(&self) -> Result<SyncingData, ChainError> {
        self.get("/eth/v1/node/syncing").await
    }

    async fn fetch_config(&self) -> Result<BeaconChainConfig, ChainError> {
        let genesis: GenesisData = self.get("/eth/v1/beacon/genesis").await?;
        let spec: SpecData = self.get("/eth/v1/config/spec").await?;
        if spec.slots_per_epoch == 0 || spec.seconds_per_slot == 0 {
            return Err(ChainError::Decode(
                "beacon spec reports zero slot timing".to_string(),
            ));
        }
        Ok(BeaconChainConfig {
            genesis_time: genesis.genesis_time,
            seconds_per_slot: spec.seconds_per_slot,
            slots_per_epoch: spec.slots_per_epoch,
        })
    }
}

#[async_trait]
impl ConsensusClient for HttpBeaconClient {
    async fn is_synced(&self) -> Result<bool, ChainError> {
        Ok(!self.syncing().await?.is_syncing)
    }

    async fn config(&self) -> Result<BeaconChainConfig, ChainError> {
        self.chain_config
            .get_or_try_init(|| self.fetch_config())
            .await
            .copied()
    }

    async fn head(&self) -> Result<BeaconHead, ChainError> {
        let config = self.config().await?;
        let syncing = self.syncing().await?;
        let finality: FinalityData = self
            .get("/eth/v1/beacon/states/head/finality_checkpoints")
            .await?;
        Ok(BeaconHead {
            epoch: syncing.head_slot / config.slots_per_epoch,
            finalized_epoch: finality.finalized.epoch,
        })
    }

    async fn validator_statuses(
        &self,
        pubkeys: &[ValidatorPubkey],
        epoch: u64,
    ) -> Result<HashMap<ValidatorPubkey, ValidatorStatus>, ChainError> {
        let config = self.config().await?;
        let slot = epoch.saturating_mul(config.slots_per_epoch);

        let mut statuses: HashMap<ValidatorPubkey, ValidatorStatus> = pubkeys
            .iter()
            .map(|pk| (*pk, ValidatorStatus::missing()))
            .collect();

        for chunk in pubkeys.chunks(VALIDATOR_QUERY_CHUNK) {
            let ids = chunk
                .iter()
                .map(ValidatorPubkey::to_hex)
                .collect::<Vec<_>>()
                .join(",");
            let path = format!("/eth/v1/beacon/states/{}/validators?id={}", slot, ids);
            let entries: Vec<ValidatorEntry> = self.get(&path).await?;
            debug!(
                requested = chunk.len(),
                returned = entries.len(),
                slot,
                "validator status chunk"
            );

            for entry in entries {
                let pubkey: ValidatorPubkey = entry
                    .validator
                    .pubkey
                    .parse()
                    .map_err(|e: watchtower_common::types::PubkeyParseError| {
                        ChainError::Decode(e.to_string())
                    })?;
                statuses.insert(
                    pubkey,
                    ValidatorStatus {
                        exists: true,
                        activation_epoch: entry.validator.activation_epoch,
                        exit_epoch: entry.validator.exit_epoch,
                        balance_gwei: entry.balance,
                    },
                );
            }
        }

        Ok(statuses)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
