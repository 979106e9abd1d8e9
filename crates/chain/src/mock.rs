//! # In-Memory Chain
//!
//! [`MockChain`] implements every chain-facing trait of this crate against
//! in-memory state so the reporting engine can be driven end-to-end
//! without a node.
//!
//! - State is set through `&self` setters; all state sits behind one
//!   `parking_lot::Mutex` that is never held across an `.await`.
//! - Any method can be made to fail with [`MockChain::fail_on`]; every
//!   call is counted ([`MockChain::calls`]).
//! - A successful `send` records the coarse and exact submission flags in
//!   storage, the way the protocol contract does.
//! - [`MockChain::hold_inclusion`] makes `wait_for_inclusion` block until
//!   [`MockChain::release_inclusion`] is called, to observe in-flight
//!   submissions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use watchtower_common::{
    BeaconChainConfig, BeaconHead, BlockHeader, ReportCategory, ValidatorPubkey, ValidatorStatus,
};

use crate::consensus::ConsensusClient;
use crate::error::ChainError;
use crate::execution::{ExecutionClient, GasInfo, SubmissionCall, TransactionSender, TxOptions, TxReceipt};
use crate::protocol::{MinipoolInfo, PoolReader, PoolReserves, ProtocolReader, RewardsIntervalInfo};
use crate::storage_keys::{coarse_key, exact_key};
use crate::ChainClients;

/// Node account used by a fresh [`MockChain`].
pub const MOCK_NODE: Address = Address::repeat_byte(0xAA);

/// Seconds between consecutive mock blocks when no header is set.
pub const MOCK_BLOCK_TIME: u64 = 12;

/// A transaction accepted by [`MockChain::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub call: SubmissionCall,
    pub options: TxOptions,
    pub tx_hash: B256,
}

struct MockState {
    execution_synced: bool,
    consensus_synced: bool,
    latest_block: u64,
    genesis_block_time: u64,
    headers: HashMap<u64, BlockHeader>,
    balances: HashMap<Address, U256>,

    trusted: HashSet<Address>,
    enabled: HashMap<ReportCategory, bool>,
    recorded_block: HashMap<ReportCategory, u64>,
    reportable_block: HashMap<ReportCategory, u64>,
    frequency: HashMap<ReportCategory, u64>,
    storage: HashSet<B256>,
    deposit_pool: U256,
    minipools: Vec<MinipoolInfo>,
    nodes: Vec<Address>,
    distributors: HashMap<Address, Address>,
    reth_address: Address,
    reth_supply: U256,
    rewards_interval: RewardsIntervalInfo,

    tick_cumulatives: Option<Vec<i64>>,
    reserves: HashMap<u64, PoolReserves>,
    cumulatives: HashMap<(u64, bool), U256>,

    beacon_config: BeaconChainConfig,
    beacon_head: BeaconHead,
    validators: HashMap<ValidatorPubkey, ValidatorStatus>,

    node_address: Address,
    gas: GasInfo,
    revert_submissions: bool,
    record_on_send: bool,
    sent: Vec<SentTransaction>,
    inclusion_gate: Option<Arc<Semaphore>>,

    failures: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
}

impl Default for MockState {
    fn default() -> Self {
        let mut trusted = HashSet::new();
        trusted.insert(MOCK_NODE);
        Self {
            execution_synced: true,
            consensus_synced: true,
            latest_block: 0,
            genesis_block_time: 1_600_000_000,
            headers: HashMap::new(),
            balances: HashMap::new(),
            trusted,
            enabled: HashMap::new(),
            recorded_block: HashMap::new(),
            reportable_block: HashMap::new(),
            frequency: HashMap::new(),
            storage: HashSet::new(),
            deposit_pool: U256::ZERO,
            minipools: Vec::new(),
            nodes: Vec::new(),
            distributors: HashMap::new(),
            reth_address: Address::repeat_byte(0xEE),
            reth_supply: U256::ZERO,
            rewards_interval: RewardsIntervalInfo {
                index: 0,
                start_time: 1_600_000_000,
                interval_duration: 28 * 24 * 3600,
            },
            tick_cumulatives: None,
            reserves: HashMap::new(),
            cumulatives: HashMap::new(),
            beacon_config: BeaconChainConfig {
                genesis_time: 1_600_000_000,
                seconds_per_slot: 12,
                slots_per_epoch: 32,
            },
            beacon_head: BeaconHead {
                epoch: u64::MAX / 2,
                finalized_epoch: u64::MAX / 2,
            },
            validators: HashMap::new(),
            node_address: MOCK_NODE,
            gas: GasInfo {
                estimated_gas_limit: 100_000,
                safe_gas_limit: 150_000,
                base_fee: U256::from(10_000_000_000u64),
            },
            revert_submissions: false,
            record_on_send: true,
            sent: Vec::new(),
            inclusion_gate: None,
            failures: HashSet::new(),
            calls: HashMap::new(),
        }
    }
}

/// In-memory implementation of every chain trait.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundles this chain as every collaborator of the engine.
    pub fn clients(self: &Arc<Self>) -> ChainClients {
        ChainClients {
            execution: self.clone(),
            protocol: self.clone(),
            pools: self.clone(),
            consensus: self.clone(),
            sender: self.clone(),
        }
    }

    // ── Failure injection & call accounting ──────────────────────────────

    /// Makes every later call to `method` (trait method name) fail.
    pub fn fail_on(&self, method: &'static str) {
        self.state.lock().failures.insert(method);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Number of calls made to `method` so far.
    pub fn calls(&self, method: &'static str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    fn enter(&self, method: &'static str) -> Result<(), ChainError> {
        let mut state = self.state.lock();
        *state.calls.entry(method).or_insert(0) += 1;
        if state.failures.contains(method) {
            return Err(ChainError::Transport(format!("injected failure: {}", method)));
        }
        Ok(())
    }

    // ── Execution layer ──────────────────────────────────────────────────

    pub fn set_synced(&self, execution: bool, consensus: bool) {
        let mut state = self.state.lock();
        state.execution_synced = execution;
        state.consensus_synced = consensus;
    }

    pub fn set_latest_block(&self, block: u64) {
        self.state.lock().latest_block = block;
    }

    /// Overrides the timestamp of one block. Other blocks are spaced
    /// [`MOCK_BLOCK_TIME`] seconds apart from the beacon genesis time.
    pub fn set_block_timestamp(&self, number: u64, timestamp: u64) {
        self.state
            .lock()
            .headers
            .insert(number, BlockHeader { number, timestamp });
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    // ── Protocol ─────────────────────────────────────────────────────────

    pub fn set_trusted(&self, node: Address, trusted: bool) {
        let mut state = self.state.lock();
        if trusted {
            state.trusted.insert(node);
        } else {
            state.trusted.remove(&node);
        }
    }

    pub fn set_enabled(&self, category: ReportCategory, enabled: bool) {
        self.state.lock().enabled.insert(category, enabled);
    }

    pub fn set_recorded_block(&self, category: ReportCategory, block: u64) {
        self.state.lock().recorded_block.insert(category, block);
    }

    pub fn set_reportable_block(&self, category: ReportCategory, block: u64) {
        self.state.lock().reportable_block.insert(category, block);
    }

    pub fn set_frequency(&self, category: ReportCategory, blocks: u64) {
        self.state.lock().frequency.insert(category, blocks);
    }

    pub fn set_storage_flag(&self, key: B256) {
        self.state.lock().storage.insert(key);
    }

    pub fn set_deposit_pool(&self, balance: U256) {
        self.state.lock().deposit_pool = balance;
    }

    pub fn add_minipool(&self, info: MinipoolInfo) {
        self.state.lock().minipools.push(info);
    }

    /// Registers a node and its fee distributor.
    pub fn add_node(&self, node: Address, distributor: Address) {
        let mut state = self.state.lock();
        state.nodes.push(node);
        state.distributors.insert(node, distributor);
    }

    pub fn set_reth(&self, address: Address, supply: U256) {
        let mut state = self.state.lock();
        state.reth_address = address;
        state.reth_supply = supply;
    }

    pub fn set_rewards_interval(&self, info: RewardsIntervalInfo) {
        self.state.lock().rewards_interval = info;
    }

    // ── Pools ────────────────────────────────────────────────────────────

    /// Tick cumulatives returned by every `observe` call.
    pub fn set_tick_cumulatives(&self, cumulatives: Vec<i64>) {
        self.state.lock().tick_cumulatives = Some(cumulatives);
    }

    pub fn set_pool_state(
        &self,
        block: u64,
        reserves: PoolReserves,
        price0_cumulative: U256,
        price1_cumulative: U256,
    ) {
        let mut state = self.state.lock();
        state.reserves.insert(block, reserves);
        state.cumulatives.insert((block, true), price0_cumulative);
        state.cumulatives.insert((block, false), price1_cumulative);
    }

    // ── Consensus ────────────────────────────────────────────────────────

    pub fn set_beacon_config(&self, config: BeaconChainConfig) {
        self.state.lock().beacon_config = config;
    }

    pub fn set_beacon_head(&self, epoch: u64, finalized_epoch: u64) {
        self.state.lock().beacon_head = BeaconHead {
            epoch,
            finalized_epoch,
        };
    }

    pub fn set_validator(&self, pubkey: ValidatorPubkey, status: ValidatorStatus) {
        self.state.lock().validators.insert(pubkey, status);
    }

    // ── Sender ───────────────────────────────────────────────────────────

    pub fn set_node_address(&self, node: Address) {
        self.state.lock().node_address = node;
    }

    pub fn set_gas(&self, gas: GasInfo) {
        self.state.lock().gas = gas;
    }

    /// Makes included submissions revert and record nothing.
    pub fn set_revert_submissions(&self, revert: bool) {
        self.state.lock().revert_submissions = revert;
    }

    /// Whether a successful `send` writes the submission flags.
    pub fn set_record_on_send(&self, record: bool) {
        self.state.lock().record_on_send = record;
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().sent.clone()
    }

    /// Blocks every later `wait_for_inclusion` until released.
    pub fn hold_inclusion(&self) {
        self.state.lock().inclusion_gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` held inclusions complete.
    pub fn release_inclusion(&self, count: usize) {
        if let Some(gate) = self.state.lock().inclusion_gate.as_ref() {
            gate.add_permits(count);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TRAIT IMPLS
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl ExecutionClient for MockChain {
    async fn is_synced(&self) -> Result<bool, ChainError> {
        self.enter("execution_is_synced")?;
        Ok(self.state.lock().execution_synced)
    }

    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        self.enter("latest_block_number")?;
        Ok(self.state.lock().latest_block)
    }

    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, ChainError> {
        self.enter("header_by_number")?;
        let state = self.state.lock();
        if number > state.latest_block {
            return Err(ChainError::NotFound(format!("block {}", number)));
        }
        Ok(state.headers.get(&number).copied().unwrap_or(BlockHeader {
            number,
            timestamp: state
                .genesis_block_time
                .saturating_add(number.saturating_mul(MOCK_BLOCK_TIME)),
        }))
    }

    async fn balance_at(&self, address: Address, _block: u64) -> Result<U256, ChainError> {
        self.enter("balance_at")?;
        Ok(self
            .state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO))
    }
}

#[async_trait]
impl ProtocolReader for MockChain {
    async fn is_trusted_member(&self, node: Address) -> Result<bool, ChainError> {
        self.enter("is_trusted_member")?;
        Ok(self.state.lock().trusted.contains(&node))
    }

    async fn submissions_enabled(&self, category: ReportCategory) -> Result<bool, ChainError> {
        self.enter("submissions_enabled")?;
        Ok(self.state.lock().enabled.get(&category).copied().unwrap_or(true))
    }

    async fn recorded_block(&self, category: ReportCategory) -> Result<u64, ChainError> {
        self.enter("recorded_block")?;
        Ok(self.state.lock().recorded_block.get(&category).copied().unwrap_or(0))
    }

    async fn latest_reportable_block(&self, category: ReportCategory) -> Result<u64, ChainError> {
        self.enter("latest_reportable_block")?;
        Ok(self
            .state
            .lock()
            .reportable_block
            .get(&category)
            .copied()
            .unwrap_or(0))
    }

    async fn submission_frequency(&self, category: ReportCategory) -> Result<u64, ChainError> {
        self.enter("submission_frequency")?;
        Ok(self.state.lock().frequency.get(&category).copied().unwrap_or(0))
    }

    async fn storage_bool(&self, key: B256) -> Result<bool, ChainError> {
        self.enter("storage_bool")?;
        Ok(self.state.lock().storage.contains(&key))
    }

    async fn deposit_pool_balance(&self, _block: u64) -> Result<U256, ChainError> {
        self.enter("deposit_pool_balance")?;
        Ok(self.state.lock().deposit_pool)
    }

    async fn minipool_addresses(&self, _block: u64) -> Result<Vec<Address>, ChainError> {
        self.enter("minipool_addresses")?;
        Ok(self.state.lock().minipools.iter().map(|m| m.address).collect())
    }

    async fn minipool_info(&self, minipool: Address, _block: u64) -> Result<MinipoolInfo, ChainError> {
        self.enter("minipool_info")?;
        self.state
            .lock()
            .minipools
            .iter()
            .find(|m| m.address == minipool)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("minipool {}", minipool)))
    }

    async fn node_addresses(&self, _block: u64) -> Result<Vec<Address>, ChainError> {
        self.enter("node_addresses")?;
        Ok(self.state.lock().nodes.clone())
    }

    async fn fee_distributor(&self, node: Address, _block: u64) -> Result<Address, ChainError> {
        self.enter("fee_distributor")?;
        self.state
            .lock()
            .distributors
            .get(&node)
            .copied()
            .ok_or_else(|| ChainError::NotFound(format!("distributor of {}", node)))
    }

    async fn reth_address(&self, _block: u64) -> Result<Address, ChainError> {
        self.enter("reth_address")?;
        Ok(self.state.lock().reth_address)
    }

    async fn reth_total_supply(&self, _block: u64) -> Result<U256, ChainError> {
        self.enter("reth_total_supply")?;
        Ok(self.state.lock().reth_supply)
    }

    async fn rewards_interval(&self, _block: u64) -> Result<RewardsIntervalInfo, ChainError> {
        self.enter("rewards_interval")?;
        Ok(self.state.lock().rewards_interval)
    }
}

#[async_trait]
impl PoolReader for MockChain {
    async fn observe(
        &self,
        _pool: Address,
        _seconds_agos: &[u32],
        _block: u64,
    ) -> Result<Vec<i64>, ChainError> {
        self.enter("observe")?;
        self.state
            .lock()
            .tick_cumulatives
            .clone()
            .ok_or_else(|| ChainError::NotFound("no pool observations".to_string()))
    }

    async fn reserves(&self, _pool: Address, block: u64) -> Result<PoolReserves, ChainError> {
        self.enter("reserves")?;
        self.state
            .lock()
            .reserves
            .get(&block)
            .copied()
            .ok_or_else(|| ChainError::NotFound(format!("reserves at {}", block)))
    }

    async fn price_cumulative_last(
        &self,
        _pool: Address,
        token0: bool,
        block: u64,
    ) -> Result<U256, ChainError> {
        self.enter("price_cumulative_last")?;
        self.state
            .lock()
            .cumulatives
            .get(&(block, token0))
            .copied()
            .ok_or_else(|| ChainError::NotFound(format!("cumulative price at {}", block)))
    }
}

#[async_trait]
impl ConsensusClient for MockChain {
    async fn is_synced(&self) -> Result<bool, ChainError> {
        self.enter("consensus_is_synced")?;
        Ok(self.state.lock().consensus_synced)
    }

    async fn config(&self) -> Result<BeaconChainConfig, ChainError> {
        self.enter("config")?;
        Ok(self.state.lock().beacon_config)
    }

    async fn head(&self) -> Result<BeaconHead, ChainError> {
        self.enter("head")?;
        Ok(self.state.lock().beacon_head)
    }

    async fn validator_statuses(
        &self,
        pubkeys: &[ValidatorPubkey],
        _epoch: u64,
    ) -> Result<HashMap<ValidatorPubkey, ValidatorStatus>, ChainError> {
        self.enter("validator_statuses")?;
        let state = self.state.lock();
        Ok(pubkeys
            .iter()
            .map(|pk| {
                let status = state
                    .validators
                    .get(pk)
                    .copied()
                    .unwrap_or(ValidatorStatus::missing());
                (*pk, status)
            })
            .collect())
    }
}

#[async_trait]
impl TransactionSender for MockChain {
    fn node_address(&self) -> Address {
        self.state.lock().node_address
    }

    async fn estimate_gas(&self, _call: &SubmissionCall) -> Result<GasInfo, ChainError> {
        self.enter("estimate_gas")?;
        Ok(self.state.lock().gas)
    }

    async fn send(&self, call: &SubmissionCall, options: &TxOptions) -> Result<B256, ChainError> {
        self.enter("send")?;
        let mut state = self.state.lock();
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&((state.sent.len() as u64) + 1).to_be_bytes());
        let tx_hash = B256::from(hash);

        if state.record_on_send && !state.revert_submissions {
            let node = state.node_address;
            let category = call.category();
            state.storage.insert(coarse_key(category, node, call.block()));
            state
                .storage
                .insert(exact_key(category, node, call.block(), &call.values()));
        }

        state.sent.push(SentTransaction {
            call: call.clone(),
            options: *options,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(&self, tx_hash: B256) -> Result<TxReceipt, ChainError> {
        self.enter("wait_for_inclusion")?;
        let gate = self.state.lock().inclusion_gate.clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| ChainError::Transport(e.to_string()))?
                .forget();
        }

        let state = self.state.lock();
        let sent = state
            .sent
            .iter()
            .find(|tx| tx.tx_hash == tx_hash)
            .ok_or_else(|| ChainError::NotFound(format!("transaction {}", tx_hash)))?;
        Ok(TxReceipt {
            tx_hash,
            block_number: state.latest_block.saturating_add(1),
            gas_used: sent.options.gas_limit.min(state.gas.estimated_gas_limit),
            success: !state.revert_submissions,
        })
    }
}

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<MockChain>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_records_coarse_and_exact_flags() {
        let chain = MockChain::new();
        let call = SubmissionCall::SubmitPrices {
            block: 50,
            price: U256::from(9u64),
        };
        let options = TxOptions {
            max_fee_per_gas: U256::from(1u64),
            max_priority_fee_per_gas: U256::from(1u64),
            gas_limit: 21_000,
        };

        let hash = chain.send(&call, &options).await.unwrap();
        let receipt = chain.wait_for_inclusion(hash).await.unwrap();
        assert!(receipt.success);

        let coarse = coarse_key(ReportCategory::Prices, MOCK_NODE, 50);
        let exact = exact_key(ReportCategory::Prices, MOCK_NODE, 50, &[U256::from(9u64)]);
        assert!(chain.storage_bool(coarse).await.unwrap());
        assert!(chain.storage_bool(exact).await.unwrap());
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_counted() {
        let chain = MockChain::new();
        chain.fail_on("deposit_pool_balance");

        assert!(chain.deposit_pool_balance(1).await.is_err());
        assert!(chain.deposit_pool_balance(1).await.is_err());
        assert_eq!(chain.calls("deposit_pool_balance"), 2);

        chain.clear_failures();
        assert_eq!(chain.deposit_pool_balance(1).await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn held_inclusion_waits_for_release() {
        let chain = Arc::new(MockChain::new());
        chain.hold_inclusion();
        let call = SubmissionCall::SubmitPrices {
            block: 1,
            price: U256::ZERO,
        };
        let options = TxOptions {
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            gas_limit: 1,
        };
        let hash = chain.send(&call, &options).await.unwrap();

        let waiter = {
            let chain = chain.clone();
            tokio::spawn(async move { chain.wait_for_inclusion(hash).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        chain.release_inclusion(1);
        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.tx_hash, hash);
    }

    #[tokio::test]
    async fn headers_default_to_regular_spacing() {
        let chain = MockChain::new();
        chain.set_latest_block(10);
        chain.set_block_timestamp(5, 42);

        let h = chain.header_by_number(10).await.unwrap();
        assert_eq!(h.timestamp, 1_600_000_000 + 10 * MOCK_BLOCK_TIME);
        assert_eq!(chain.header_by_number(5).await.unwrap().timestamp, 42);
        assert!(chain.header_by_number(11).await.is_err());
    }
}
