//! In-process simulated node runtime
//!
//! `LocalNode` implements both collaborator traits against in-memory
//! state: a block counter, per-space balance maps, and pending-transaction
//! counters. It also records the maximum number of concurrent control
//! calls it has observed, which the mining-exclusion tests assert on.

use crate::account;
use crate::chain::{
    bridge_address, decode_bridge_calldata, ChainClient, GenesisConfig, NodeRuntime, TxId,
    PACK_BATCH_BLOCKS,
};
use async_trait::async_trait;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct LocalState {
    genesis: Option<GenesisConfig>,
    block_number: u64,
    native_balances: HashMap<String, u128>,
    evm_balances: HashMap<String, u128>,
    pending_native: u64,
    pending_evm: u64,
    tx_counter: u64,
}

/// Simulated dual-space node
#[derive(Default)]
pub struct LocalNode {
    state: Mutex<LocalState>,
    control_in_flight: AtomicUsize,
    max_concurrent_control: AtomicUsize,
    produce_calls: AtomicU64,
    pack_calls: AtomicU64,
}

/// Tracks an in-flight control call for concurrency accounting
struct ControlGuard<'a> {
    node: &'a LocalNode,
}

impl<'a> ControlGuard<'a> {
    fn enter(node: &'a LocalNode) -> Self {
        let now = node.control_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        node.max_concurrent_control.fetch_max(now, Ordering::SeqCst);
        Self { node }
    }
}

impl Drop for ControlGuard<'_> {
    fn drop(&mut self) {
        self.node.control_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LocalNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether launch() has run and shutdown() has not
    pub fn is_launched(&self) -> bool {
        self.state.lock().expect("state mutex poisoned").genesis.is_some()
    }

    /// Current block number
    pub fn block_number(&self) -> u64 {
        self.state.lock().expect("state mutex poisoned").block_number
    }

    /// Pending transaction counts (native, evm)
    pub fn pending_transactions(&self) -> (u64, u64) {
        let state = self.state.lock().expect("state mutex poisoned");
        (state.pending_native, state.pending_evm)
    }

    /// Highest number of simultaneous control calls observed
    pub fn max_concurrent_control_calls(&self) -> usize {
        self.max_concurrent_control.load(Ordering::SeqCst)
    }

    /// Number of lightweight produce-blocks calls issued
    pub fn produce_call_count(&self) -> u64 {
        self.produce_calls.load(Ordering::SeqCst)
    }

    /// Number of pack-pending calls issued
    pub fn pack_call_count(&self) -> u64 {
        self.pack_calls.load(Ordering::SeqCst)
    }

    fn native_chain_id(state: &LocalState) -> anyhow::Result<u32> {
        state
            .genesis
            .as_ref()
            .map(|g| g.native_chain_id)
            .ok_or_else(|| anyhow::anyhow!("node is not launched"))
    }

    fn sender_address(from_private_key: &str, native_chain_id: u32) -> anyhow::Result<String> {
        let digits = from_private_key
            .strip_prefix("0x")
            .unwrap_or(from_private_key);
        let secret = SecretKey::from_slice(&hex::decode(digits)?)?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(account::native_address_from_public_key(
            &public,
            native_chain_id,
        ))
    }
}

#[async_trait]
impl NodeRuntime for LocalNode {
    async fn launch(&self, genesis: &GenesisConfig) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.genesis.is_some() {
            anyhow::bail!("node is already launched");
        }
        for entry in &genesis.accounts {
            state
                .native_balances
                .insert(entry.native_address.clone(), entry.balance);
            state
                .evm_balances
                .insert(entry.evm_address.clone(), entry.balance);
        }
        info!(
            accounts = genesis.accounts.len(),
            native_chain_id = genesis.native_chain_id,
            evm_chain_id = genesis.evm_chain_id,
            "local node launched"
        );
        state.genesis = Some(genesis.clone());
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.genesis.take().is_some() {
            info!("local node stopped at block {}", state.block_number);
        }
        Ok(())
    }

    async fn produce_blocks(&self, count: u64) -> anyhow::Result<()> {
        let _guard = ControlGuard::enter(self);
        self.produce_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().expect("state mutex poisoned");
        let auto_pack = match &state.genesis {
            Some(genesis) => genesis.auto_pack,
            None => anyhow::bail!("node is not launched"),
        };
        state.block_number += count;
        if auto_pack {
            // The lightweight path packs one address space per block,
            // never both.
            state.pending_native = state.pending_native.saturating_sub(count);
        }
        debug!(count, block = state.block_number, "produced blocks");
        Ok(())
    }

    async fn pack_pending_transactions(&self) -> anyhow::Result<()> {
        let _guard = ControlGuard::enter(self);
        self.pack_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.genesis.is_none() {
            anyhow::bail!("node is not launched");
        }
        state.block_number += PACK_BATCH_BLOCKS;
        state.pending_native = 0;
        state.pending_evm = 0;
        debug!(block = state.block_number, "packed pending transactions");
        Ok(())
    }
}

#[async_trait]
impl ChainClient for LocalNode {
    async fn send_native_transfer(
        &self,
        from_private_key: &str,
        to: &str,
        amount: u128,
        data: &[u8],
    ) -> anyhow::Result<TxId> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        let chain_id = Self::native_chain_id(&state)?;
        let from = Self::sender_address(from_private_key, chain_id)?;

        let balance = state.native_balances.get(&from).copied().unwrap_or(0);
        if balance < amount {
            anyhow::bail!(
                "insufficient balance: {} has {} but tried to send {}",
                from,
                balance,
                amount
            );
        }
        state.native_balances.insert(from.clone(), balance - amount);

        if to == bridge_address(chain_id) {
            let target = decode_bridge_calldata(data)
                .ok_or_else(|| anyhow::anyhow!("malformed bridge calldata"))?;
            let evm_address = format!("0x{}", hex::encode(target));
            *state.evm_balances.entry(evm_address).or_insert(0) += amount;
            state.pending_evm += 1;
        } else {
            account::parse_native_address(to)
                .map_err(|_| anyhow::anyhow!("unknown native address: {}", to))?;
            *state.native_balances.entry(to.to_string()).or_insert(0) += amount;
        }
        state.pending_native += 1;

        state.tx_counter += 1;
        let mut hasher = Keccak256::new();
        hasher.update(state.tx_counter.to_be_bytes());
        hasher.update(to.as_bytes());
        Ok(format!("0x{}", hex::encode(hasher.finalize())))
    }

    async fn native_balance(&self, address: &str) -> anyhow::Result<u128> {
        let state = self.state.lock().expect("state mutex poisoned");
        Ok(state.native_balances.get(address).copied().unwrap_or(0))
    }

    async fn evm_balance(&self, address: &str) -> anyhow::Result<u128> {
        let state = self.state.lock().expect("state mutex poisoned");
        Ok(state.evm_balances.get(address).copied().unwrap_or(0))
    }
}
