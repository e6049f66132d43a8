//! Devnet server lifecycle
//!
//! `Devnet` owns the embedded node runtime, the derived account set, the
//! mining coordinator, and the faucet. Lifecycle transitions are serialized
//! through an internal async mutex so that overlapping start/stop/restart
//! calls cannot interleave; every other surface is safe to call
//! concurrently.
//!
//! Transitions follow stopped -> starting -> running -> stopping -> stopped,
//! with `Error` as the terminal state of a failed transition. Calls that
//! need a live node (mining control, faucet funding) check the state and
//! fail with `ServerNotRunning` instead of blocking.

pub mod faucet;
pub mod miner;

use crate::account::{self, AccountInfo};
use crate::chain::{ChainClient, GenesisAccount, GenesisConfig, NodeRuntime, TxId};
use crate::config::{DevnetConfig, MiningAuthor, RedactedConfig};
use crate::error::{DevnetError, Result};
use crate::node::faucet::{DualFunding, Faucet, FaucetBalances};
use crate::node::miner::{MiningCoordinator, MiningStatus};
use crate::utils;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of the devnet server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// A start or stop transition failed; the next successful transition
    /// leaves this state
    Error,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Full status snapshot, safe for logs and API responses
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatusReport {
    pub status: ServerStatus,
    pub mining: MiningStatus,
    pub config: RedactedConfig,
}

/// Local development network manager
///
/// Generic over the node runtime and the signing client so tests can
/// substitute doubles; `LocalDevnet` wires both to the in-process
/// simulated node.
pub struct Devnet<N: NodeRuntime + 'static, C: ChainClient + 'static> {
    config: DevnetConfig,
    runtime: Arc<N>,
    client: Arc<C>,
    accounts: RwLock<Vec<AccountInfo>>,
    faucet_account: AccountInfo,
    status: Arc<RwLock<ServerStatus>>,
    /// Present only while the server is running
    active_client: RwLock<Option<Arc<C>>>,
    miner: MiningCoordinator<N>,
    lifecycle: tokio::sync::Mutex<()>,
    shutdown_hook_registered: AtomicBool,
}

/// Devnet wired to the in-process simulated node
pub type LocalDevnet = Devnet<crate::chain::local::LocalNode, crate::chain::local::LocalNode>;

impl LocalDevnet {
    /// Build a devnet backed by a fresh simulated node
    pub fn local(config: DevnetConfig) -> Result<Arc<Self>> {
        let node = Arc::new(crate::chain::local::LocalNode::new());
        let devnet = Devnet::new(config, Arc::clone(&node), node)?;
        Ok(Arc::new(devnet))
    }
}

impl<N: NodeRuntime + 'static, C: ChainClient + 'static> Devnet<N, C> {
    /// Create a devnet in the stopped state
    ///
    /// Validates the configuration and derives the account set eagerly, so
    /// addresses are printable before the node is ever launched.
    pub fn new(config: DevnetConfig, runtime: Arc<N>, client: Arc<C>) -> Result<Self> {
        config.validate()?;
        let accounts = account::derive_accounts(
            &config.mnemonic,
            config.accounts_count,
            0,
            config.native_chain_id,
        )?;
        let faucet_account = account::derive_faucet_account(&config.mnemonic, config.native_chain_id)?;
        let status = Arc::new(RwLock::new(ServerStatus::Stopped));
        let miner = MiningCoordinator::new(
            Arc::clone(&runtime),
            Arc::clone(&status),
            config.mining_interval(),
        );
        Ok(Self {
            config,
            runtime,
            client,
            accounts: RwLock::new(accounts),
            faucet_account,
            status,
            active_client: RwLock::new(None),
            miner,
            lifecycle: tokio::sync::Mutex::new(()),
            shutdown_hook_registered: AtomicBool::new(false),
        })
    }

    /// Current lifecycle state
    pub fn status(&self) -> ServerStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// Whether the server is in the running state
    pub fn is_running(&self) -> bool {
        self.status() == ServerStatus::Running
    }

    /// Redacted configuration, safe to print
    pub fn config(&self) -> RedactedConfig {
        RedactedConfig::from(&self.config)
    }

    /// The seed phrase all accounts derive from
    ///
    /// This is the one deliberate exposure of the secret: callers print it
    /// for the developer at their own discretion. It never reaches logs or
    /// serialized output from this crate.
    pub fn mnemonic(&self) -> &str {
        &self.config.mnemonic
    }

    /// Derived user accounts, including any added after construction
    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.accounts.read().expect("accounts lock poisoned").clone()
    }

    /// The reserved faucet account
    pub fn faucet_account(&self) -> &AccountInfo {
        &self.faucet_account
    }

    /// Full status snapshot
    pub fn node_status(&self) -> NodeStatusReport {
        NodeStatusReport {
            status: self.status(),
            mining: self.miner.status(),
            config: self.config(),
        }
    }

    /// Snapshot of the mining loop state
    pub fn mining_status(&self) -> MiningStatus {
        self.miner.status()
    }

    fn set_status(&self, status: ServerStatus) {
        *self.status.write().expect("status lock poisoned") = status;
    }

    fn genesis_config(&self) -> GenesisConfig {
        let mining_author = match &self.config.mining_author {
            MiningAuthor::Auto => self.faucet_account.native_address.clone(),
            MiningAuthor::Explicit(address) => address.clone(),
        };
        let balance = self.config.initial_balance_drip();
        let mut genesis_accounts: Vec<GenesisAccount> = self
            .accounts
            .read()
            .expect("accounts lock poisoned")
            .iter()
            .map(|a| GenesisAccount {
                native_address: a.native_address.clone(),
                evm_address: a.evm_address.clone(),
                balance,
            })
            .collect();
        genesis_accounts.push(GenesisAccount {
            native_address: self.faucet_account.native_address.clone(),
            evm_address: self.faucet_account.evm_address.clone(),
            balance,
        });
        GenesisConfig {
            native_chain_id: self.config.native_chain_id,
            evm_chain_id: self.config.evm_chain_id,
            native_http_port: self.config.native_http_port,
            native_ws_port: self.config.native_ws_port,
            evm_http_port: self.config.evm_http_port,
            evm_ws_port: self.config.evm_ws_port,
            data_dir: self.config.data_dir.clone(),
            auto_pack: self.config.auto_pack,
            mining_author,
            accounts: genesis_accounts,
        }
    }

    /// Start the devnet server and its recurring miner
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked().await
    }

    async fn start_locked(self: &Arc<Self>) -> Result<()> {
        if self.is_running() {
            return Err(DevnetError::ServerAlreadyRunning);
        }
        self.set_status(ServerStatus::Starting);
        info!(
            native_chain_id = self.config.native_chain_id,
            evm_chain_id = self.config.evm_chain_id,
            "starting devnet server"
        );

        // The node creates its own directory layout; a failure here is
        // only worth a warning.
        if let Err(e) = std::fs::create_dir_all(&self.config.data_dir) {
            warn!(
                "could not create data directory {}: {}",
                self.config.data_dir.display(),
                e
            );
        }

        let genesis = self.genesis_config();
        if let Err(e) = self.runtime.launch(&genesis).await {
            self.set_status(ServerStatus::Error);
            return Err(DevnetError::ServerStartFailure {
                config: self.config(),
                source: e.into(),
            });
        }

        self.set_status(ServerStatus::Running);
        *self
            .active_client
            .write()
            .expect("active client lock poisoned") = Some(Arc::clone(&self.client));
        self.register_shutdown_hook();

        if let Err(e) = self.miner.start_mining(None) {
            *self
                .active_client
                .write()
                .expect("active client lock poisoned") = None;
            self.set_status(ServerStatus::Error);
            return Err(DevnetError::ServerStartFailure {
                config: self.config(),
                source: e.into(),
            });
        }

        info!(
            accounts = self.accounts.read().expect("accounts lock poisoned").len(),
            "devnet server running"
        );
        Ok(())
    }

    /// Stop the server, the miner, and release the node
    ///
    /// Stopping an already-stopped server is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> Result<()> {
        if self.status() == ServerStatus::Stopped {
            debug!("stop requested but server is already stopped");
            return Ok(());
        }
        self.set_status(ServerStatus::Stopping);

        if self.miner.is_running() {
            if let Err(e) = self.miner.stop_mining() {
                warn!("could not stop mining during shutdown: {}", e);
            }
        }
        *self
            .active_client
            .write()
            .expect("active client lock poisoned") = None;

        if let Err(e) = self.runtime.shutdown().await {
            self.set_status(ServerStatus::Error);
            return Err(DevnetError::ServerStopFailure { source: e.into() });
        }

        self.set_status(ServerStatus::Stopped);
        info!("devnet server stopped");
        Ok(())
    }

    /// Stop then start under one lifecycle guard
    pub async fn restart(self: &Arc<Self>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await?;
        self.start_locked().await
    }

    /// Register a one-shot task that stops the server on SIGINT/SIGTERM
    ///
    /// Holds only a weak reference so the hook never keeps a dropped
    /// devnet alive.
    fn register_shutdown_hook(self: &Arc<Self>) {
        if self.shutdown_hook_registered.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            utils::signal::wait_for_shutdown_signal().await;
            if let Some(devnet) = weak.upgrade() {
                info!("shutdown signal received, stopping devnet server");
                if let Err(e) = devnet.stop().await {
                    warn!("shutdown-hook stop failed: {}", e);
                }
            }
        });
    }

    /// Derive or import an additional account
    ///
    /// With a key the account is imported at the next free index; without
    /// one it is derived from the seed phrase at that index.
    pub fn add_account(&self, private_key: Option<&str>) -> Result<AccountInfo> {
        let mut accounts = self.accounts.write().expect("accounts lock poisoned");
        let index = accounts.len() as u32;
        let account = match private_key {
            Some(key) => account::account_from_private_key(key, index, self.config.native_chain_id)?,
            None => account::derive_account(&self.config.mnemonic, index, self.config.native_chain_id)?,
        };
        accounts.push(account.clone());
        info!(index, address = %account.native_address, "account added");
        Ok(account)
    }

    /// Start the recurring mining loop
    pub fn start_mining(&self, interval: Option<Duration>) -> Result<()> {
        self.miner.start_mining(interval)
    }

    /// Stop the recurring mining loop
    pub fn stop_mining(&self) -> Result<()> {
        self.miner.stop_mining()
    }

    /// Change the recurring mining interval
    pub fn set_mining_interval(&self, interval: Duration) -> Result<()> {
        self.miner.set_interval(interval)
    }

    /// Produce blocks on demand through the lightweight path
    pub async fn mine(&self, blocks: u64) -> Result<()> {
        self.miner.mine(blocks).await
    }

    /// Flush pending transactions in both address spaces
    pub async fn pack_mine(&self) -> Result<()> {
        self.miner.pack_mine().await
    }

    fn faucet(&self) -> Result<Faucet<C>> {
        // Funding is permitted only in the running state; a client handle
        // left over from a failed transition does not count.
        if !self.is_running() {
            return Err(DevnetError::ServerNotRunning);
        }
        let client = self
            .active_client
            .read()
            .expect("active client lock poisoned")
            .clone()
            .ok_or(DevnetError::ServerNotRunning)?;
        Ok(Faucet::new(
            self.faucet_account.clone(),
            client,
            self.config.native_chain_id,
        ))
    }

    /// Fund a native-space address from the faucet
    pub async fn fund_core_account(&self, target: &str, amount: u128) -> Result<TxId> {
        self.faucet()?.fund_native(target, amount).await
    }

    /// Fund an EVM-space address from the faucet, routed over the bridge
    pub async fn fund_evm_account(&self, target: &str, amount: u128) -> Result<TxId> {
        self.faucet()?.fund_evm(target, amount).await
    }

    /// Fund both addresses of one key pair from the faucet
    pub async fn fund_dual_chain_account(
        &self,
        private_key: &str,
        native_amount: u128,
        evm_amount: u128,
    ) -> Result<DualFunding> {
        self.faucet()?
            .fund_dual(private_key, native_amount, evm_amount)
            .await
    }

    /// Remaining faucet balances in both spaces
    pub async fn faucet_balances(&self) -> Result<FaucetBalances> {
        self.faucet()?.balances().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REDACTED;

    const MNEMONIC: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn test_config() -> DevnetConfig {
        DevnetConfig {
            accounts_count: 3,
            mnemonic: MNEMONIC.to_string(),
            data_dir: std::env::temp_dir().join("devnet-node-mod-tests"),
            ..DevnetConfig::default()
        }
    }

    #[test]
    fn test_server_status_display_and_serde() {
        assert_eq!(ServerStatus::Running.to_string(), "running");
        assert_eq!(
            serde_json::to_string(&ServerStatus::Stopped).unwrap(),
            "\"stopped\""
        );
    }

    #[tokio::test]
    async fn test_accounts_available_before_start() {
        let devnet = LocalDevnet::local(test_config()).unwrap();
        assert_eq!(devnet.status(), ServerStatus::Stopped);
        assert_eq!(devnet.accounts().len(), 3);
        assert!(devnet.faucet_account().is_faucet());
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let devnet = LocalDevnet::local(test_config()).unwrap();

        devnet.start().await.unwrap();
        assert_eq!(devnet.status(), ServerStatus::Running);
        assert!(devnet.mining_status().is_running);

        assert!(matches!(
            devnet.start().await,
            Err(DevnetError::ServerAlreadyRunning)
        ));

        devnet.stop().await.unwrap();
        assert_eq!(devnet.status(), ServerStatus::Stopped);
        assert!(!devnet.mining_status().is_running);

        // Stopping again is a no-op
        devnet.stop().await.unwrap();
        assert_eq!(devnet.status(), ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_funding_requires_running_server() {
        let devnet = LocalDevnet::local(test_config()).unwrap();
        let target = devnet.accounts()[0].native_address.clone();
        assert!(matches!(
            devnet.fund_core_account(&target, 1).await,
            Err(DevnetError::ServerNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_add_account_derives_next_index() {
        let devnet = LocalDevnet::local(test_config()).unwrap();
        let added = devnet.add_account(None).unwrap();
        assert_eq!(added.index, 3);
        assert_eq!(devnet.accounts().len(), 4);
        // Matches direct derivation at the same index
        let expected = account::derive_account(MNEMONIC, 3, 2029).unwrap();
        assert_eq!(added.native_address, expected.native_address);
    }

    #[tokio::test]
    async fn test_sub_floor_interval_rejected_at_construction() {
        let mut config = test_config();
        config.mining_interval_ms = 10;
        // A sub-floor interval can never reach the mining loop: it is
        // rejected before a devnet exists to start.
        assert!(matches!(
            LocalDevnet::local(config),
            Err(DevnetError::InvalidMiningInterval {
                requested_ms: 10,
                floor_ms: 100
            })
        ));
    }

    #[tokio::test]
    async fn test_funding_gated_on_status_not_client_handle() {
        let devnet = LocalDevnet::local(test_config()).unwrap();
        devnet.start().await.unwrap();

        // A failed transition can leave the client handle installed while
        // the status is no longer running; funding must still refuse.
        devnet.set_status(ServerStatus::Error);
        let target = devnet.accounts()[0].native_address.clone();
        assert!(matches!(
            devnet.fund_core_account(&target, 1).await,
            Err(DevnetError::ServerNotRunning)
        ));
        assert!(matches!(
            devnet.faucet_balances().await,
            Err(DevnetError::ServerNotRunning)
        ));

        devnet.set_status(ServerStatus::Running);
        devnet.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_node_status_never_contains_mnemonic() {
        let devnet = LocalDevnet::local(test_config()).unwrap();
        let json = serde_json::to_string(&devnet.node_status()).unwrap();
        assert!(!json.contains(MNEMONIC));
        assert!(json.contains(REDACTED));
    }
}
