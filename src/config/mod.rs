//! Configuration management for devnet-node
//!
//! Handles devnet configuration loading, validation, and redaction. The
//! configuration is immutable per run: it is supplied at construction and
//! only replaced through an explicit stop/start cycle.

use crate::account;
use crate::error::{DevnetError, Result};
use crate::node::miner::MIN_MINING_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Marker substituted for the seed phrase in redacted output
pub const REDACTED: &str = "<redacted>";

/// Number of base units per whole coin (both address spaces use 18 decimals)
pub const DRIP_PER_COIN: u128 = 1_000_000_000_000_000_000;

/// Mining author selection
///
/// Either an explicit native-space address, or `Auto` meaning "use the
/// derived faucet account". Serialized as a plain string where the literal
/// `auto` selects `Auto`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MiningAuthor {
    /// Use the faucet account derived from the seed phrase
    Auto,
    /// Use this native-space address
    Explicit(String),
}

impl From<String> for MiningAuthor {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("auto") {
            MiningAuthor::Auto
        } else {
            MiningAuthor::Explicit(value)
        }
    }
}

impl From<MiningAuthor> for String {
    fn from(author: MiningAuthor) -> Self {
        match author {
            MiningAuthor::Auto => "auto".to_string(),
            MiningAuthor::Explicit(address) => address,
        }
    }
}

impl Default for MiningAuthor {
    fn default() -> Self {
        MiningAuthor::Auto
    }
}

/// Devnet server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevnetConfig {
    /// Native-space HTTP RPC port
    #[serde(default = "default_native_http_port")]
    pub native_http_port: u16,

    /// Native-space WebSocket RPC port
    #[serde(default = "default_native_ws_port")]
    pub native_ws_port: u16,

    /// EVM-space HTTP RPC port
    #[serde(default = "default_evm_http_port")]
    pub evm_http_port: u16,

    /// EVM-space WebSocket RPC port
    #[serde(default = "default_evm_ws_port")]
    pub evm_ws_port: u16,

    /// Native-space chain id
    #[serde(default = "default_native_chain_id")]
    pub native_chain_id: u32,

    /// EVM-space chain id
    #[serde(default = "default_evm_chain_id")]
    pub evm_chain_id: u32,

    /// Number of user accounts to derive and fund at genesis
    #[serde(default = "default_accounts_count")]
    pub accounts_count: u32,

    /// Initial balance of each genesis account, in whole coins
    #[serde(default = "default_initial_balance")]
    pub initial_balance: u64,

    /// Seed phrase that all accounts are derived from
    #[serde(default = "account::generate_mnemonic")]
    pub mnemonic: String,

    /// Node data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Mining author selection (`auto` or an explicit native address)
    #[serde(default)]
    pub mining_author: MiningAuthor,

    /// Whether every produced block also packs pending transactions
    #[serde(default = "default_true")]
    pub auto_pack: bool,

    /// Recurring mining interval in milliseconds
    #[serde(default = "default_mining_interval_ms")]
    pub mining_interval_ms: u64,
}

fn default_native_http_port() -> u16 {
    12537
}

fn default_native_ws_port() -> u16 {
    12535
}

fn default_evm_http_port() -> u16 {
    8545
}

fn default_evm_ws_port() -> u16 {
    8546
}

fn default_native_chain_id() -> u32 {
    2029
}

fn default_evm_chain_id() -> u32 {
    2030
}

fn default_accounts_count() -> u32 {
    10
}

fn default_initial_balance() -> u64 {
    1000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/devnet")
}

fn default_true() -> bool {
    true
}

fn default_mining_interval_ms() -> u64 {
    1000
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            native_http_port: default_native_http_port(),
            native_ws_port: default_native_ws_port(),
            evm_http_port: default_evm_http_port(),
            evm_ws_port: default_evm_ws_port(),
            native_chain_id: default_native_chain_id(),
            evm_chain_id: default_evm_chain_id(),
            accounts_count: default_accounts_count(),
            initial_balance: default_initial_balance(),
            mnemonic: account::generate_mnemonic(),
            data_dir: default_data_dir(),
            mining_author: MiningAuthor::Auto,
            auto_pack: true,
            mining_interval_ms: default_mining_interval_ms(),
        }
    }
}

impl DevnetConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        account::validate_mnemonic(&self.mnemonic)?;
        if self.accounts_count == 0 {
            return Err(DevnetError::InvalidConfig {
                reason: "accounts_count must be at least 1".to_string(),
            });
        }
        let floor_ms = MIN_MINING_INTERVAL.as_millis() as u64;
        if self.mining_interval_ms < floor_ms {
            return Err(DevnetError::InvalidMiningInterval {
                requested_ms: self.mining_interval_ms,
                floor_ms,
            });
        }
        if let MiningAuthor::Explicit(address) = &self.mining_author {
            account::parse_native_address(address)?;
        }
        Ok(())
    }

    /// Recurring mining interval
    pub fn mining_interval(&self) -> Duration {
        Duration::from_millis(self.mining_interval_ms)
    }

    /// Initial genesis balance per account, in base units
    pub fn initial_balance_drip(&self) -> u128 {
        self.initial_balance as u128 * DRIP_PER_COIN
    }
}

/// Redacted view of the configuration, safe for logs and API responses
///
/// Redaction is structural: this type has no field that could hold the
/// seed phrase or key material. The `mnemonic` field is the literal
/// redaction marker by construction.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub native_http_port: u16,
    pub native_ws_port: u16,
    pub evm_http_port: u16,
    pub evm_ws_port: u16,
    pub native_chain_id: u32,
    pub evm_chain_id: u32,
    pub accounts_count: u32,
    pub initial_balance: u64,
    pub mnemonic: &'static str,
    pub data_dir: PathBuf,
    pub mining_author: MiningAuthor,
    pub auto_pack: bool,
    pub mining_interval_ms: u64,
}

impl From<&DevnetConfig> for RedactedConfig {
    fn from(config: &DevnetConfig) -> Self {
        Self {
            native_http_port: config.native_http_port,
            native_ws_port: config.native_ws_port,
            evm_http_port: config.evm_http_port,
            evm_ws_port: config.evm_ws_port,
            native_chain_id: config.native_chain_id,
            evm_chain_id: config.evm_chain_id,
            accounts_count: config.accounts_count,
            initial_balance: config.initial_balance,
            mnemonic: REDACTED,
            data_dir: config.data_dir.clone(),
            mining_author: config.mining_author.clone(),
            auto_pack: config.auto_pack,
            mining_interval_ms: config.mining_interval_ms,
        }
    }
}
