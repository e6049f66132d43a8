//! devnet-node: local development network manager
//!
//! Manages an embedded dual-space blockchain node for local development:
//! lifecycle (start/stop/restart), deterministic account derivation from a
//! seed phrase, a recurring auto-miner with an on-demand pack-mine path,
//! and a faucet that funds addresses in either address space. EVM-space
//! funding is routed through the native-space bridge contract.
//!
//! The seed phrase and derived private keys never appear in logs, error
//! context, or serialized status output; the redacted configuration view
//! is structural, not filtered.

pub mod account;
pub mod chain;
pub mod config;
pub mod error;
pub mod node;
pub mod utils;

pub use account::AccountInfo;
pub use chain::local::LocalNode;
pub use chain::{ChainClient, GenesisAccount, GenesisConfig, NodeRuntime, TxId};
pub use config::{DevnetConfig, MiningAuthor, RedactedConfig};
pub use error::{AddressSpace, DevnetError, Result};
pub use node::faucet::{DualFunding, Faucet, FaucetBalances};
pub use node::miner::{MiningCoordinator, MiningStatus};
pub use node::{Devnet, LocalDevnet, NodeStatusReport, ServerStatus};
