//! devnet: run a local development network from the command line
//!
//! Starts the simulated dual-space node, prints the derived accounts and
//! the redacted configuration, then runs until a termination signal.
//!
//! Usage:
//!   devnet [--config <path>] [--accounts <n>] [--interval-ms <ms>]
//!          [--data-dir <dir>] [--mnemonic <phrase>]

use anyhow::Context;
use clap::Parser;
use devnet_node::utils::{self, init_logging};
use devnet_node::{DevnetConfig, LocalDevnet};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "devnet", about = "Local development network manager")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of genesis accounts to derive
    #[arg(long)]
    accounts: Option<u32>,

    /// Recurring mining interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Node data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seed phrase to derive accounts from (a fresh one is generated
    /// when neither this flag nor the config file provides one)
    #[arg(long)]
    mnemonic: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DevnetConfig> {
        let mut config = match &self.config {
            Some(path) => DevnetConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => DevnetConfig::default(),
        };
        if let Some(accounts) = self.accounts {
            config.accounts_count = accounts;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.mining_interval_ms = interval_ms;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(mnemonic) = self.mnemonic {
            config.mnemonic = mnemonic;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(None);

    let config = Args::parse().into_config()?;
    let devnet = LocalDevnet::local(config)?;

    devnet.start().await.context("starting devnet server")?;
    info!(started_at = utils::current_timestamp(), "devnet is up");

    print_banner(&devnet);

    let mut shutdown = utils::create_shutdown_receiver();
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }

    devnet.stop().await.context("stopping devnet server")?;
    Ok(())
}

/// Print accounts and configuration for the developer
///
/// The seed phrase is printed here, and only here, so a fresh devnet's
/// generated accounts can be recovered. It never reaches the logs.
fn print_banner(devnet: &LocalDevnet) {
    let config = devnet.config();
    println!();
    println!("Development network");
    println!(
        "  native space: chain id {}, http :{}, ws :{}",
        config.native_chain_id, config.native_http_port, config.native_ws_port
    );
    println!(
        "  evm space:    chain id {}, http :{}, ws :{}",
        config.evm_chain_id, config.evm_http_port, config.evm_ws_port
    );
    println!();
    println!("Seed phrase: {}", devnet.mnemonic());
    println!();
    println!("Accounts ({} coins each):", config.initial_balance);
    for account in devnet.accounts() {
        println!("  [{}] {}", account.index, account.native_address);
        println!("      {}", account.evm_address);
    }
    let faucet = devnet.faucet_account();
    println!();
    println!("Faucet: {}", faucet.native_address);
    println!();
}
