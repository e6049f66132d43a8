//! Typed errors for devnet lifecycle, mining, and faucet operations
//!
//! Every error carries a machine-readable kind and, where relevant, the
//! address space it applies to. Secrets (seed phrase, private keys) are
//! never placed in error context.

use crate::config::RedactedConfig;
use serde::Serialize;
use std::fmt;

/// Boxed underlying cause for wrapped failures
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The two address spaces of the chain runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSpace {
    /// Primary account space of the chain
    Native,
    /// Ethereum-ABI-compatible execution environment
    Evm,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Native => write!(f, "native"),
            AddressSpace::Evm => write!(f, "evm"),
        }
    }
}

/// Errors raised by the devnet core
#[derive(Debug, thiserror::Error)]
pub enum DevnetError {
    /// start() called while the server is already running
    #[error("devnet server is already running")]
    ServerAlreadyRunning,

    /// Operation requires a running server
    #[error("devnet server is not running")]
    ServerNotRunning,

    /// Startup failed; carries a redacted copy of the configuration
    #[error("failed to start devnet server (config: {config:?}): {source}")]
    ServerStartFailure {
        config: RedactedConfig,
        #[source]
        source: Cause,
    },

    /// Shutdown of the node runtime failed
    #[error("failed to stop devnet server: {source}")]
    ServerStopFailure {
        #[source]
        source: Cause,
    },

    /// start_mining() called while the mining loop is already running
    #[error("mining is already running")]
    MiningAlreadyRunning,

    /// stop_mining() called while the mining loop is not running
    #[error("mining is not running")]
    MiningNotRunning,

    /// Requested interval is below the floor that the node can sustain
    #[error("invalid mining interval {requested_ms}ms (minimum {floor_ms}ms)")]
    InvalidMiningInterval { requested_ms: u64, floor_ms: u64 },

    /// A block-production control call failed
    #[error("mining operation '{operation}' failed: {source}")]
    MiningFailure {
        operation: &'static str,
        #[source]
        source: Cause,
    },

    /// A faucet transfer failed
    #[error("faucet transfer of {amount} to {target} ({space} space) from {from} failed: {source}")]
    FaucetFailure {
        space: AddressSpace,
        target: String,
        amount: u128,
        /// Source account address (never a key)
        from: String,
        #[source]
        source: Cause,
    },

    /// Address does not belong to the expected address space
    #[error("invalid {space} address: {address}")]
    InvalidAddress {
        space: AddressSpace,
        address: String,
    },

    /// Seed phrase failed validation
    #[error("invalid mnemonic: {reason}")]
    InvalidMnemonic { reason: String },

    /// Configuration value is out of range or inconsistent
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Operation intentionally unsupported by the current node runtime
    #[error("operation '{operation}' is not implemented by the node runtime")]
    NotImplemented { operation: &'static str },
}

impl DevnetError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DevnetError::ServerAlreadyRunning => "server_already_running",
            DevnetError::ServerNotRunning => "server_not_running",
            DevnetError::ServerStartFailure { .. } => "server_start_failure",
            DevnetError::ServerStopFailure { .. } => "server_stop_failure",
            DevnetError::MiningAlreadyRunning => "mining_already_running",
            DevnetError::MiningNotRunning => "mining_not_running",
            DevnetError::InvalidMiningInterval { .. } => "invalid_mining_interval",
            DevnetError::MiningFailure { .. } => "mining_failure",
            DevnetError::FaucetFailure { .. } => "faucet_failure",
            DevnetError::InvalidAddress { .. } => "invalid_address",
            DevnetError::InvalidMnemonic { .. } => "invalid_mnemonic",
            DevnetError::InvalidConfig { .. } => "invalid_config",
            DevnetError::NotImplemented { .. } => "not_implemented",
        }
    }

    /// Address space the error applies to, if any
    pub fn space(&self) -> Option<AddressSpace> {
        match self {
            DevnetError::FaucetFailure { space, .. } => Some(*space),
            DevnetError::InvalidAddress { space, .. } => Some(*space),
            _ => None,
        }
    }
}

/// Result type for devnet operations
pub type Result<T> = std::result::Result<T, DevnetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DevnetError::ServerAlreadyRunning.kind(),
            "server_already_running"
        );
        assert_eq!(DevnetError::MiningNotRunning.kind(), "mining_not_running");
        assert_eq!(
            DevnetError::InvalidMiningInterval {
                requested_ms: 50,
                floor_ms: 100
            }
            .kind(),
            "invalid_mining_interval"
        );
        assert_eq!(
            DevnetError::NotImplemented { operation: "trace" }.kind(),
            "not_implemented"
        );
    }

    #[test]
    fn test_space_tag() {
        let err = DevnetError::InvalidAddress {
            space: AddressSpace::Evm,
            address: "net1abc".to_string(),
        };
        assert_eq!(err.space(), Some(AddressSpace::Evm));
        assert_eq!(DevnetError::ServerNotRunning.space(), None);
    }

    #[test]
    fn test_display_contains_context() {
        let err = DevnetError::InvalidMiningInterval {
            requested_ms: 50,
            floor_ms: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("50ms"));
        assert!(msg.contains("100ms"));
    }

    #[test]
    fn test_address_space_display() {
        assert_eq!(AddressSpace::Native.to_string(), "native");
        assert_eq!(AddressSpace::Evm.to_string(), "evm");
    }
}
