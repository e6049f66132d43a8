//! External collaborator interfaces
//!
//! The embedded node runtime and the transaction-signing client are
//! external to this crate; they are consumed through the traits below.
//! `local` provides an in-process simulated implementation for development
//! and tests.

pub mod local;

use crate::account;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Transaction identifier returned by the signing/broadcast client
pub type TxId = String;

/// Number of underlying blocks a single pack-pending cycle produces
///
/// The node runtime batches this many blocks per expensive flush call so
/// that deferred execution in both address spaces completes.
pub const PACK_BATCH_BLOCKS: u64 = 5;

/// Account id of the bridge contract on the native space
///
/// Fixed by the chain runtime; a value transfer to this address carrying
/// bridge calldata credits the encoded EVM-space target.
pub const BRIDGE_CONTRACT_ID: [u8; 20] = [
    0x08, 0x88, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x06,
];

/// Native-space address of the bridge contract
pub fn bridge_address(native_chain_id: u32) -> String {
    account::encode_native_address(&BRIDGE_CONTRACT_ID, native_chain_id)
}

/// Encode the bridge instruction that credits `evm_target`
///
/// ABI layout: 4-byte selector of `transferToEvm(address)` followed by the
/// target left-padded to 32 bytes.
pub fn bridge_transfer_calldata(evm_target: &[u8; 20]) -> Vec<u8> {
    use sha3::{Digest, Keccak256};
    let selector = Keccak256::digest(b"transferToEvm(address)");
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector[..4]);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(evm_target);
    data
}

/// Decode a bridge instruction back into the EVM-space target, if valid
pub fn decode_bridge_calldata(data: &[u8]) -> Option<[u8; 20]> {
    use sha3::{Digest, Keccak256};
    if data.len() != 36 {
        return None;
    }
    let selector = Keccak256::digest(b"transferToEvm(address)");
    if data[..4] != selector[..4] || data[4..16] != [0u8; 12] {
        return None;
    }
    let mut target = [0u8; 20];
    target.copy_from_slice(&data[16..]);
    Some(target)
}

/// A genesis-funded account, addressed in both spaces
#[derive(Debug, Clone, Serialize)]
pub struct GenesisAccount {
    pub native_address: String,
    pub evm_address: String,
    /// Initial balance in base units, credited in both spaces
    pub balance: u128,
}

/// Launch configuration handed to the node runtime
#[derive(Debug, Clone, Serialize)]
pub struct GenesisConfig {
    pub native_chain_id: u32,
    pub evm_chain_id: u32,
    pub native_http_port: u16,
    pub native_ws_port: u16,
    pub evm_http_port: u16,
    pub evm_ws_port: u16,
    pub data_dir: PathBuf,
    /// Whether every produced block also packs pending transactions
    pub auto_pack: bool,
    /// Resolved mining author (native-space address)
    pub mining_author: String,
    pub accounts: Vec<GenesisAccount>,
}

/// Control surface of the embedded node runtime
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Launch the node with the given genesis configuration
    async fn launch(&self, genesis: &GenesisConfig) -> anyhow::Result<()>;

    /// Stop the node and release its resources
    async fn shutdown(&self) -> anyhow::Result<()>;

    /// Produce `count` blocks (lightweight path; may pack pending
    /// transactions for one address space, never both)
    async fn produce_blocks(&self, count: u64) -> anyhow::Result<()>;

    /// Produce blocks until pending transactions in both address spaces
    /// are included (expensive; `PACK_BATCH_BLOCKS` underlying blocks)
    async fn pack_pending_transactions(&self) -> anyhow::Result<()>;
}

/// Transaction signing and broadcast client
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Construct, sign, and submit a native-space value transfer
    ///
    /// `data` carries contract calldata; empty for plain transfers. The
    /// EVM space has no direct submission path here: value reaches it
    /// only through the bridge contract.
    async fn send_native_transfer(
        &self,
        from_private_key: &str,
        to: &str,
        amount: u128,
        data: &[u8],
    ) -> anyhow::Result<TxId>;

    /// Native-space balance of an address
    async fn native_balance(&self, address: &str) -> anyhow::Result<u128>;

    /// EVM-space balance of an address
    async fn evm_balance(&self, address: &str) -> anyhow::Result<u128>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_calldata_roundtrip() {
        let target = [0xabu8; 20];
        let data = bridge_transfer_calldata(&target);
        assert_eq!(data.len(), 36);
        assert_eq!(decode_bridge_calldata(&data), Some(target));
    }

    #[test]
    fn test_bridge_calldata_rejects_garbage() {
        assert_eq!(decode_bridge_calldata(&[]), None);
        assert_eq!(decode_bridge_calldata(&[0u8; 36]), None);
        let mut data = bridge_transfer_calldata(&[1u8; 20]);
        data[5] = 0xff; // non-zero padding
        assert_eq!(decode_bridge_calldata(&data), None);
    }

    #[test]
    fn test_bridge_address_is_parseable() {
        let address = bridge_address(2029);
        assert_eq!(
            crate::account::parse_native_address(&address).unwrap(),
            BRIDGE_CONTRACT_ID
        );
    }
}
