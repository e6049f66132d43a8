//! Faucet funding for both address spaces
//!
//! The faucet account's balance lives exclusively in the native space.
//! Native-space targets receive a direct transfer; EVM-space targets are
//! credited through the bridge contract, which is the only way value moves
//! between the spaces. Address-space validation happens before any network
//! call, and nothing here retries: retry policy belongs to the caller.

use crate::account::{self, AccountInfo};
use crate::chain::{bridge_address, bridge_transfer_calldata, ChainClient, TxId};
use crate::error::{AddressSpace, DevnetError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Result of a dual-space funding call
#[derive(Debug, Clone, Serialize)]
pub struct DualFunding {
    pub native_address: String,
    pub native_tx: TxId,
    pub evm_address: String,
    pub evm_tx: TxId,
}

/// Faucet balances in both spaces
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FaucetBalances {
    pub native: u128,
    pub evm: u128,
}

/// Sends value from a funded source account to either address space
pub struct Faucet<C: ChainClient> {
    source: AccountInfo,
    client: Arc<C>,
    native_chain_id: u32,
}

impl<C: ChainClient> Faucet<C> {
    pub fn new(source: AccountInfo, client: Arc<C>, native_chain_id: u32) -> Self {
        Self {
            source,
            client,
            native_chain_id,
        }
    }

    /// The funding source account
    pub fn account(&self) -> &AccountInfo {
        &self.source
    }

    /// Send a direct native-space transfer
    pub async fn fund_native(&self, target: &str, amount: u128) -> Result<TxId> {
        account::parse_native_address(target)?;
        let tx = self
            .client
            .send_native_transfer(&self.source.native_private_key, target, amount, &[])
            .await
            .map_err(|e| self.wrap(AddressSpace::Native, target, amount, e))?;
        info!(%target, amount, tx = %tx, "funded native account");
        Ok(tx)
    }

    /// Credit an EVM-space target through the bridge contract
    pub async fn fund_evm(&self, target: &str, amount: u128) -> Result<TxId> {
        let target_id = account::parse_evm_address(target)?;
        let bridge = bridge_address(self.native_chain_id);
        let calldata = bridge_transfer_calldata(&target_id);
        let tx = self
            .client
            .send_native_transfer(
                &self.source.native_private_key,
                &bridge,
                amount,
                &calldata,
            )
            .await
            .map_err(|e| self.wrap(AddressSpace::Evm, target, amount, e))?;
        info!(%target, amount, tx = %tx, "funded evm account via bridge");
        Ok(tx)
    }

    /// Fund both addresses derived from one private key, concurrently
    pub async fn fund_dual(
        &self,
        private_key: &str,
        native_amount: u128,
        evm_amount: u128,
    ) -> Result<DualFunding> {
        let target = account::account_from_private_key(private_key, 0, self.native_chain_id)?;
        let (native_tx, evm_tx) = tokio::join!(
            self.fund_native(&target.native_address, native_amount),
            self.fund_evm(&target.evm_address, evm_amount),
        );
        Ok(DualFunding {
            native_address: target.native_address,
            native_tx: native_tx?,
            evm_address: target.evm_address,
            evm_tx: evm_tx?,
        })
    }

    /// Current faucet balances in both spaces
    pub async fn balances(&self) -> Result<FaucetBalances> {
        let (native, evm) = tokio::join!(
            self.client.native_balance(&self.source.native_address),
            self.client.evm_balance(&self.source.evm_address),
        );
        Ok(FaucetBalances {
            native: native.map_err(|e| {
                self.wrap(AddressSpace::Native, &self.source.native_address, 0, e)
            })?,
            evm: evm
                .map_err(|e| self.wrap(AddressSpace::Evm, &self.source.evm_address, 0, e))?,
        })
    }

    fn wrap(
        &self,
        space: AddressSpace,
        target: &str,
        amount: u128,
        cause: anyhow::Error,
    ) -> DevnetError {
        DevnetError::FaucetFailure {
            space,
            target: target.to_string(),
            amount,
            from: self.source.native_address.clone(),
            source: cause.into(),
        }
    }
}
