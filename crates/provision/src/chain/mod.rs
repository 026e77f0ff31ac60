//! Chain client capability used by the provisioning stages.
//!
//! The stages only depend on the [`ChainClient`] trait; [`JsonRpcChainClient`]
//! is the implementation that talks to an Ethereum node over HTTP JSON-RPC.

mod rpc;
mod tx;

use std::{fmt, future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;

pub use rpc::{JsonRpcChainClient, RpcClientConfig, json_rpc_call, wait_until_ready};
pub use tx::{SignerRegistry, sign_legacy};

/// A keypair created in-process.
#[derive(Clone)]
pub struct LocalAccount {
    pub address: Address,
    pub signer: PrivateKeySigner,
}

impl LocalAccount {
    /// Generate a fresh secp256k1 keypair.
    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Build an account from a raw 32-byte private key.
    pub fn from_private_key(secret: &[u8]) -> anyhow::Result<Self> {
        let signer = PrivateKeySigner::from_slice(secret).context("Invalid secp256k1 private key")?;
        Ok(Self::from_signer(signer))
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }

    /// Raw private key bytes.
    pub fn private_key(&self) -> [u8; 32] {
        self.signer.to_bytes().0
    }
}

impl fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// A state-changing transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl TransactionRequest {
    /// A plain value transfer.
    pub fn transfer(from: Address, to: Address, value: U256) -> Self {
        Self {
            from,
            to,
            value,
            data: Bytes::new(),
        }
    }

    /// A contract method invocation without value.
    pub fn call(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// `false` when the transaction was mined but reverted.
    pub status: bool,
}

impl TransactionReceipt {
    /// Turn a reverted receipt into an error.
    pub fn ensure_success(self) -> anyhow::Result<Self> {
        if !self.status {
            anyhow::bail!("Transaction {} reverted", self.transaction_hash);
        }
        Ok(self)
    }
}

/// Capabilities the provisioning pipeline needs from a blockchain client.
///
/// All operations are request/response; the pipeline awaits each one before
/// issuing the next.
pub trait ChainClient: Send + Sync {
    /// Create a new keypair.
    fn create_account(&self) -> impl Future<Output = anyhow::Result<LocalAccount>> + Send;

    /// Encrypt `account`'s private key to a keyfile document under `password`.
    fn encrypt_keyfile(
        &self,
        account: &LocalAccount,
        password: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Make `account` available to the in-process signer.
    fn register_signer(&self, account: &LocalAccount) -> anyhow::Result<()>;

    /// Unlock a node-held account for `duration`.
    fn unlock_account(
        &self,
        address: Address,
        password: &str,
        duration: Duration,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Current balance of `address` in wei.
    fn balance(&self, address: Address) -> impl Future<Output = anyhow::Result<U256>> + Send;

    /// Read-only contract call.
    fn call(&self, to: Address, data: Bytes)
    -> impl Future<Output = anyhow::Result<Bytes>> + Send;

    /// Submit a transaction and wait until it is mined.
    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = anyhow::Result<TransactionReceipt>> + Send;
}
