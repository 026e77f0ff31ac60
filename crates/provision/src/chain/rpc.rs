//! HTTP JSON-RPC implementation of [`ChainClient`].

use std::time::Duration;

use alloy_consensus::TxLegacy;
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{
    ChainClient, LocalAccount, SignerRegistry, TransactionReceipt, TransactionRequest, sign_legacy,
};
use crate::{keystore, units::to_hex_quantity};

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Settings for [`JsonRpcChainClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcClientConfig {
    /// HTTP endpoint of the node.
    pub url: Url,
    /// Gas limit attached to every transaction.
    pub gas_limit: u64,
    /// How long to wait for a transaction to be mined.
    pub confirmation_timeout: Duration,
    /// Interval between receipt polls.
    pub poll_interval: Duration,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            gas_limit: 4_712_388,
            confirmation_timeout: Duration::from_secs(480),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error in {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {} response", method))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value or `timeout` elapses.
///
/// `Ok(None)` and `Err(_)` both mean "not yet"; the last error is reported on timeout.
pub async fn wait_until_ready<T, F, Fut>(
    name: &str,
    timeout: Duration,
    poll_interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let mut last_error = None;

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                tracing::trace!(name, "Not ready yet, retrying...");
            }
            Err(e) => {
                tracing::trace!(error = %e, name, "Readiness check failed, retrying...");
                last_error = Some(e);
            }
        }

        if start.elapsed() >= timeout {
            let timeout_error = anyhow::anyhow!("Timeout waiting for {} after {:?}", name, timeout);
            return Err(match last_error {
                Some(e) => e.context(timeout_error),
                None => timeout_error,
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    /// Absent on pre-Byzantium chains, where success cannot be told apart.
    status: Option<U256>,
}

/// Chain client backed by an Ethereum node's JSON-RPC endpoint.
#[derive(Debug)]
pub struct JsonRpcChainClient {
    client: reqwest::Client,
    config: RpcClientConfig,
    signers: SignerRegistry,
}

impl JsonRpcChainClient {
    pub fn new(config: RpcClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            signers: SignerRegistry::default(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> anyhow::Result<T> {
        json_rpc_call(&self.client, self.config.url.as_str(), method, params).await
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> anyhow::Result<U256> {
        self.request::<U256>(method, params).await
    }

    async fn submit_signed(
        &self,
        signer: &PrivateKeySigner,
        request: &TransactionRequest,
    ) -> anyhow::Result<B256> {
        let nonce = self
            .quantity(
                "eth_getTransactionCount",
                vec![serde_json::json!(request.from), serde_json::json!("pending")],
            )
            .await?;
        let gas_price = self.quantity("eth_gasPrice", vec![]).await?;
        let chain_id = self.quantity("eth_chainId", vec![]).await?;

        let tx = TxLegacy {
            chain_id: Some(chain_id.try_into().context("Chain id does not fit in u64")?),
            nonce: nonce.try_into().context("Nonce does not fit in u64")?,
            gas_price: gas_price.try_into().context("Gas price does not fit in u128")?,
            gas_limit: self.config.gas_limit,
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.data.clone(),
        };

        let raw = sign_legacy(signer, tx)?;

        self.request(
            "eth_sendRawTransaction",
            vec![serde_json::json!(format!("0x{}", hex::encode(raw)))],
        )
        .await
    }

    async fn submit_unsigned(&self, request: &TransactionRequest) -> anyhow::Result<B256> {
        self.request(
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": request.from,
                "to": request.to,
                "value": to_hex_quantity(request.value),
                "data": request.data,
                "gas": format!("0x{:x}", self.config.gas_limit),
            })],
        )
        .await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> anyhow::Result<TransactionReceipt> {
        let client = self;
        let receipt: RpcReceipt = wait_until_ready(
            &format!("receipt of {}", tx_hash),
            self.config.confirmation_timeout,
            self.config.poll_interval,
            move || async move {
                client
                    .request::<Option<RpcReceipt>>(
                        "eth_getTransactionReceipt",
                        vec![serde_json::json!(tx_hash)],
                    )
                    .await
            },
        )
        .await?;

        Ok(TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            status: receipt.status.is_none_or(|status| status == U256::from(1u64)),
        })
    }
}

impl ChainClient for JsonRpcChainClient {
    async fn create_account(&self) -> anyhow::Result<LocalAccount> {
        Ok(LocalAccount::random())
    }

    async fn encrypt_keyfile(&self, account: &LocalAccount, password: &str) -> anyhow::Result<String> {
        let account = account.clone();
        let password = password.to_string();

        // scrypt is CPU-bound.
        let keyfile = tokio::task::spawn_blocking(move || keystore::encrypt_keyfile(&account, &password))
            .await
            .context("Keyfile encryption task panicked")??;

        serde_json::to_string(&keyfile).context("Failed to serialize keyfile")
    }

    fn register_signer(&self, account: &LocalAccount) -> anyhow::Result<()> {
        self.signers.add(account);
        tracing::debug!(address = %account.address, "Registered local signer");
        Ok(())
    }

    async fn unlock_account(
        &self,
        address: Address,
        password: &str,
        duration: Duration,
    ) -> anyhow::Result<()> {
        let unlocked: bool = self
            .request(
                "personal_unlockAccount",
                vec![
                    serde_json::json!(address),
                    serde_json::json!(password),
                    serde_json::json!(duration.as_secs()),
                ],
            )
            .await?;

        if !unlocked {
            anyhow::bail!("Node refused to unlock {}", address);
        }
        Ok(())
    }

    async fn balance(&self, address: Address) -> anyhow::Result<U256> {
        self.quantity(
            "eth_getBalance",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        self.request(
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": data }),
                serde_json::json!("latest"),
            ],
        )
        .await
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> anyhow::Result<TransactionReceipt> {
        let tx_hash = match self.signers.get(&request.from) {
            Some(signer) => self.submit_signed(&signer, &request).await?,
            None => self.submit_unsigned(&request).await?,
        };

        tracing::debug!(%tx_hash, from = %request.from, to = %request.to, "Transaction sent, waiting for receipt");

        self.wait_for_receipt(tx_hash).await
    }
}
