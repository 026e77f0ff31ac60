use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::{Address, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    account::ClientRole,
    chain::RpcClientConfig,
    error::{ProvisionError, Result},
    units,
};

/// Default libp2p port of the keep client.
pub const DEFAULT_NETWORK_PORT: u16 = 3919;

/// Chain node endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// Scheme and host of the node, e.g. `http://eth-tx-node`.
    pub host: String,
    pub rpc_port: u16,
    pub ws_port: u16,
    /// Network id used to look up contract addresses in the artifacts.
    pub network_id: String,
}

impl EthereumConfig {
    fn endpoint(&self, port: u16) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.host)
            .with_context(|| format!("Invalid ethereum host '{}'", self.host))?;
        url.set_port(Some(port))
            .map_err(|_| anyhow::anyhow!("Ethereum host '{}' cannot carry a port", self.host))?;
        Ok(url)
    }

    /// HTTP JSON-RPC endpoint.
    pub fn rpc_url(&self) -> anyhow::Result<Url> {
        self.endpoint(self.rpc_port)
    }

    /// WebSocket endpoint: the host with `http` swapped for `ws`.
    pub fn ws_url(&self) -> anyhow::Result<Url> {
        let mut url = self.endpoint(self.ws_port)?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => anyhow::bail!("Unsupported ethereum host scheme '{}'", other),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Failed to switch '{}' to {}", self.host, scheme))?;
        Ok(url)
    }
}

impl Default for EthereumConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".to_string(),
            rpc_port: 8545,
            ws_port: 8546,
            network_id: "1101".to_string(),
        }
    }
}

/// An account held by the node together with its unlock password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub address: Address,
    pub password: String,
}

/// Operator account settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Pre-existing operator account. Required for the bootstrap role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Unlocks the existing account, or encrypts the generated keyfile.
    pub password: String,
}

/// Filesystem locations read and written by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `<ContractName>.json` deployment artifacts.
    pub artifacts_dir: PathBuf,
    /// Client config template.
    pub template: PathBuf,
    /// Where the encrypted operator keyfile is written.
    pub keyfile: PathBuf,
    /// Where the rendered client config is written.
    pub client_config: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("/tmp"),
            template: PathBuf::from("/tmp/keep-client-config-template.toml"),
            keyfile: PathBuf::from("/mnt/keep-client/config/eth_account_keyfile"),
            client_config: PathBuf::from("/mnt/keep-client/config/keep-client-config.toml"),
        }
    }
}

/// Client networking and storage settings copied into the rendered config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientNetworkConfig {
    pub port: u16,
    #[serde(default)]
    pub peers: Vec<String>,
    pub data_dir: PathBuf,
}

impl Default for ClientNetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_NETWORK_PORT,
            peers: Vec::new(),
            data_dir: PathBuf::from("/mnt/keep-client/data"),
        }
    }
}

/// Amounts moved during funding and staking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountsConfig {
    /// Ether sent to the operator, as a decimal string.
    pub funding_ether: String,
    /// Whole tokens staked on the operator.
    pub stake_tokens: u64,
    /// Decimals declared by the token contract.
    pub token_decimals: u8,
}

impl Default for AmountsConfig {
    fn default() -> Self {
        Self {
            funding_ether: "1".to_string(),
            stake_tokens: 1_000_000,
            token_decimals: 18,
        }
    }
}

/// Transaction submission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub unlock_duration_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub gas_limit: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            unlock_duration_secs: 150_000,
            confirmation_timeout_secs: 480,
            gas_limit: 4_712_388,
        }
    }
}

/// Everything one provisioning run needs.
///
/// Built once at startup and only read afterwards. Can be serialized to and
/// from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    pub role: ClientRole,
    /// Receiver of staking rewards. Defaults to the contract owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Address>,
    /// Account funding the operator. Defaults to the contract owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purse: Option<Address>,
    pub ethereum: EthereumConfig,
    pub operator: OperatorConfig,
    /// Account the contracts were migrated with; sends the stake.
    pub contract_owner: AccountCredentials,
    /// Account allowed to authorize operator contracts. Defaults to the contract owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer: Option<AccountCredentials>,
    pub paths: PathsConfig,
    pub network: ClientNetworkConfig,
    pub amounts: AmountsConfig,
    pub transactions: TransactionConfig,
}

impl ProvisionConfig {
    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.role.uses_existing_account() && self.operator.address.is_none() {
            return Err(ProvisionError::Config(format!(
                "role {} requires an existing operator account address",
                self.role
            )));
        }

        self.ethereum
            .rpc_url()
            .and_then(|_| self.ethereum.ws_url())
            .map_err(|e| ProvisionError::Config(format!("{:#}", e)))?;

        self.funding_amount()?;
        self.stake_amount()?;

        Ok(())
    }

    pub fn authorizer(&self) -> &AccountCredentials {
        self.authorizer.as_ref().unwrap_or(&self.contract_owner)
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary.unwrap_or(self.contract_owner.address)
    }

    pub fn purse(&self) -> Address {
        self.purse.unwrap_or(self.contract_owner.address)
    }

    /// Funding transfer in wei.
    pub fn funding_amount(&self) -> Result<U256> {
        units::ether_to_wei(&self.amounts.funding_ether)
            .map_err(|e| ProvisionError::Config(format!("{:#}", e)))
    }

    /// Stake in the token's smallest unit.
    pub fn stake_amount(&self) -> Result<U256> {
        units::format_amount(self.amounts.stake_tokens, self.amounts.token_decimals)
            .map_err(|e| ProvisionError::Config(format!("{:#}", e)))
    }

    pub fn unlock_duration(&self) -> Duration {
        Duration::from_secs(self.transactions.unlock_duration_secs)
    }

    /// Settings for the JSON-RPC chain client.
    pub fn rpc_client_config(&self) -> Result<RpcClientConfig> {
        let url = self
            .ethereum
            .rpc_url()
            .map_err(|e| ProvisionError::Config(format!("{:#}", e)))?;

        Ok(RpcClientConfig {
            gas_limit: self.transactions.gas_limit,
            confirmation_timeout: Duration::from_secs(self.transactions.confirmation_timeout_secs),
            ..RpcClientConfig::new(url)
        })
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize provisioning config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}

/// Render a URL without the trailing slash `url` adds to an empty path.
pub fn display_url(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn ethereum(host: &str) -> EthereumConfig {
        EthereumConfig {
            host: host.to_string(),
            rpc_port: 8545,
            ws_port: 8546,
            network_id: "1101".to_string(),
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let eth = ethereum("http://eth-tx-node.default.svc.cluster.local");

        assert_eq!(
            display_url(&eth.rpc_url().unwrap()),
            "http://eth-tx-node.default.svc.cluster.local:8545"
        );
        assert_eq!(
            display_url(&eth.ws_url().unwrap()),
            "ws://eth-tx-node.default.svc.cluster.local:8546"
        );
    }

    #[test]
    fn test_secure_ws_url() {
        assert_eq!(
            display_url(&ethereum("https://node.example").ws_url().unwrap()),
            "wss://node.example:8546"
        );
    }

    #[test]
    fn test_bootstrap_requires_operator_address() {
        let config = ProvisionConfig {
            role: ClientRole::Bootstrap,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let config = ProvisionConfig {
            ethereum: ethereum("not a url"),
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));
    }

    #[test]
    fn test_defaults_follow_contract_owner() {
        let owner: Address = "0x0000000000000000000000000000000000000abc".parse().unwrap();
        let config = ProvisionConfig {
            contract_owner: AccountCredentials {
                address: owner,
                password: "secret".to_string(),
            },
            ..Default::default()
        };

        assert_eq!(config.beneficiary(), owner);
        assert_eq!(config.purse(), owner);
        assert_eq!(config.authorizer().address, owner);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new("keep-provision-test").unwrap();
        let path = temp_dir.path().join("provision.toml");

        let original = ProvisionConfig {
            role: ClientRole::RelayRequester,
            network: ClientNetworkConfig {
                peers: vec!["/ip4/10.0.0.1/tcp/3919/ipfs/16Uiu2".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        original.save_to_file(&path).unwrap();
        let loaded = ProvisionConfig::load_from_file(&path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("keep-provision-test").unwrap();

        assert!(ProvisionConfig::load_from_file(&temp_dir.path().join("missing.toml")).is_err());
    }
}
