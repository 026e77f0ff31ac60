use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use keep_provision::{
    ClientRole, ProvisionConfig,
    config::{
        AccountCredentials, AmountsConfig, ClientNetworkConfig, DEFAULT_NETWORK_PORT,
        EthereumConfig, OperatorConfig, PathsConfig, TransactionConfig,
    },
};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "provision-keep-client")]
#[command(
    author,
    version,
    about = "Fund, stake and configure a keep client operator account"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "KEEP_PROVISION_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a provisioning configuration file to load.
    ///
    /// When provided, every other provisioning option is ignored.
    #[arg(long, alias = "conf", env = "KEEP_PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write the effective provisioning configuration to this file before running.
    #[arg(long, env = "KEEP_PROVISION_SAVE_CONFIG")]
    pub save_config: Option<PathBuf>,

    #[clap(flatten)]
    pub ethereum: EthereumArgs,

    #[clap(flatten)]
    pub accounts: AccountArgs,

    #[clap(flatten)]
    pub client: ClientArgs,
}

/// Chain node endpoint.
#[derive(Debug, Clone, Parser)]
pub struct EthereumArgs {
    /// Scheme and host of the ethereum node.
    #[arg(long, env = "ETH_HOSTNAME", default_value = "http://localhost")]
    pub eth_hostname: String,

    /// HTTP JSON-RPC port of the ethereum node.
    #[arg(long, env = "ETH_RPC_PORT", default_value_t = 8545)]
    pub eth_rpc_port: u16,

    /// WebSocket port of the ethereum node.
    #[arg(long, env = "ETH_WS_PORT", default_value_t = 8546)]
    pub eth_ws_port: u16,

    /// Network id the contracts were migrated to.
    #[arg(long, env = "ETH_NETWORK_ID", default_value = "1101")]
    pub eth_network_id: String,
}

/// Accounts taking part in provisioning.
#[derive(Debug, Clone, Parser)]
pub struct AccountArgs {
    /// Role of the provisioned client.
    #[arg(long, env = "KEEP_CLIENT_TYPE", default_value_t = ClientRole::Standard)]
    pub client_type: ClientRole,

    /// Existing operator account. Required for the bootstrap role.
    #[arg(long, env = "KEEP_CLIENT_ETH_ACCOUNT")]
    pub operator_address: Option<Address>,

    /// Unlocks the existing operator account or encrypts the generated keyfile.
    #[arg(long, env = "KEEP_CLIENT_ETH_ACCOUNT_PASSWORD", default_value = "")]
    pub operator_password: String,

    /// Account the contracts were migrated with.
    #[arg(long, env = "CONTRACT_OWNER_ETH_ACCOUNT_ADDRESS", required_unless_present = "config")]
    pub contract_owner_address: Option<Address>,

    #[arg(long, env = "CONTRACT_OWNER_ETH_ACCOUNT_PASSWORD", default_value = "")]
    pub contract_owner_password: String,

    /// Account authorizing the operator. Defaults to the contract owner.
    #[arg(long, env = "KEEP_AUTHORIZER_ETH_ACCOUNT_ADDRESS", requires = "authorizer_password")]
    pub authorizer_address: Option<Address>,

    #[arg(long, env = "KEEP_AUTHORIZER_ETH_ACCOUNT_PASSWORD")]
    pub authorizer_password: Option<String>,

    /// Receiver of staking rewards. Defaults to the contract owner.
    #[arg(long, alias = "magpie", env = "KEEP_BENEFICIARY_ETH_ACCOUNT_ADDRESS")]
    pub beneficiary_address: Option<Address>,

    /// Account funding the operator. Defaults to the contract owner.
    #[arg(long, env = "KEEP_PURSE_ETH_ACCOUNT_ADDRESS")]
    pub purse_address: Option<Address>,

    /// Ether sent to an operator holding less than that.
    #[arg(long, env = "KEEP_FUNDING_ETHER", default_value = "1")]
    pub funding_ether: String,

    /// Whole tokens staked on the operator.
    #[arg(long, env = "KEEP_STAKE_TOKENS", default_value_t = 1_000_000)]
    pub stake_tokens: u64,

    /// Decimals declared by the token contract.
    #[arg(long, env = "KEEP_TOKEN_DECIMALS", default_value_t = 18)]
    pub token_decimals: u8,

    /// Seconds node-held accounts stay unlocked.
    #[arg(long, env = "KEEP_UNLOCK_DURATION", default_value_t = 150_000)]
    pub unlock_duration: u64,

    /// Seconds to wait for a transaction to be mined.
    #[arg(long, env = "KEEP_CONFIRMATION_TIMEOUT", default_value_t = 480)]
    pub confirmation_timeout: u64,

    #[arg(long, env = "KEEP_GAS_LIMIT", default_value_t = 4_712_388)]
    pub gas_limit: u64,
}

/// Keep client files and networking.
#[derive(Debug, Clone, Parser)]
pub struct ClientArgs {
    /// Directory holding the contract deployment artifacts.
    #[arg(long, env = "KEEP_ARTIFACTS_DIR", default_value = "/tmp")]
    pub artifacts_dir: PathBuf,

    /// Client config template.
    #[arg(long, env = "KEEP_CLIENT_CONFIG_TEMPLATE", default_value = "/tmp/keep-client-config-template.toml")]
    pub template: PathBuf,

    /// Where the operator keyfile is written.
    #[arg(long, env = "KEEP_CLIENT_ETH_KEYFILE", default_value = "/mnt/keep-client/config/eth_account_keyfile")]
    pub keyfile: PathBuf,

    /// Where the rendered client config is written.
    #[arg(long, env = "KEEP_CLIENT_CONFIG", default_value = "/mnt/keep-client/config/keep-client-config.toml")]
    pub client_config: PathBuf,

    /// Comma-separated libp2p bootstrap peers.
    #[arg(long, env = "KEEP_NETWORK_BOOTSTRAP_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// libp2p port of the client.
    #[arg(long, env = "KEEP_NETWORK_PORT", default_value_t = DEFAULT_NETWORK_PORT)]
    pub port: u16,

    /// Client storage directory.
    #[arg(long, env = "KEEP_DATA_DIR", default_value = "/mnt/keep-client/data")]
    pub data_dir: PathBuf,
}

impl Cli {
    /// Build the provisioning configuration from the parsed arguments.
    pub fn to_provision_config(&self) -> anyhow::Result<ProvisionConfig> {
        let accounts = &self.accounts;
        let client = &self.client;

        let contract_owner = accounts
            .contract_owner_address
            .ok_or_else(|| anyhow::anyhow!("The contract owner account address is required"))?;

        let authorizer = match (accounts.authorizer_address, &accounts.authorizer_password) {
            (Some(address), Some(password)) => Some(AccountCredentials {
                address,
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(ProvisionConfig {
            ethereum: EthereumConfig {
                host: self.ethereum.eth_hostname.clone(),
                rpc_port: self.ethereum.eth_rpc_port,
                ws_port: self.ethereum.eth_ws_port,
                network_id: self.ethereum.eth_network_id.clone(),
            },
            role: accounts.client_type,
            operator: OperatorConfig {
                address: accounts.operator_address,
                password: accounts.operator_password.clone(),
            },
            contract_owner: AccountCredentials {
                address: contract_owner,
                password: accounts.contract_owner_password.clone(),
            },
            authorizer,
            beneficiary: accounts.beneficiary_address,
            purse: accounts.purse_address,
            paths: PathsConfig {
                artifacts_dir: client.artifacts_dir.clone(),
                template: client.template.clone(),
                keyfile: client.keyfile.clone(),
                client_config: client.client_config.clone(),
            },
            network: ClientNetworkConfig {
                port: client.port,
                peers: client
                    .peers
                    .iter()
                    .map(|peer| peer.trim())
                    .filter(|peer| !peer.is_empty())
                    .map(str::to_string)
                    .collect(),
                data_dir: client.data_dir.clone(),
            },
            amounts: AmountsConfig {
                funding_ether: accounts.funding_ether.clone(),
                stake_tokens: accounts.stake_tokens,
                token_decimals: accounts.token_decimals,
            },
            transactions: TransactionConfig {
                unlock_duration_secs: accounts.unlock_duration,
                confirmation_timeout_secs: accounts.confirmation_timeout,
                gas_limit: accounts.gas_limit,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0x0000000000000000000000000000000000000abc";

    #[test]
    fn test_minimal_arguments_use_defaults() {
        let cli = Cli::try_parse_from([
            "provision-keep-client",
            "--contract-owner-address",
            OWNER,
        ])
        .unwrap();

        let config = cli.to_provision_config().unwrap();

        assert_eq!(config.role, ClientRole::Standard);
        assert_eq!(config.network.port, 3919);
        assert!(config.network.peers.is_empty());
        assert_eq!(config.transactions.gas_limit, 4_712_388);
        assert_eq!(config.contract_owner.address, OWNER.parse::<Address>().unwrap());
        assert_eq!(config.paths.keyfile, PathBuf::from("/mnt/keep-client/config/eth_account_keyfile"));
    }

    #[test]
    fn test_peers_are_split_on_commas() {
        let cli = Cli::try_parse_from([
            "provision-keep-client",
            "--contract-owner-address",
            OWNER,
            "--peers",
            "/ip4/10.0.0.1/tcp/3919,/ip4/10.0.0.2/tcp/3919",
        ])
        .unwrap();

        let config = cli.to_provision_config().unwrap();

        assert_eq!(
            config.network.peers,
            vec!["/ip4/10.0.0.1/tcp/3919", "/ip4/10.0.0.2/tcp/3919"]
        );
    }

    #[test]
    fn test_role_is_parsed() {
        let cli = Cli::try_parse_from([
            "provision-keep-client",
            "--contract-owner-address",
            OWNER,
            "--client-type",
            "relay-requester",
        ])
        .unwrap();

        assert_eq!(cli.accounts.client_type, ClientRole::RelayRequester);
    }

    #[test]
    fn test_contract_owner_required_without_config() {
        assert!(Cli::try_parse_from(["provision-keep-client"]).is_err());
        assert!(Cli::try_parse_from(["provision-keep-client", "--config", "provision.toml"]).is_ok());
    }
}
