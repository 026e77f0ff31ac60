//! Shared fixtures for the provisioning integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use alloy_core::{
    primitives::{Address, Bytes, U256, keccak256},
    sol_types::SolCall,
};
use keep_provision::{
    ChainClient, ClientRole, LocalAccount, ProvisionConfig,
    chain::{TransactionReceipt, TransactionRequest},
    config::{AccountCredentials, ClientNetworkConfig, EthereumConfig, OperatorConfig, PathsConfig},
    keystore,
    staking::{Delegation, abi},
};
use tempdir::TempDir;

pub const NETWORK_ID: &str = "1101";
pub const OWNER_PASSWORD: &str = "owner-password";
pub const OPERATOR_PASSWORD: &str = "operator-password";

pub fn token_staking() -> Address {
    Address::repeat_byte(0x51)
}

pub fn keep_token() -> Address {
    Address::repeat_byte(0x52)
}

pub fn beacon_service() -> Address {
    Address::repeat_byte(0x53)
}

pub fn beacon_operator() -> Address {
    Address::repeat_byte(0x54)
}

pub fn contract_owner() -> Address {
    Address::repeat_byte(0x0a)
}

pub fn bootstrap_operator() -> Address {
    Address::repeat_byte(0x0b)
}

/// A call received by [`MockChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    CreateAccount,
    EncryptKeyfile(Address),
    RegisterSigner(Address),
    Unlock(Address),
    Balance(Address),
    Call { to: Address, data: Bytes },
    Send(TransactionRequest),
}

#[derive(Debug, Default)]
struct ChainState {
    calls: Vec<ChainCall>,
    balances: HashMap<Address, U256>,
    stakes: HashMap<Address, U256>,
    passwords: HashMap<Address, String>,
    rejected_selectors: HashSet<[u8; 4]>,
    signers: HashSet<Address>,
    nonce: u64,
    account_creation_fails: bool,
}

/// In-memory chain that records every call.
///
/// Understands value transfers, `approveAndCall` (credits the delegated
/// operator's stake) and `balanceOf` on the staking contract.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        let chain = Self::default();
        chain.set_password(contract_owner(), OWNER_PASSWORD);
        chain.set_password(bootstrap_operator(), OPERATOR_PASSWORD);
        chain
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn set_password(&self, address: Address, password: &str) {
        self.state().passwords.insert(address, password.to_string());
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state().balances.insert(address, balance);
    }

    pub fn set_stake(&self, operator: Address, stake: U256) {
        self.state().stakes.insert(operator, stake);
    }

    /// Mine transactions calling `selector` as reverted.
    pub fn reject(&self, selector: [u8; 4]) {
        self.state().rejected_selectors.insert(selector);
    }

    /// Make `create_account` fail.
    pub fn fail_account_creation(&self) {
        self.state().account_creation_fails = true;
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.state().calls.clone()
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChainCall::Send(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn unlocked(&self) -> Vec<Address> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChainCall::Unlock(address) => Some(address),
                _ => None,
            })
            .collect()
    }

    pub fn stake_of(&self, operator: Address) -> U256 {
        self.state().stakes.get(&operator).copied().unwrap_or_default()
    }

    fn record(&self, call: ChainCall) {
        self.state().calls.push(call);
    }
}

impl ChainClient for MockChain {
    async fn create_account(&self) -> anyhow::Result<LocalAccount> {
        self.record(ChainCall::CreateAccount);
        if self.state().account_creation_fails {
            anyhow::bail!("key generation unavailable");
        }
        Ok(LocalAccount::random())
    }

    async fn encrypt_keyfile(&self, account: &LocalAccount, password: &str) -> anyhow::Result<String> {
        self.record(ChainCall::EncryptKeyfile(account.address));
        let keyfile = keystore::encrypt_keyfile(account, password)?;
        Ok(serde_json::to_string(&keyfile)?)
    }

    fn register_signer(&self, account: &LocalAccount) -> anyhow::Result<()> {
        self.record(ChainCall::RegisterSigner(account.address));
        self.state().signers.insert(account.address);
        Ok(())
    }

    async fn unlock_account(
        &self,
        address: Address,
        password: &str,
        _duration: Duration,
    ) -> anyhow::Result<()> {
        self.record(ChainCall::Unlock(address));
        match self.state().passwords.get(&address) {
            Some(expected) if expected == password => Ok(()),
            _ => anyhow::bail!("could not decrypt key with given password"),
        }
    }

    async fn balance(&self, address: Address) -> anyhow::Result<U256> {
        self.record(ChainCall::Balance(address));
        Ok(self.state().balances.get(&address).copied().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        self.record(ChainCall::Call {
            to,
            data: data.clone(),
        });

        if to != token_staking() || !data.starts_with(&abi::balanceOfCall::SELECTOR) {
            anyhow::bail!("execution reverted");
        }

        let call = abi::balanceOfCall::abi_decode(&data)?;
        Ok(Bytes::from(self.stake_of(call.owner).to_be_bytes::<32>().to_vec()))
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> anyhow::Result<TransactionReceipt> {
        self.record(ChainCall::Send(request.clone()));

        let mut state = self.state();
        state.nonce += 1;
        let transaction_hash = keccak256(state.nonce.to_be_bytes());

        let selector = request.data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok());
        if selector.is_some_and(|s| state.rejected_selectors.contains(&s)) {
            return Ok(TransactionReceipt {
                transaction_hash,
                status: false,
            });
        }

        if request.data.is_empty() {
            *state.balances.entry(request.to).or_default() += request.value;
        } else if selector == Some(abi::approveAndCallCall::SELECTOR) {
            let call = abi::approveAndCallCall::abi_decode(&request.data)?;
            let delegation = Delegation::decode(&call.extraData)?;
            *state.stakes.entry(delegation.operator).or_default() += call.value;
        }

        Ok(TransactionReceipt {
            transaction_hash,
            status: true,
        })
    }
}

pub const TEMPLATE: &str = r#"
[ethereum]
URL = ""
URLRPC = ""

[ethereum.account]
Address = ""
KeyFile = ""

[ethereum.ContractAddresses]
KeepRandomBeaconOperator = ""
KeepRandomBeaconService = ""
TokenStaking = ""

[LibP2P]
Port = 27001.0

[Storage]
DataDir = ""
"#;

const TOKEN_STAKING_ABI: &str = r#"[
    {
        "type": "function",
        "name": "balanceOf",
        "inputs": [{ "name": "_address", "type": "address" }],
        "outputs": [{ "name": "balance", "type": "uint256" }],
        "stateMutability": "view"
    },
    {
        "type": "function",
        "name": "authorizeOperatorContract",
        "inputs": [
            { "name": "_operator", "type": "address" },
            { "name": "_operatorContract", "type": "address" }
        ],
        "outputs": [],
        "stateMutability": "nonpayable"
    }
]"#;

const KEEP_TOKEN_ABI: &str = r#"[
    {
        "type": "function",
        "name": "approveAndCall",
        "inputs": [
            { "name": "_spender", "type": "address" },
            { "name": "_value", "type": "uint256" },
            { "name": "_extraData", "type": "bytes" }
        ],
        "outputs": [{ "name": "success", "type": "bool" }],
        "stateMutability": "nonpayable"
    }
]"#;

/// A provisioning environment on disk: artifacts, template and output paths.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: ProvisionConfig,
}

impl TestEnv {
    pub fn new(role: ClientRole) -> Self {
        let dir = TempDir::new("keep-provision-it").unwrap();
        let artifacts_dir = dir.path().join("artifacts");
        std::fs::create_dir_all(&artifacts_dir).unwrap();

        for (name, address, abi) in [
            ("TokenStaking", token_staking(), TOKEN_STAKING_ABI),
            ("KeepToken", keep_token(), KEEP_TOKEN_ABI),
            ("KeepRandomBeaconService", beacon_service(), "[]"),
            ("KeepRandomBeaconOperator", beacon_operator(), "[]"),
        ] {
            let artifact = format!(
                r#"{{ "contractName": "{}", "abi": {}, "networks": {{ "{}": {{ "address": "{}" }} }} }}"#,
                name, abi, NETWORK_ID, address
            );
            std::fs::write(artifacts_dir.join(format!("{}.json", name)), artifact).unwrap();
        }

        let template = dir.path().join("keep-client-config-template.toml");
        std::fs::write(&template, TEMPLATE).unwrap();

        let operator = OperatorConfig {
            address: role.uses_existing_account().then(bootstrap_operator),
            password: OPERATOR_PASSWORD.to_string(),
        };

        let config = ProvisionConfig {
            ethereum: EthereumConfig {
                host: "http://eth-tx-node".to_string(),
                rpc_port: 8545,
                ws_port: 8546,
                network_id: NETWORK_ID.to_string(),
            },
            role,
            operator,
            contract_owner: AccountCredentials {
                address: contract_owner(),
                password: OWNER_PASSWORD.to_string(),
            },
            paths: PathsConfig {
                artifacts_dir,
                template,
                keyfile: dir.path().join("config").join("eth_account_keyfile"),
                client_config: dir.path().join("config").join("keep-client-config.toml"),
            },
            network: ClientNetworkConfig {
                port: 3919,
                peers: Vec::new(),
                data_dir: PathBuf::from("/mnt/keep-client/data"),
            },
            ..Default::default()
        };

        Self { dir, config }
    }

    pub fn rendered(&self) -> toml::Table {
        std::fs::read_to_string(&self.config.paths.client_config)
            .unwrap()
            .parse()
            .unwrap()
    }
}
