//! Operator account provisioning and funding.

use std::path::PathBuf;

use alloy_core::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    chain::{ChainClient, TransactionRequest},
    config::ProvisionConfig,
    error::{ProvisionError, Result},
    fs::FsHandler,
};

/// Role the provisioned client plays in the network.
///
/// Selected once at startup. Each role fixes how the operator account is
/// obtained and whether it has to be staked.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ClientRole {
    /// Well-known peer running on a pre-existing, node-held account.
    Bootstrap,
    /// Regular staked operator on a freshly generated account.
    #[default]
    Standard,
    /// Pure consumer of the random beacon. Generated account, never staked.
    RelayRequester,
}

impl ClientRole {
    /// Whether the operator account is supplied instead of generated.
    pub fn uses_existing_account(&self) -> bool {
        matches!(self, Self::Bootstrap)
    }

    /// Whether the role is exempt from staking.
    pub fn is_exempt(&self) -> bool {
        matches!(self, Self::RelayRequester)
    }

    /// Obtain an operator account that can send transactions.
    pub async fn provision<C: ChainClient>(
        &self,
        chain: &C,
        config: &ProvisionConfig,
    ) -> Result<OperatorIdentity> {
        match self {
            Self::Bootstrap => {
                let address = config.operator.address.ok_or_else(|| {
                    ProvisionError::Config(
                        "bootstrap role requires an existing operator account address".to_string(),
                    )
                })?;
                provision_existing(chain, address, config).await
            }
            Self::Standard | Self::RelayRequester => provision_generated(chain, config).await,
        }
    }
}

/// The operator account handed to the later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorIdentity {
    pub address: Address,
    /// Encrypted keyfile written for a generated account.
    pub keyfile: Option<PathBuf>,
    /// Whether the account can sign transactions for this run.
    pub unlocked: bool,
}

async fn provision_existing<C: ChainClient>(
    chain: &C,
    address: Address,
    config: &ProvisionConfig,
) -> Result<OperatorIdentity> {
    chain
        .unlock_account(address, &config.operator.password, config.unlock_duration())
        .await
        .map_err(|source| ProvisionError::UnlockFailed { address, source })?;

    tracing::info!(operator = %address, "Unlocked existing operator account");

    Ok(OperatorIdentity {
        address,
        keyfile: None,
        unlocked: true,
    })
}

async fn provision_generated<C: ChainClient>(
    chain: &C,
    config: &ProvisionConfig,
) -> Result<OperatorIdentity> {
    let path = config.paths.keyfile.clone();
    let keyfile_error = |source| ProvisionError::KeyfileWriteFailed {
        path: path.clone(),
        source,
    };

    let account = chain
        .create_account()
        .await
        .map_err(|source| ProvisionError::Chain {
            query: "create_account",
            source,
        })?;
    tracing::info!(operator = %account.address, "Generated operator account");

    let keyfile = chain
        .encrypt_keyfile(&account, &config.operator.password)
        .await
        .map_err(keyfile_error)?;

    FsHandler::write_private_file(&path, keyfile.as_bytes())
        .await
        .map_err(keyfile_error)?;
    tracing::info!(path = %path.display(), "Operator keyfile written");

    chain
        .register_signer(&account)
        .map_err(|source| ProvisionError::Chain {
            query: "register_signer",
            source,
        })?;

    Ok(OperatorIdentity {
        address: account.address,
        keyfile: Some(path),
        unlocked: true,
    })
}

/// Whether `operator` holds at least `threshold` wei.
pub async fn is_funded<C: ChainClient>(
    chain: &C,
    operator: Address,
    threshold: U256,
) -> Result<bool> {
    let balance = chain
        .balance(operator)
        .await
        .map_err(|source| ProvisionError::Chain {
            query: "balance",
            source,
        })?;

    Ok(balance >= threshold)
}

/// What the funding step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingOutcome {
    AlreadyFunded,
    Transferred,
}

/// Top up `operator` from `purse` unless it already holds `amount` wei.
pub async fn fund_operator_account<C: ChainClient>(
    chain: &C,
    operator: Address,
    purse: Address,
    amount: U256,
) -> Result<FundingOutcome> {
    if is_funded(chain, operator, amount).await? {
        tracing::info!(%operator, %amount, "Operator already funded, skipping transfer");
        return Ok(FundingOutcome::AlreadyFunded);
    }

    transfer_funds(chain, operator, purse, amount).await?;
    Ok(FundingOutcome::Transferred)
}

/// Send `amount` wei from `purse` to `operator` without checking its balance.
pub async fn transfer_funds<C: ChainClient>(
    chain: &C,
    operator: Address,
    purse: Address,
    amount: U256,
) -> Result<()> {
    let receipt = chain
        .send_transaction(TransactionRequest::transfer(purse, operator, amount))
        .await
        .and_then(|receipt| receipt.ensure_success())
        .map_err(|source| ProvisionError::Funding { operator, source })?;

    tracing::info!(
        %operator,
        %purse,
        %amount,
        tx_hash = %receipt.transaction_hash,
        "Operator funded"
    );

    Ok(())
}
