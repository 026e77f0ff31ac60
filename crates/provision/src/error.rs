//! Error taxonomy for the provisioning pipeline.
//!
//! Every stage surfaces one of these variants to the [`crate::Provisioner`]
//! unmodified. None of them is recovered locally.

use std::path::PathBuf;

use alloy_core::primitives::Address;

/// Errors raised by the provisioning stages.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// A deployment artifact could not be read or parsed.
    #[error("deployment artifact for {contract} is missing or unreadable at {}", path.display())]
    ArtifactMissing {
        contract: String,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A deployment artifact has no address for the active network id.
    #[error("contract {contract} is not deployed on network {network_id}")]
    NetworkNotDeployed { contract: String, network_id: String },

    /// The chain client rejected the credential for an account.
    #[error("failed to unlock account {address}")]
    UnlockFailed {
        address: Address,
        #[source]
        source: anyhow::Error,
    },

    /// The encrypted operator keyfile could not be produced or persisted.
    #[error("failed to write operator keyfile to {}", path.display())]
    KeyfileWriteFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The value transfer funding the operator was rejected.
    #[error("failed to fund operator account {operator}")]
    Funding {
        operator: Address,
        #[source]
        source: anyhow::Error,
    },

    /// A stake or authorization transaction was rejected by the chain.
    #[error("staking transaction `{step}` failed")]
    StakingTransactionFailed {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A read-only query against the chain failed.
    #[error("chain query `{query}` failed")]
    Chain {
        query: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The client config template could not be read or parsed.
    #[error("failed to read config template {}", path.display())]
    TemplateReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The rendered client config could not be produced or written.
    #[error("failed to write client config to {}", path.display())]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The provisioning configuration is invalid.
    #[error("invalid provisioning configuration: {0}")]
    Config(String),
}

impl ProvisionError {
    /// Short machine-friendly name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::NetworkNotDeployed { .. } => "network_not_deployed",
            Self::UnlockFailed { .. } => "unlock_failed",
            Self::KeyfileWriteFailed { .. } => "keyfile_write_failed",
            Self::Funding { .. } => "funding_failed",
            Self::StakingTransactionFailed { .. } => "staking_transaction_failed",
            Self::Chain { .. } => "chain_query_failed",
            Self::TemplateReadFailed { .. } => "template_read_failed",
            Self::ConfigWriteFailed { .. } => "config_write_failed",
            Self::Config(_) => "invalid_config",
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
