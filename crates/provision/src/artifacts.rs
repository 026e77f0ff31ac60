//! Deployment artifact loading.
//!
//! Artifacts are the JSON documents emitted by the contract migration
//! (`{contractName, abi, networks: {<id>: {address}}}`), one file per
//! contract, named `<ContractName>.json`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Address};
use anyhow::Context;
use serde::Deserialize;

use crate::error::{ProvisionError, Result};

/// Name of the staking contract artifact.
pub const TOKEN_STAKING: &str = "TokenStaking";
/// Name of the token contract artifact.
pub const KEEP_TOKEN: &str = "KeepToken";
/// Name of the random beacon service contract artifact.
pub const BEACON_SERVICE: &str = "KeepRandomBeaconService";
/// Name of the random beacon operator contract artifact.
pub const BEACON_OPERATOR: &str = "KeepRandomBeaconOperator";

/// Per-network deployment entry of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkDeployment {
    pub address: Address,
}

/// A contract deployment artifact as written by the migration tooling.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentArtifact {
    /// Contract name. Falls back to the file stem when the document omits it.
    #[serde(default)]
    pub contract_name: String,
    /// Interface descriptor.
    pub abi: JsonAbi,
    /// Deployed address per network id.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDeployment>,
}

impl DeploymentArtifact {
    /// Address of this contract on `network_id`.
    pub fn address_on(&self, network_id: &str) -> Result<Address> {
        self.networks
            .get(network_id)
            .map(|deployment| deployment.address)
            .ok_or_else(|| ProvisionError::NetworkNotDeployed {
                contract: self.contract_name.clone(),
                network_id: network_id.to_string(),
            })
    }
}

/// A contract resolved for the active network.
#[derive(Debug, Clone)]
pub struct ResolvedContract {
    pub name: String,
    pub abi: JsonAbi,
    pub address: Address,
}

impl ResolvedContract {
    /// Ensure the interface declares `function` before it is invoked.
    pub fn require_function(&self, function: &str) -> anyhow::Result<()> {
        if self.abi.function(function).is_none() {
            anyhow::bail!(
                "Contract {} at {} does not declare function `{}`",
                self.name,
                self.address,
                function
            );
        }
        Ok(())
    }
}

/// Reads artifacts from a directory.
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    dir: PathBuf,
}

impl ArtifactLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the artifact file for `contract`.
    pub fn artifact_path(&self, contract: &str) -> PathBuf {
        self.dir.join(format!("{}.json", contract))
    }

    /// Read and parse the artifact of a single contract.
    pub fn load(&self, contract: &str) -> Result<DeploymentArtifact> {
        let path = self.artifact_path(contract);

        let mut artifact = read_artifact(&path).map_err(|source| ProvisionError::ArtifactMissing {
            contract: contract.to_string(),
            path: path.clone(),
            source,
        })?;

        if artifact.contract_name.is_empty() {
            artifact.contract_name = contract.to_string();
        }

        Ok(artifact)
    }

    /// Resolve a contract to its interface and address on `network_id`.
    pub fn resolve(&self, contract: &str, network_id: &str) -> Result<ResolvedContract> {
        let artifact = self.load(contract)?;
        let address = artifact.address_on(network_id)?;

        tracing::debug!(contract, network_id, %address, "Resolved contract artifact");

        Ok(ResolvedContract {
            name: artifact.contract_name,
            abi: artifact.abi,
            address,
        })
    }

    /// Resolve every contract the provisioning pipeline talks to.
    pub fn resolve_keep_contracts(&self, network_id: &str) -> Result<KeepContracts> {
        Ok(KeepContracts {
            token_staking: self.resolve(TOKEN_STAKING, network_id)?,
            keep_token: self.resolve(KEEP_TOKEN, network_id)?,
            beacon_service: self.resolve(BEACON_SERVICE, network_id)?,
            beacon_operator: self.resolve(BEACON_OPERATOR, network_id)?,
        })
    }
}

fn read_artifact(path: &Path) -> anyhow::Result<DeploymentArtifact> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// The contracts referenced by the pipeline, resolved for one network.
#[derive(Debug, Clone)]
pub struct KeepContracts {
    pub token_staking: ResolvedContract,
    pub keep_token: ResolvedContract,
    pub beacon_service: ResolvedContract,
    pub beacon_operator: ResolvedContract,
}
