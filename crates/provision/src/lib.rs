//! keep-provision - Keep client operator provisioning.
//!
//! This crate prepares the on-chain and on-disk state a keep client needs
//! before it starts: an operator account that is funded, staked and
//! authorized for the random beacon, plus the client's TOML config rendered
//! from a template and the contract deployment artifacts.

pub mod account;
pub mod artifacts;
pub mod chain;
pub mod config;
pub mod error;
mod fs;
pub mod keystore;
mod provisioner;
pub mod render;
pub mod staking;
pub mod units;

pub use account::{
    ClientRole, FundingOutcome, OperatorIdentity, fund_operator_account, transfer_funds,
};
pub use artifacts::{ArtifactLoader, DeploymentArtifact, KeepContracts, ResolvedContract};
pub use chain::{ChainClient, JsonRpcChainClient, LocalAccount, RpcClientConfig};
pub use config::ProvisionConfig;
pub use error::{ProvisionError, Result};
pub use provisioner::{ProvisionReport, Provisioner};
pub use render::{ConfigRenderer, Substitutions};
pub use staking::{Delegation, StakeParams, StakeState, StakeStatus, StakingCoordinator};
