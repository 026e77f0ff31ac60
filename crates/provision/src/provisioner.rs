//! End-to-end provisioning pipeline.
//!
//! The order is fixed: artifacts -> operator account -> funding -> staking
//! -> client config. Chain state is read once after the account is ready and
//! decides which transactions are still needed, so a failed run can simply be
//! started again.

use std::path::PathBuf;

use alloy_core::primitives::Address;

use crate::{
    account::{FundingOutcome, OperatorIdentity, transfer_funds},
    artifacts::{ArtifactLoader, KeepContracts},
    chain::ChainClient,
    config::ProvisionConfig,
    error::{ProvisionError, Result},
    render::{ConfigRenderer, Substitutions},
    staking::{StakeParams, StakeState, StakeStatus, StakingCoordinator},
};

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub operator: OperatorIdentity,
    /// Chain state found before funding and staking.
    pub status: StakeStatus,
    pub funding: FundingOutcome,
    /// Stake state found before the staking stage acted.
    pub stake: StakeState,
    pub client_config: PathBuf,
}

/// Drives one provisioning run against a chain client.
#[derive(Debug)]
pub struct Provisioner<'a, C> {
    config: &'a ProvisionConfig,
    chain: &'a C,
}

impl<'a, C: ChainClient> Provisioner<'a, C> {
    pub fn new(config: &'a ProvisionConfig, chain: &'a C) -> Self {
        Self { config, chain }
    }

    pub async fn run(&self) -> Result<ProvisionReport> {
        let config = self.config;
        config.validate()?;

        tracing::info!(
            role = %config.role,
            network_id = %config.ethereum.network_id,
            "Starting keep client provisioning..."
        );

        tracing::info!(dir = %config.paths.artifacts_dir.display(), "Loading contract artifacts...");
        let contracts = ArtifactLoader::new(&config.paths.artifacts_dir)
            .resolve_keep_contracts(&config.ethereum.network_id)?;
        tracing::info!(
            token_staking = %contracts.token_staking.address,
            keep_token = %contracts.keep_token.address,
            beacon_service = %contracts.beacon_service.address,
            beacon_operator = %contracts.beacon_operator.address,
            "Contract artifacts loaded"
        );

        tracing::info!(role = %config.role, "Provisioning operator account...");
        let operator = config.role.provision(self.chain, config).await?;
        tracing::info!(operator = %operator.address, "Operator account ready");

        self.unlock_contract_accounts().await?;

        let coordinator = self.staking_coordinator(&contracts)?;
        let funding_amount = config.funding_amount()?;

        tracing::info!(operator = %operator.address, "Checking operator status...");
        let status = coordinator
            .status(config.role, operator.address, funding_amount)
            .await?;
        tracing::info!(
            operator = %operator.address,
            is_funded = status.is_funded,
            is_staked = status.is_staked,
            "Operator status"
        );

        let funding = if status.is_funded {
            tracing::info!(operator = %operator.address, "Operator already funded, skipping transfer");
            FundingOutcome::AlreadyFunded
        } else {
            tracing::info!(operator = %operator.address, "Funding operator account...");
            transfer_funds(self.chain, operator.address, config.purse(), funding_amount).await?;
            FundingOutcome::Transferred
        };
        tracing::info!(operator = %operator.address, ?funding, "Funding stage done");

        let stake = status.stake_state(config.role);
        coordinator.settle(stake, config.role, operator.address).await?;
        tracing::info!(operator = %operator.address, %stake, "Staking stage done");

        let client_config = self.render_client_config(&operator, &contracts).await?;

        tracing::info!(
            operator = %operator.address,
            client_config = %client_config.display(),
            "✓ Keep client provisioned"
        );

        Ok(ProvisionReport {
            operator,
            status,
            funding,
            stake,
            client_config,
        })
    }

    /// Unlock the accounts that send funding and staking transactions.
    async fn unlock_contract_accounts(&self) -> Result<()> {
        let owner = &self.config.contract_owner;
        self.unlock(owner.address, &owner.password, "contract owner")
            .await?;

        let authorizer = self.config.authorizer();
        if authorizer.address != owner.address && !self.config.role.is_exempt() {
            self.unlock(authorizer.address, &authorizer.password, "authorizer")
                .await?;
        }

        Ok(())
    }

    async fn unlock(&self, address: Address, password: &str, account: &str) -> Result<()> {
        tracing::info!(%address, account, "Unlocking account...");
        self.chain
            .unlock_account(address, password, self.config.unlock_duration())
            .await
            .map_err(|source| ProvisionError::UnlockFailed { address, source })
    }

    fn staking_coordinator<'b>(
        &'b self,
        contracts: &'b KeepContracts,
    ) -> Result<StakingCoordinator<'b, C>> {
        let params = StakeParams {
            amount: self.config.stake_amount()?,
            owner: self.config.contract_owner.address,
            beneficiary: self.config.beneficiary(),
            authorizer: self.config.authorizer().address,
        };

        Ok(StakingCoordinator::new(self.chain, contracts, params))
    }

    async fn render_client_config(
        &self,
        operator: &OperatorIdentity,
        contracts: &KeepContracts,
    ) -> Result<PathBuf> {
        let paths = &self.config.paths;
        tracing::info!(template = %paths.template.display(), "Rendering client config...");

        let mut renderer = ConfigRenderer::from_file(&paths.template).await?;
        let substitutions = Substitutions::for_client(self.config, operator, contracts)?;
        renderer
            .apply(&substitutions)
            .map_err(|source| ProvisionError::ConfigWriteFailed {
                path: paths.client_config.clone(),
                source,
            })?;
        renderer.write_to(&paths.client_config).await?;

        Ok(paths.client_config.clone())
    }
}
