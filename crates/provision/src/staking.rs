//! Operator staking.
//!
//! An operator is staked by the contract owner through
//! `KeepToken.approveAndCall(TokenStaking, amount, delegation)`, then bound to
//! the random beacon by the authorizer through
//! `TokenStaking.authorizeOperatorContract(operator, KeepRandomBeaconOperator)`.
//! A nonzero `TokenStaking.balanceOf(operator)` means both already happened.

use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};

use crate::{
    account::{ClientRole, is_funded},
    artifacts::{KeepContracts, ResolvedContract},
    chain::{ChainClient, TransactionRequest},
    error::{ProvisionError, Result},
};

/// Contract bindings for the calls made during staking.
pub mod abi {
    alloy_core::sol! {
        function balanceOf(address owner) external view returns (uint256 balance);
        function approveAndCall(address spender, uint256 value, bytes extraData) external returns (bool success);
        function authorizeOperatorContract(address operator, address operatorContract) external;
    }
}

/// Width of every address field in the delegation payload.
const ADDRESS_LEN: usize = 20;

/// Encoded length of a [`Delegation`].
pub const DELEGATION_LEN: usize = 3 * ADDRESS_LEN;

/// Instruction attached to the stake approval.
///
/// Encoded as three raw 20-byte addresses, in order: beneficiary (magpie),
/// operator, authorizer. The staking contract slices the bytes at these
/// offsets and rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delegation {
    pub beneficiary: Address,
    pub operator: Address,
    pub authorizer: Address,
}

impl Delegation {
    pub fn encode(&self) -> [u8; DELEGATION_LEN] {
        let mut out = [0u8; DELEGATION_LEN];
        out[..ADDRESS_LEN].copy_from_slice(self.beneficiary.as_slice());
        out[ADDRESS_LEN..2 * ADDRESS_LEN].copy_from_slice(self.operator.as_slice());
        out[2 * ADDRESS_LEN..].copy_from_slice(self.authorizer.as_slice());
        out
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() != DELEGATION_LEN {
            anyhow::bail!(
                "Delegation must be {} bytes, got {}",
                DELEGATION_LEN,
                bytes.len()
            );
        }

        Ok(Self {
            beneficiary: Address::from_slice(&bytes[..ADDRESS_LEN]),
            operator: Address::from_slice(&bytes[ADDRESS_LEN..2 * ADDRESS_LEN]),
            authorizer: Address::from_slice(&bytes[2 * ADDRESS_LEN..]),
        })
    }
}

/// Chain-derived state of the operator. Recomputed on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeStatus {
    pub is_staked: bool,
    pub is_funded: bool,
}

impl StakeStatus {
    /// The [`StakeState`] this status puts `role` in.
    pub fn stake_state(&self, role: ClientRole) -> StakeState {
        if role.is_exempt() {
            StakeState::Exempt
        } else if self.is_staked {
            StakeState::Staked
        } else {
            StakeState::Unstaked
        }
    }
}

/// Where the operator stands with respect to staking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StakeState {
    Unstaked,
    Staked,
    /// The role never stakes.
    Exempt,
}

/// Amount and participants of a stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeParams {
    /// Stake in the token's smallest unit.
    pub amount: U256,
    /// Sender of `approveAndCall`; holds the tokens.
    pub owner: Address,
    pub beneficiary: Address,
    pub authorizer: Address,
}

/// Stakes and authorizes an operator at most once.
#[derive(Debug)]
pub struct StakingCoordinator<'a, C> {
    chain: &'a C,
    contracts: &'a KeepContracts,
    params: StakeParams,
}

impl<'a, C: ChainClient> StakingCoordinator<'a, C> {
    pub fn new(chain: &'a C, contracts: &'a KeepContracts, params: StakeParams) -> Self {
        Self {
            chain,
            contracts,
            params,
        }
    }

    /// Staked balance of `operator` on the staking contract.
    pub async fn stake_balance(&self, operator: Address) -> Result<U256> {
        let chain_error = |source| ProvisionError::Chain {
            query: "balanceOf",
            source,
        };

        let staking = &self.contracts.token_staking;
        staking.require_function("balanceOf").map_err(chain_error)?;

        let output = self
            .chain
            .call(
                staking.address,
                abi::balanceOfCall { owner: operator }.abi_encode().into(),
            )
            .await
            .map_err(chain_error)?;

        abi::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| chain_error(anyhow::anyhow!("Invalid balanceOf output: {}", e)))
    }

    /// Query both idempotence checks for `operator`.
    ///
    /// Exempt roles are never looked up on the staking contract and report
    /// `is_staked = false`.
    pub async fn status(
        &self,
        role: ClientRole,
        operator: Address,
        funding_threshold: U256,
    ) -> Result<StakeStatus> {
        let is_funded = is_funded(self.chain, operator, funding_threshold).await?;
        let is_staked = !role.is_exempt() && !self.stake_balance(operator).await?.is_zero();

        Ok(StakeStatus {
            is_staked,
            is_funded,
        })
    }

    /// Current [`StakeState`] of `operator` under `role`.
    pub async fn state(&self, role: ClientRole, operator: Address) -> Result<StakeState> {
        if role.is_exempt() {
            return Ok(StakeState::Exempt);
        }

        if self.stake_balance(operator).await?.is_zero() {
            Ok(StakeState::Unstaked)
        } else {
            Ok(StakeState::Staked)
        }
    }

    /// Stake and authorize `operator` if it is unstaked. Returns the state
    /// found before acting.
    pub async fn ensure_staked(&self, role: ClientRole, operator: Address) -> Result<StakeState> {
        let state = self.state(role, operator).await?;
        self.settle(state, role, operator).await?;
        Ok(state)
    }

    /// Act on a previously observed `state`: only [`StakeState::Unstaked`]
    /// sends transactions.
    pub async fn settle(&self, state: StakeState, role: ClientRole, operator: Address) -> Result<()> {
        match state {
            StakeState::Exempt => {
                tracing::info!(%operator, %role, "Role is exempt from staking, skipping");
            }
            StakeState::Staked => {
                tracing::info!(%operator, "Operator already staked, skipping");
            }
            StakeState::Unstaked => {
                self.stake(operator).await?;
                self.authorize(operator).await?;
            }
        }

        Ok(())
    }

    async fn stake(&self, operator: Address) -> Result<()> {
        const STEP: &str = "approveAndCall";

        let delegation = Delegation {
            beneficiary: self.params.beneficiary,
            operator,
            authorizer: self.params.authorizer,
        };

        let token = &self.contracts.keep_token;
        let data = abi::approveAndCallCall {
            spender: self.contracts.token_staking.address,
            value: self.params.amount,
            extraData: Bytes::copy_from_slice(&delegation.encode()),
        }
        .abi_encode();

        tracing::info!(
            %operator,
            beneficiary = %delegation.beneficiary,
            authorizer = %delegation.authorizer,
            amount = %self.params.amount,
            "Staking operator"
        );

        self.transact(STEP, self.params.owner, token, data).await
    }

    async fn authorize(&self, operator: Address) -> Result<()> {
        const STEP: &str = "authorizeOperatorContract";

        let staking = &self.contracts.token_staking;
        let operator_contract = self.contracts.beacon_operator.address;
        let data = abi::authorizeOperatorContractCall {
            operator,
            operatorContract: operator_contract,
        }
        .abi_encode();

        tracing::info!(%operator, %operator_contract, "Authorizing operator contract");

        self.transact(STEP, self.params.authorizer, staking, data)
            .await
    }

    /// Send `step` (a function of `contract`) from `from` and require it to succeed.
    async fn transact(
        &self,
        step: &'static str,
        from: Address,
        contract: &ResolvedContract,
        data: Vec<u8>,
    ) -> Result<()> {
        let staking_error = |source| ProvisionError::StakingTransactionFailed { step, source };

        contract.require_function(step).map_err(staking_error)?;

        let receipt = self
            .chain
            .send_transaction(TransactionRequest::call(from, contract.address, data))
            .await
            .and_then(|receipt| receipt.ensure_success())
            .map_err(staking_error)?;

        tracing::info!(step, %from, tx_hash = %receipt.transaction_hash, "Staking transaction mined");

        Ok(())
    }
}
