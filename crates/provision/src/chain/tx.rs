//! In-process signer for locally generated accounts.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::Address;
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;

use super::LocalAccount;

/// Sign `tx` and return the raw bytes ready for `eth_sendRawTransaction`.
///
/// With `chain_id` set the signature is replay-protected (EIP-155).
pub fn sign_legacy(signer: &PrivateKeySigner, tx: TxLegacy) -> anyhow::Result<Vec<u8>> {
    let signature = signer
        .sign_hash_sync(&tx.signature_hash())
        .context("Failed to sign transaction")?;

    Ok(TxEnvelope::from(tx.into_signed(signature)).encoded_2718())
}

/// Keys registered for local signing, by address.
#[derive(Debug, Default)]
pub struct SignerRegistry {
    signers: Mutex<HashMap<Address, PrivateKeySigner>>,
}

impl SignerRegistry {
    pub fn add(&self, account: &LocalAccount) {
        self.signers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.address, account.signer.clone());
    }

    /// Signer for `address` when it was registered locally.
    pub fn get(&self, address: &Address) -> Option<PrivateKeySigner> {
        self.signers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}
