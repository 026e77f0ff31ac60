//! Web3 Secret Storage (version 3) keyfiles.
//!
//! The client reads its operator key from this format, so the parameters
//! match what the web3 tooling writes by default: scrypt (n = 8192, r = 8,
//! p = 1), aes-128-ctr, and a keccak-256 MAC over the second half of the
//! derived key followed by the ciphertext.

use aes::Aes128;
use alloy_core::primitives::keccak256;
use anyhow::Context;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::chain::LocalAccount;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

const SCRYPT_LOG_N: u8 = 13;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const DKLEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyfile {
    pub version: u8,
    pub id: String,
    /// Lowercase hex address without `0x`.
    pub address: String,
    pub crypto: KeyfileCrypto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyfileCrypto {
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub cipher: String,
    pub kdf: String,
    pub kdfparams: ScryptParams,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptParams {
    pub dklen: usize,
    pub salt: String,
    pub n: u64,
    pub r: u32,
    pub p: u32,
}

fn derive_key(password: &str, salt: &[u8], params: &ScryptParams) -> anyhow::Result<[u8; DKLEN]> {
    if !params.n.is_power_of_two() || params.dklen != DKLEN {
        anyhow::bail!("Unsupported scrypt parameters: n={}, dklen={}", params.n, params.dklen);
    }

    let log_n = params.n.trailing_zeros() as u8;
    let scrypt_params = scrypt::Params::new(log_n, params.r, params.p, DKLEN)
        .map_err(|e| anyhow::anyhow!("Invalid scrypt parameters: {}", e))?;

    let mut derived = [0u8; DKLEN];
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params, &mut derived)
        .map_err(|e| anyhow::anyhow!("scrypt key derivation failed: {}", e))?;
    Ok(derived)
}

fn apply_cipher(key: &[u8], iv: &[u8], data: &mut [u8]) -> anyhow::Result<()> {
    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|e| anyhow::anyhow!("Invalid cipher key or iv: {}", e))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn mac(derived: &[u8; DKLEN], ciphertext: &[u8]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(16 + ciphertext.len());
    preimage.extend_from_slice(&derived[16..32]);
    preimage.extend_from_slice(ciphertext);
    keccak256(preimage).0
}

/// Encrypt `account`'s private key under `password`.
pub fn encrypt_keyfile(account: &LocalAccount, password: &str) -> anyhow::Result<Keyfile> {
    let mut rng = rand::rng();
    let salt: [u8; 32] = rng.random();
    let iv: [u8; 16] = rng.random();

    let kdfparams = ScryptParams {
        dklen: DKLEN,
        salt: hex::encode(salt),
        n: 1 << SCRYPT_LOG_N,
        r: SCRYPT_R,
        p: SCRYPT_P,
    };

    let derived = derive_key(password, &salt, &kdfparams)?;

    let mut ciphertext = account.private_key().to_vec();
    apply_cipher(&derived[..16], &iv, &mut ciphertext)?;

    Ok(Keyfile {
        version: 3,
        id: uuid::Uuid::new_v4().to_string(),
        address: hex::encode(account.address),
        crypto: KeyfileCrypto {
            mac: hex::encode(mac(&derived, &ciphertext)),
            ciphertext: hex::encode(ciphertext),
            cipherparams: CipherParams {
                iv: hex::encode(iv),
            },
            cipher: "aes-128-ctr".to_string(),
            kdf: "scrypt".to_string(),
            kdfparams,
        },
    })
}

/// Decrypt a keyfile, verifying its MAC and address.
pub fn decrypt_keyfile(keyfile: &Keyfile, password: &str) -> anyhow::Result<LocalAccount> {
    let crypto = &keyfile.crypto;
    if crypto.kdf != "scrypt" || crypto.cipher != "aes-128-ctr" {
        anyhow::bail!("Unsupported keyfile: kdf={}, cipher={}", crypto.kdf, crypto.cipher);
    }

    let salt = hex::decode(&crypto.kdfparams.salt).context("Invalid keyfile salt")?;
    let iv = hex::decode(&crypto.cipherparams.iv).context("Invalid keyfile iv")?;
    let mut plaintext = hex::decode(&crypto.ciphertext).context("Invalid keyfile ciphertext")?;

    let derived = derive_key(password, &salt, &crypto.kdfparams)?;
    if hex::encode(mac(&derived, &plaintext)) != crypto.mac.to_lowercase() {
        anyhow::bail!("Keyfile MAC mismatch: wrong password or corrupted keyfile");
    }

    apply_cipher(&derived[..16], &iv, &mut plaintext)?;
    let account = LocalAccount::from_private_key(&plaintext)?;

    if hex::encode(account.address) != keyfile.address.trim_start_matches("0x").to_lowercase() {
        anyhow::bail!("Keyfile address does not match its key");
    }

    Ok(account)
}
