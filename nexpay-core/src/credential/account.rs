//! Wallet account handle.
//!
//! Key generation and address derivation belong to the chain SDK on the host
//! (`Ed25519` key, address = `SHA3-256(public_key || 0x00)`). The core only
//! checks what it receives, normalises the address and keeps the key out of
//! logs.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CredentialError;

const ADDRESS_LEN: usize = 32;
const PRIVATE_KEY_LEN: usize = 32;

/// Key material of a freshly generated account.
#[derive(uniffi::Record)]
pub struct AccountKeys {
    /// `0x`-prefixed hex account address derived from the public key.
    pub address: String,
    /// 32-byte `Ed25519` private key.
    pub private_key: Vec<u8>,
}

/// Generates accounts with the host's chain SDK.
#[uniffi::export(with_foreign)]
pub trait AccountGenerator: Send + Sync {
    /// Generates a new key pair and its address.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK fails to generate an account.
    fn generate(&self) -> Result<AccountKeys, CredentialError>;
}

/// A wallet account handed out by the guard.
///
/// The private key lives only in memory and is wiped on drop.
#[derive(uniffi::Object)]
pub struct WalletAccount {
    address: String,
    private_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for WalletAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl WalletAccount {
    /// Asks `generator` for a new account.
    ///
    /// # Errors
    ///
    /// Returns the generator's error, or [`CredentialError::InvalidAccount`]
    /// if the address or key has the wrong shape.
    pub fn generate(generator: &dyn AccountGenerator) -> Result<Self, CredentialError> {
        Self::from_keys(generator.generate()?)
    }

    fn from_keys(keys: AccountKeys) -> Result<Self, CredentialError> {
        let AccountKeys {
            address,
            private_key,
        } = keys;
        let private_key = Zeroizing::new(private_key);

        if private_key.len() != PRIVATE_KEY_LEN {
            return Err(CredentialError::InvalidAccount(format!(
                "expected a {PRIVATE_KEY_LEN}-byte private key, got {}",
                private_key.len()
            )));
        }
        Ok(Self {
            address: normalize_address(&address)?,
            private_key,
        })
    }
}

#[uniffi::export]
impl WalletAccount {
    /// `0x`-prefixed, lowercase hex account address.
    #[must_use]
    pub fn address(&self) -> String {
        self.address.clone()
    }

    /// Raw private key, for handing back to the signing SDK.
    #[must_use]
    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.private_key.to_vec()
    }
}

fn normalize_address(address: &str) -> Result<String, CredentialError> {
    let digits = address
        .strip_prefix("0x")
        .ok_or_else(|| CredentialError::InvalidAccount("address must start with 0x".into()))?;
    let bytes = hex::decode(digits)
        .map_err(|e| CredentialError::InvalidAccount(format!("address is not hex: {e}")))?;
    if bytes.len() != ADDRESS_LEN {
        return Err(CredentialError::InvalidAccount(format!(
            "expected a {ADDRESS_LEN}-byte address, got {}",
            bytes.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// [`AccountGenerator`] returning random placeholder accounts.
///
/// The address is random and not derived from the key; only use it where no
/// funds are involved.
#[derive(Debug, Default)]
pub struct MemoryAccountGenerator {
    generated: AtomicUsize,
}

impl MemoryAccountGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts generated so far.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

impl AccountGenerator for MemoryAccountGenerator {
    fn generate(&self) -> Result<AccountKeys, CredentialError> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        let mut address = [0u8; ADDRESS_LEN];
        let mut private_key = vec![0u8; PRIVATE_KEY_LEN];
        OsRng.fill_bytes(&mut address);
        OsRng.fill_bytes(&mut private_key);
        Ok(AccountKeys {
            address: format!("0x{}", hex::encode(address)),
            private_key,
        })
    }
}
