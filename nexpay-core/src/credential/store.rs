//! Encrypted key-value store backing the credential guard.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::CredentialError;

/// Whether the app lock is on.
pub const APP_LOCK_ENABLED: &str = "app_lock_enabled";
/// Lowercase hex SHA-256 of the PIN.
pub const PIN_HASH: &str = "pin_hash";
/// Whether biometric unlock is on.
pub const BIOMETRIC_ENABLED: &str = "biometric_enabled";
/// Address of the persisted wallet account.
pub const ACCOUNT_ADDRESS: &str = "aptos_account_address";
/// Whether a wallet account was created on this install.
pub const HAS_PERSISTENT_ACCOUNT: &str = "has_persistent_account";

/// One change inside a [`SecureKeyValueStore::apply`] transaction.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum StoreEdit {
    /// Sets a string value.
    PutString {
        /// Key to set.
        key: String,
        /// New value.
        value: String,
    },
    /// Sets a boolean value.
    PutBool {
        /// Key to set.
        key: String,
        /// New value.
        value: bool,
    },
    /// Removes a key.
    Remove {
        /// Key to remove.
        key: String,
    },
}

impl StoreEdit {
    pub(crate) fn put_string(key: &str, value: impl Into<String>) -> Self {
        Self::PutString {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn put_bool(key: &str, value: bool) -> Self {
        Self::PutBool {
            key: key.to_string(),
            value,
        }
    }

    pub(crate) fn remove(key: &str) -> Self {
        Self::Remove {
            key: key.to_string(),
        }
    }
}

/// Encrypted preference store (`EncryptedSharedPreferences` / `DataStore` on
/// Android, Keychain-backed defaults on iOS).
///
/// `apply` must commit all edits of a call atomically. Concurrent calls are
/// serialized by the store; the last one wins.
#[uniffi::export(with_foreign)]
pub trait SecureKeyValueStore: Send + Sync {
    /// Reads a string value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the key holds a
    /// different type.
    fn get_string(&self, key: String) -> Result<Option<String>, CredentialError>;

    /// Reads a boolean value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the key holds a
    /// different type.
    fn get_bool(&self, key: String) -> Result<Option<bool>, CredentialError>;

    /// Commits `edits` as one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction could not be committed; no edit
    /// is applied in that case.
    fn apply(&self, edits: Vec<StoreEdit>) -> Result<(), CredentialError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredValue {
    String(String),
    Bool(bool),
}

/// In-memory [`SecureKeyValueStore`] for tests and previews.
///
/// Not encrypted; never use it for real credentials.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

impl SecureKeyValueStore for MemoryKeyValueStore {
    fn get_string(&self, key: String) -> Result<Option<String>, CredentialError> {
        match self.values().get(&key) {
            None => Ok(None),
            Some(StoredValue::String(value)) => Ok(Some(value.clone())),
            Some(StoredValue::Bool(_)) => Err(CredentialError::TypeMismatch { key }),
        }
    }

    fn get_bool(&self, key: String) -> Result<Option<bool>, CredentialError> {
        match self.values().get(&key) {
            None => Ok(None),
            Some(StoredValue::Bool(value)) => Ok(Some(*value)),
            Some(StoredValue::String(_)) => Err(CredentialError::TypeMismatch { key }),
        }
    }

    fn apply(&self, edits: Vec<StoreEdit>) -> Result<(), CredentialError> {
        let mut values = self.values();
        for edit in edits {
            match edit {
                StoreEdit::PutString { key, value } => {
                    values.insert(key, StoredValue::String(value));
                }
                StoreEdit::PutBool { key, value } => {
                    values.insert(key, StoredValue::Bool(value));
                }
                StoreEdit::Remove { key } => {
                    values.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_read_back() {
        let store = MemoryKeyValueStore::new();
        store
            .apply(vec![
                StoreEdit::put_string(PIN_HASH, "abc"),
                StoreEdit::put_bool(APP_LOCK_ENABLED, true),
            ])
            .unwrap();

        assert_eq!(store.get_string(PIN_HASH.into()).unwrap().as_deref(), Some("abc"));
        assert_eq!(store.get_bool(APP_LOCK_ENABLED.into()).unwrap(), Some(true));
        assert_eq!(store.get_bool(BIOMETRIC_ENABLED.into()).unwrap(), None);

        store.apply(vec![StoreEdit::remove(PIN_HASH)]).unwrap();
        assert_eq!(store.get_string(PIN_HASH.into()).unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_type_mismatch() {
        let store = MemoryKeyValueStore::new();
        store
            .apply(vec![StoreEdit::put_bool(PIN_HASH, true)])
            .unwrap();

        assert!(matches!(
            store.get_string(PIN_HASH.into()),
            Err(CredentialError::TypeMismatch { .. })
        ));
    }
}
