//! App-lock credentials and the wallet account handle.
//!
//! [`CredentialGuard`] owns the PIN / biometric flags and the account cache.
//! Persistence goes through a [`store::SecureKeyValueStore`] supplied by the
//! host, which is expected to encrypt at rest. Accounts are generated by the
//! host's chain SDK through an [`AccountGenerator`].
//!
//! ```kotlin
//! val guard = CredentialGuard(EncryptedPrefsStore(context), AptosAccountGenerator())
//! guard.setPin("1234")
//! check(guard.validatePin("1234"))
//! val lock = guard.observeAppLock(observer) // keep until the screen goes away
//! lock.cancel()
//! ```

mod account;
mod guard;
pub mod store;

pub use account::{AccountGenerator, AccountKeys, MemoryAccountGenerator, WalletAccount};
pub use guard::{
    hash_pin, AppLockObserver, AppLockSubscription, CredentialGuard, CredentialRecord,
};
pub use store::{MemoryKeyValueStore, SecureKeyValueStore, StoreEdit};
