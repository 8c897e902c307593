//! PIN / biometric app lock and the cached wallet account.

#![allow(clippy::significant_drop_tightening)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::watch;

use super::account::{AccountGenerator, WalletAccount};
use super::store::{
    SecureKeyValueStore, StoreEdit, ACCOUNT_ADDRESS, APP_LOCK_ENABLED, BIOMETRIC_ENABLED,
    HAS_PERSISTENT_ACCOUNT, PIN_HASH,
};
use crate::error::CredentialError;

/// Lowercase hex SHA-256 of the PIN's UTF-8 bytes. Unsalted.
#[uniffi::export]
#[must_use]
pub fn hash_pin(pin: &str) -> String {
    hex::encode(Sha256::digest(pin.as_bytes()))
}

/// Notified whenever the app lock is switched on or off.
#[uniffi::export(with_foreign)]
pub trait AppLockObserver: Send + Sync {
    /// Receives the new app-lock state.
    fn on_app_lock_changed(&self, enabled: bool);
}

type ObserverSlot = Mutex<Option<Arc<dyn AppLockObserver>>>;

fn observer_in(slot: &ObserverSlot) -> Option<Arc<dyn AppLockObserver>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Registration returned by [`CredentialGuard::observe_app_lock`].
///
/// The observer stays registered until [`Self::cancel`] is called or the
/// handle is dropped.
#[derive(uniffi::Object)]
pub struct AppLockSubscription {
    slot: Arc<ObserverSlot>,
}

impl std::fmt::Debug for AppLockSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLockSubscription")
            .field("active", &observer_in(&self.slot).is_some())
            .finish()
    }
}

#[uniffi::export]
impl AppLockSubscription {
    /// Unregisters the observer and releases it. Safe to call repeatedly,
    /// including from inside the observer's callback.
    pub fn cancel(&self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl Drop for AppLockSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Everything the guard persists, read in one go.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct CredentialRecord {
    /// Hex SHA-256 of the PIN, if one is set.
    pub pin_hash: Option<String>,
    /// Whether the app lock is on.
    pub app_lock_enabled: bool,
    /// Whether biometric unlock is on.
    pub biometric_enabled: bool,
    /// Whether an account was created on this install.
    pub has_persistent_account: bool,
    /// Address of that account.
    pub account_address: Option<String>,
}

/// App-lock credential guard.
///
/// All state lives in the injected [`SecureKeyValueStore`] except the wallet
/// account, which is cached for the lifetime of the guard. Accounts come from
/// the injected [`AccountGenerator`].
#[derive(uniffi::Object)]
pub struct CredentialGuard {
    store: Arc<dyn SecureKeyValueStore>,
    generator: Arc<dyn AccountGenerator>,
    account: Mutex<Option<Arc<WalletAccount>>>,
    app_lock: watch::Sender<bool>,
    observers: Mutex<Vec<Arc<ObserverSlot>>>,
}

impl std::fmt::Debug for CredentialGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGuard")
            .field("app_lock", &*self.app_lock.borrow())
            .finish_non_exhaustive()
    }
}

impl CredentialGuard {
    /// Watches the app-lock flag.
    #[must_use]
    pub fn subscribe_app_lock(&self) -> watch::Receiver<bool> {
        self.app_lock.subscribe()
    }

    fn account(&self) -> MutexGuard<'_, Option<Arc<WalletAccount>>> {
        self.account.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Arc<ObserverSlot>>> {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|slot| observer_in(slot).is_some());
        observers
    }

    fn get_flag(&self, key: &str) -> Result<bool, CredentialError> {
        Ok(self.store.get_bool(key.to_string())?.unwrap_or(false))
    }

    // Runs under the observer lock so registrations and changes are seen
    // by every observer in one order.
    fn publish_app_lock(&self, enabled: bool) {
        let observers = self.observers();
        let changed = self.app_lock.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
        if !changed {
            return;
        }

        for slot in observers.iter() {
            if let Some(observer) = observer_in(slot) {
                observer.on_app_lock_changed(enabled);
            }
        }
    }

    fn persist_account(
        &self,
        cached: &mut Option<Arc<WalletAccount>>,
    ) -> Result<Arc<WalletAccount>, CredentialError> {
        let account = Arc::new(WalletAccount::generate(self.generator.as_ref())?);
        self.store.apply(vec![
            StoreEdit::put_bool(HAS_PERSISTENT_ACCOUNT, true),
            StoreEdit::put_string(ACCOUNT_ADDRESS, account.address()),
        ])?;
        *cached = Some(Arc::clone(&account));
        Ok(account)
    }
}

#[uniffi::export]
impl CredentialGuard {
    /// Creates a guard over `store`, generating accounts with `generator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial app-lock flag cannot be read.
    #[uniffi::constructor]
    pub fn new(
        store: Arc<dyn SecureKeyValueStore>,
        generator: Arc<dyn AccountGenerator>,
    ) -> Result<Self, CredentialError> {
        let enabled = store.get_bool(APP_LOCK_ENABLED.to_string())?.unwrap_or(false);
        let (app_lock, _) = watch::channel(enabled);
        Ok(Self {
            store,
            generator,
            account: Mutex::new(None),
            app_lock,
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Stores the PIN hash and turns the app lock on.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidPin`] for an empty PIN, or the
    /// store's error.
    pub fn set_pin(&self, pin: &str) -> Result<(), CredentialError> {
        if pin.is_empty() {
            return Err(CredentialError::InvalidPin);
        }
        self.store.apply(vec![
            StoreEdit::put_string(PIN_HASH, hash_pin(pin)),
            StoreEdit::put_bool(APP_LOCK_ENABLED, true),
        ])?;
        log::info!("app lock PIN set");
        self.publish_app_lock(true);
        Ok(())
    }

    /// Whether `pin` matches the stored hash. `false` when no PIN is set.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn validate_pin(&self, pin: &str) -> Result<bool, CredentialError> {
        let Some(stored) = self.store.get_string(PIN_HASH.to_string())? else {
            return Ok(false);
        };
        let candidate = hash_pin(pin);
        Ok(candidate.as_bytes().ct_eq(stored.as_bytes()).into())
    }

    /// Whether a PIN hash is stored.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn is_pin_set(&self) -> Result<bool, CredentialError> {
        Ok(self.store.get_string(PIN_HASH.to_string())?.is_some())
    }

    /// Current app-lock flag.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn is_app_lock_enabled(&self) -> Result<bool, CredentialError> {
        self.get_flag(APP_LOCK_ENABLED)
    }

    /// Registers `observer`; it is called at once with the current state and
    /// again on every change, until the returned subscription is cancelled or
    /// dropped.
    ///
    /// Callbacks run one at a time. They may cancel subscriptions but must
    /// not register observers or change the PIN.
    pub fn observe_app_lock(
        &self,
        observer: Arc<dyn AppLockObserver>,
    ) -> Arc<AppLockSubscription> {
        let mut observers = self.observers();
        let current = *self.app_lock.borrow();
        observer.on_app_lock_changed(current);

        let slot = Arc::new(Mutex::new(Some(observer)));
        observers.push(Arc::clone(&slot));
        Arc::new(AppLockSubscription { slot })
    }

    /// Turns biometric unlock on or off.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn set_biometric_enabled(&self, enabled: bool) -> Result<(), CredentialError> {
        self.store
            .apply(vec![StoreEdit::put_bool(BIOMETRIC_ENABLED, enabled)])
    }

    /// Current biometric flag.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn is_biometric_enabled(&self) -> Result<bool, CredentialError> {
        self.get_flag(BIOMETRIC_ENABLED)
    }

    /// Clears the PIN and disables app lock and biometrics in one edit.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn remove_pin(&self) -> Result<(), CredentialError> {
        self.store.apply(vec![
            StoreEdit::remove(PIN_HASH),
            StoreEdit::put_bool(APP_LOCK_ENABLED, false),
            StoreEdit::put_bool(BIOMETRIC_ENABLED, false),
        ])?;
        log::info!("app lock PIN removed");
        self.publish_app_lock(false);
        Ok(())
    }

    /// Returns the cached account, or re-creates one if this install has
    /// created an account before. `None` when it never has.
    ///
    /// Only the address is persisted, so the re-created account has a new
    /// key and a new address.
    ///
    /// # Errors
    ///
    /// Returns the generator's or the store's error.
    pub fn initialize_persistent_account(
        &self,
    ) -> Result<Option<Arc<WalletAccount>>, CredentialError> {
        let mut cached = self.account();
        if let Some(account) = cached.as_ref() {
            return Ok(Some(Arc::clone(account)));
        }

        if !self.get_flag(HAS_PERSISTENT_ACCOUNT)? {
            return Ok(None);
        }

        let previous = self.store.get_string(ACCOUNT_ADDRESS.to_string())?;
        let account = self.persist_account(&mut cached)?;
        if previous.is_some_and(|previous| previous != account.address()) {
            log::warn!("stored wallet account could not be restored; a new address was generated");
        }
        Ok(Some(account))
    }

    /// Generates a new account, persists its address and caches it.
    ///
    /// # Errors
    ///
    /// Returns the generator's or the store's error.
    pub fn create_persistent_account(&self) -> Result<Arc<WalletAccount>, CredentialError> {
        let mut cached = self.account();
        self.persist_account(&mut cached)
    }

    /// Drops the cached account and its persisted flag and address.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn clear_account(&self) -> Result<(), CredentialError> {
        let mut cached = self.account();
        *cached = None;
        self.store.apply(vec![
            StoreEdit::remove(ACCOUNT_ADDRESS),
            StoreEdit::put_bool(HAS_PERSISTENT_ACCOUNT, false),
        ])
    }

    /// Snapshot of every persisted value.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn credential_record(&self) -> Result<CredentialRecord, CredentialError> {
        Ok(CredentialRecord {
            pin_hash: self.store.get_string(PIN_HASH.to_string())?,
            app_lock_enabled: self.get_flag(APP_LOCK_ENABLED)?,
            biometric_enabled: self.get_flag(BIOMETRIC_ENABLED)?,
            has_persistent_account: self.get_flag(HAS_PERSISTENT_ACCOUNT)?,
            account_address: self.store.get_string(ACCOUNT_ADDRESS.to_string())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::credential::account::{AccountKeys, MemoryAccountGenerator};
    use crate::credential::store::MemoryKeyValueStore;

    #[derive(Default)]
    struct RecordingObserver {
        states: Mutex<Vec<bool>>,
    }

    impl RecordingObserver {
        fn states(&self) -> Vec<bool> {
            self.states.lock().unwrap().clone()
        }
    }

    impl AppLockObserver for RecordingObserver {
        fn on_app_lock_changed(&self, enabled: bool) {
            self.states.lock().unwrap().push(enabled);
        }
    }

    fn guard_over(store: Arc<MemoryKeyValueStore>) -> CredentialGuard {
        CredentialGuard::new(store, Arc::new(MemoryAccountGenerator::new())).unwrap()
    }

    fn guard() -> (Arc<MemoryKeyValueStore>, CredentialGuard) {
        let store = Arc::new(MemoryKeyValueStore::new());
        (store.clone(), guard_over(store))
    }

    #[test]
    fn test_hash_pin_is_hex_sha256() {
        assert_eq!(
            hash_pin("1234"),
            "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4"
        );
    }

    #[test]
    fn test_set_and_validate_pin() {
        let (store, guard) = guard();
        assert!(!guard.validate_pin("1234").unwrap());

        guard.set_pin("1234").unwrap();
        assert_eq!(
            store.get_string(PIN_HASH.into()).unwrap(),
            Some(hash_pin("1234"))
        );
        assert!(guard.validate_pin("1234").unwrap());
        assert!(!guard.validate_pin("0000").unwrap());
        assert!(guard.is_pin_set().unwrap());
        assert!(guard.is_app_lock_enabled().unwrap());
    }

    #[test]
    fn test_empty_pin_is_rejected() {
        let (_, guard) = guard();
        assert!(matches!(guard.set_pin(""), Err(CredentialError::InvalidPin)));
        assert!(!guard.is_app_lock_enabled().unwrap());
    }

    #[test]
    fn test_remove_pin_clears_everything() {
        let (_, guard) = guard();
        guard.set_pin("1234").unwrap();
        guard.set_biometric_enabled(true).unwrap();

        guard.remove_pin().unwrap();
        assert!(!guard.validate_pin("1234").unwrap());
        assert!(!guard.is_pin_set().unwrap());
        assert!(!guard.is_app_lock_enabled().unwrap());
        assert!(!guard.is_biometric_enabled().unwrap());
    }

    #[test]
    fn test_app_lock_observers() {
        let (_, guard) = guard();
        let observer = Arc::new(RecordingObserver::default());
        let mut receiver = guard.subscribe_app_lock();
        let _subscription = guard.observe_app_lock(observer.clone());

        guard.set_pin("1234").unwrap();
        guard.set_pin("5678").unwrap();
        guard.remove_pin().unwrap();

        assert_eq!(observer.states(), vec![false, true, false]);
        assert!(receiver.has_changed().unwrap());
        assert!(!*receiver.borrow_and_update());
    }

    #[test]
    fn test_cancelled_observer_is_released() {
        let (_, guard) = guard();
        let observer = Arc::new(RecordingObserver::default());

        let subscription = guard.observe_app_lock(observer.clone());
        subscription.cancel();
        subscription.cancel();
        assert_eq!(Arc::strong_count(&observer), 1);

        guard.set_pin("1234").unwrap();
        assert_eq!(observer.states(), vec![false]);
        assert!(guard.observers().is_empty());
    }

    #[test]
    fn test_dropped_subscription_unregisters() {
        let (_, guard) = guard();
        let observer = Arc::new(RecordingObserver::default());

        for _ in 0..100 {
            drop(guard.observe_app_lock(observer.clone()));
        }
        let _kept = guard.observe_app_lock(observer.clone());

        assert_eq!(guard.observers().len(), 1);
        assert_eq!(Arc::strong_count(&observer), 2);
    }

    struct CancellingObserver {
        subscription: Mutex<Option<Arc<AppLockSubscription>>>,
        calls: Mutex<usize>,
    }

    impl AppLockObserver for CancellingObserver {
        fn on_app_lock_changed(&self, _enabled: bool) {
            *self.calls.lock().unwrap() += 1;
            if let Some(subscription) = self.subscription.lock().unwrap().take() {
                subscription.cancel();
            }
        }
    }

    #[test]
    fn test_observer_can_cancel_from_callback() {
        let (_, guard) = guard();
        let observer = Arc::new(CancellingObserver {
            subscription: Mutex::new(None),
            calls: Mutex::new(0),
        });
        let subscription = guard.observe_app_lock(observer.clone());
        *observer.subscription.lock().unwrap() = Some(subscription);

        guard.set_pin("1234").unwrap();
        guard.remove_pin().unwrap();
        assert_eq!(*observer.calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_late_observer_ends_on_latest_state() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let guard = Arc::new(guard_over(store));

        let toggler = thread::spawn({
            let guard = Arc::clone(&guard);
            move || {
                for _ in 0..200 {
                    guard.set_pin("1234").unwrap();
                    guard.remove_pin().unwrap();
                }
                guard.set_pin("1234").unwrap();
            }
        });

        let mut observers = Vec::new();
        for _ in 0..50 {
            let observer = Arc::new(RecordingObserver::default());
            let subscription = guard.observe_app_lock(observer.clone());
            observers.push((observer, subscription));
            thread::yield_now();
        }
        toggler.join().unwrap();

        for (observer, _) in &observers {
            let states = observer.states();
            assert_eq!(states.last(), Some(&true));
            assert!(states.windows(2).all(|pair| pair[0] != pair[1]));
        }
    }

    #[test]
    fn test_guard_reads_initial_lock_state() {
        let store = Arc::new(MemoryKeyValueStore::new());
        guard_over(store.clone()).set_pin("1").unwrap();

        let guard = guard_over(store);
        assert!(*guard.subscribe_app_lock().borrow());
    }

    #[test]
    fn test_no_account_without_flag() {
        let (_, guard) = guard();
        assert!(guard.initialize_persistent_account().unwrap().is_none());
    }

    #[test]
    fn test_account_is_cached() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let generator = Arc::new(MemoryAccountGenerator::new());
        let guard = CredentialGuard::new(store.clone(), generator.clone()).unwrap();

        let created = guard.create_persistent_account().unwrap();
        let first = guard.initialize_persistent_account().unwrap().unwrap();
        let second = guard.initialize_persistent_account().unwrap().unwrap();

        assert!(Arc::ptr_eq(&created, &first));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(generator.generated(), 1);
        assert_eq!(
            store.get_string(ACCOUNT_ADDRESS.into()).unwrap(),
            Some(first.address())
        );
    }

    struct FailingGenerator;

    impl AccountGenerator for FailingGenerator {
        fn generate(&self) -> Result<AccountKeys, CredentialError> {
            Err(CredentialError::InvalidAccount("sdk unavailable".into()))
        }
    }

    #[test]
    fn test_generator_failure_persists_nothing() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let guard = CredentialGuard::new(store.clone(), Arc::new(FailingGenerator)).unwrap();

        assert!(matches!(
            guard.create_persistent_account(),
            Err(CredentialError::InvalidAccount(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_flagged_account_is_regenerated_in_new_process() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let original = guard_over(store.clone())
            .create_persistent_account()
            .unwrap()
            .address();

        let guard = guard_over(store);
        let account = guard.initialize_persistent_account().unwrap().unwrap();
        assert_ne!(account.address(), original);

        let record = guard.credential_record().unwrap();
        assert!(record.has_persistent_account);
        assert_eq!(record.account_address, Some(account.address()));
    }

    #[test]
    fn test_clear_account() {
        let (_, guard) = guard();
        guard.create_persistent_account().unwrap();

        guard.clear_account().unwrap();
        assert!(guard.initialize_persistent_account().unwrap().is_none());
        let record = guard.credential_record().unwrap();
        assert!(!record.has_persistent_account);
        assert_eq!(record.account_address, None);
    }
}
