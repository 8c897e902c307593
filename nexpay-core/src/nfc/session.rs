//! Reading / sharing state machine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strum::EnumString;
use tokio::sync::oneshot;

use super::apdu::ApduResponder;
use super::ndef::{decode_message, NdefMessage};
use super::platform::{NfcPlatform, NfcTag, WalletAddressListener};
use super::reader::CardReader;
use super::slot::SharedAddressSlot;
use crate::config::NfcConfig;
use crate::error::NfcResult;

/// Lifecycle of a [`NfcSessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SessionState {
    /// The adapter has not been bound yet.
    Uninitialized,
    /// Adapter bound, nothing in progress.
    Idle,
    /// Waiting for another device or a tag to be tapped.
    Reading,
    /// Publishing an address to readers.
    Sharing,
}

/// Snapshot of the sharing side.
///
/// `sharing_address` is `Some` exactly when `is_sharing` is `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct SharingSession {
    /// Whether an address is being shared.
    pub is_sharing: bool,
    /// The shared address.
    pub sharing_address: Option<String>,
}

/// Kind of discovery event delivered by the OS.
///
/// Parses Android intent action strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, uniffi::Enum)]
pub enum NfcAction {
    /// A tag with an NDEF message matching the app's filter.
    #[strum(serialize = "android.nfc.action.NDEF_DISCOVERED")]
    NdefDiscovered,
    /// A tag with a technology matching the app's filter.
    #[strum(serialize = "android.nfc.action.TECH_DISCOVERED")]
    TechDiscovered,
    /// Any other tag.
    #[strum(serialize = "android.nfc.action.TAG_DISCOVERED")]
    TagDiscovered,
    /// Not an NFC event.
    Other,
}

/// Maps an Android intent action to an [`NfcAction`].
#[uniffi::export]
#[must_use]
pub fn nfc_action_from_intent(action: &str) -> NfcAction {
    action.parse().unwrap_or(NfcAction::Other)
}

struct SessionInner {
    state: SessionState,
    adapter_bound: bool,
    dispatch_armed: bool,
    listener: Option<Arc<dyn WalletAddressListener>>,
    waiters: Vec<oneshot::Sender<String>>,
    sharing: SharingSession,
}

impl SessionInner {
    const fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            adapter_bound: false,
            dispatch_armed: false,
            listener: None,
            waiters: Vec::new(),
            sharing: SharingSession {
                is_sharing: false,
                sharing_address: None,
            },
        }
    }

    const fn has_active_session(&self) -> bool {
        matches!(self.state, SessionState::Reading | SessionState::Sharing)
    }

    fn settle_idle(&mut self) {
        if self.adapter_bound {
            self.state = SessionState::Idle;
        }
    }
}

/// Coordinates NFC reading and sharing for one app process.
///
/// The manager owns the [`SharedAddressSlot`] consulted by its
/// [`ApduResponder`]; the platform HCE service obtains that responder through
/// [`NfcSessionManager::apdu_responder`].
///
/// No method returns an error: failures are reported as [`NfcResult`] or
/// logged and swallowed.
#[derive(uniffi::Object)]
pub struct NfcSessionManager {
    platform: Arc<dyn NfcPlatform>,
    config: NfcConfig,
    slot: SharedAddressSlot,
    responder: Arc<ApduResponder>,
    reader: CardReader,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for NfcSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfcSessionManager")
            .field("state", &self.lock().state)
            .finish_non_exhaustive()
    }
}

impl NfcSessionManager {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the adapter if needed and reports whether hardware exists.
    fn ensure_adapter(&self) -> bool {
        let mut inner = self.lock();
        if inner.adapter_bound {
            return true;
        }
        match self.platform.bind_adapter() {
            Ok(true) => {
                inner.adapter_bound = true;
                if inner.state == SessionState::Uninitialized {
                    inner.state = SessionState::Idle;
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::warn!("failed to bind NFC adapter: {e}");
                false
            }
        }
    }

    fn availability(&self) -> NfcResult {
        if !self.is_nfc_available() {
            return NfcResult::NotAvailable;
        }
        if !self.is_nfc_enabled() {
            return NfcResult::NotEnabled;
        }
        NfcResult::Success
    }

    fn arm_dispatch(&self, inner: &mut SessionInner) -> NfcResult {
        if inner.dispatch_armed {
            return NfcResult::Success;
        }
        match self.platform.enable_foreground_dispatch() {
            Ok(()) => {
                inner.dispatch_armed = true;
                NfcResult::Success
            }
            Err(e) => e.into(),
        }
    }

    fn disarm_dispatch(&self, inner: &mut SessionInner) {
        if !inner.dispatch_armed {
            return;
        }
        if let Err(e) = self.platform.disable_foreground_dispatch() {
            log::warn!("failed to disable foreground dispatch: {e}");
        }
        inner.dispatch_armed = false;
    }

    fn end_sharing(&self, inner: &mut SessionInner) {
        inner.sharing = SharingSession::default();
        self.slot.clear();
    }

    fn end_reading(inner: &mut SessionInner) {
        inner.listener = None;
        // Dropping the senders resolves pending waiters with `None`.
        inner.waiters.clear();
    }

    /// The shared slot, for wiring additional responders.
    #[must_use]
    pub fn shared_slot(&self) -> SharedAddressSlot {
        self.slot.clone()
    }

    /// Hands `address` to the listener and every pending waiter.
    ///
    /// Foreign callbacks run after the session lock is released.
    fn deliver(&self, address: String) {
        let (listener, waiters) = {
            let mut inner = self.lock();
            if inner.state != SessionState::Reading {
                log::debug!("dropping wallet address read outside a reading session");
                return;
            }
            (inner.listener.clone(), std::mem::take(&mut inner.waiters))
        };

        log::info!("received wallet address over NFC");
        for waiter in waiters {
            let _ = waiter.send(address.clone());
        }
        if let Some(listener) = listener {
            listener.on_wallet_address(address);
        }
    }

    fn deliver_from_messages(&self, messages: &[NdefMessage]) -> bool {
        let mut delivered = false;
        for message in messages {
            // First decodable record per message; every message may deliver.
            if let Some(address) = decode_message(message, &self.config.uri_prefix) {
                self.deliver(address);
                delivered = true;
            }
        }
        delivered
    }

    async fn handle_tag(&self, tag: Arc<dyn NfcTag>) {
        if let Some(address) = self.reader.read_address_async(Arc::clone(&tag)).await {
            self.deliver(address);
            return;
        }

        log::debug!("HCE read missed, falling back to NDEF");
        match self.reader.read_ndef_address_async(tag).await {
            Some(address) => self.deliver(address),
            None => log::debug!("tag carried no wallet address"),
        }
    }

    /// Routes one discovery event to the NDEF or tag path.
    pub async fn handle_event(
        &self,
        action: NfcAction,
        messages: &[NdefMessage],
        tag: Option<Arc<dyn NfcTag>>,
    ) {
        {
            let inner = self.lock();
            if inner.state != SessionState::Reading {
                log::debug!("ignoring {action:?} while {:?}", inner.state);
                return;
            }
        }

        match action {
            NfcAction::NdefDiscovered if !messages.is_empty() => {
                if !self.deliver_from_messages(messages) {
                    log::debug!("no wallet record in {} NDEF message(s)", messages.len());
                }
            }
            NfcAction::NdefDiscovered | NfcAction::TechDiscovered | NfcAction::TagDiscovered => {
                match tag {
                    Some(tag) => self.handle_tag(tag).await,
                    None => log::warn!("{action:?} event without a tag"),
                }
            }
            NfcAction::Other => log::debug!("ignoring non-NFC action"),
        }
    }
}

#[uniffi::export]
impl NfcSessionManager {
    /// Creates a manager with the default [`NfcConfig`].
    #[uniffi::constructor]
    #[must_use]
    pub fn new(platform: Arc<dyn NfcPlatform>) -> Self {
        Self::with_config(platform, NfcConfig::default())
    }

    /// Creates a manager with a custom configuration.
    ///
    /// An invalid configuration is replaced by the default one.
    #[uniffi::constructor]
    #[must_use]
    pub fn with_config(platform: Arc<dyn NfcPlatform>, config: NfcConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("ignoring NFC config: {e}");
                NfcConfig::default()
            }
        };
        let slot = SharedAddressSlot::new();
        let responder = Arc::new(ApduResponder::new(slot.clone()));
        let reader = CardReader::new(&config);
        Self {
            platform,
            config,
            slot,
            responder,
            reader,
            inner: Mutex::new(SessionInner::new()),
        }
    }

    /// Whether the device has NFC hardware. Never fails.
    #[must_use]
    pub fn is_nfc_available(&self) -> bool {
        self.ensure_adapter()
    }

    /// Whether the NFC radio is on. Never fails.
    #[must_use]
    pub fn is_nfc_enabled(&self) -> bool {
        if !self.ensure_adapter() {
            return false;
        }
        self.platform.is_enabled().unwrap_or_else(|e| {
            log::warn!("failed to query NFC state: {e}");
            false
        })
    }

    /// Starts listening for wallet addresses.
    ///
    /// Foreground dispatch is armed now if an activity is in the foreground,
    /// otherwise by the next [`Self::on_resume`]. Ends a sharing session if
    /// one is active.
    pub fn start_reading(&self, listener: Arc<dyn WalletAddressListener>) -> NfcResult {
        let availability = self.availability();
        if !availability.is_success() {
            return availability;
        }

        let mut inner = self.lock();
        if inner.state == SessionState::Sharing {
            log::info!("switching from sharing to reading");
            self.end_sharing(&mut inner);
        }
        inner.listener = Some(listener);
        inner.state = SessionState::Reading;

        if let NfcResult::Error { message } = self.arm_dispatch(&mut inner) {
            log::warn!("reading without foreground dispatch until resumed: {message}");
        }
        NfcResult::Success
    }

    /// Stops listening. Safe to call repeatedly.
    pub fn stop_reading(&self) {
        let mut inner = self.lock();
        Self::end_reading(&mut inner);
        if inner.state == SessionState::Reading {
            self.disarm_dispatch(&mut inner);
            inner.settle_idle();
        }
    }

    /// Publishes `address` to the HCE responder.
    ///
    /// Foreground dispatch is armed as a fallback for direct taps; failing to
    /// arm it does not fail sharing. Ends a reading session if one is active.
    pub fn start_sharing(&self, address: String) -> NfcResult {
        let availability = self.availability();
        if !availability.is_success() {
            return availability;
        }

        let mut inner = self.lock();
        if inner.state == SessionState::Reading {
            log::info!("switching from reading to sharing");
            Self::end_reading(&mut inner);
        }

        self.slot.publish(address.clone());
        inner.sharing = SharingSession {
            is_sharing: true,
            sharing_address: Some(address),
        };
        inner.state = SessionState::Sharing;

        if let NfcResult::Error { message } = self.arm_dispatch(&mut inner) {
            log::warn!("sharing without foreground dispatch: {message}");
        }
        NfcResult::Success
    }

    /// Clears the shared address. Safe to call repeatedly.
    pub fn stop_sharing(&self) {
        let mut inner = self.lock();
        self.end_sharing(&mut inner);
        if inner.state == SessionState::Sharing {
            self.disarm_dispatch(&mut inner);
            inner.settle_idle();
        }
    }

    /// Reserved for writing to a physical tag; currently a no-op.
    #[allow(clippy::unused_self, clippy::needless_pass_by_value)]
    pub fn write_wallet_address(&self, address: String) -> NfcResult {
        log::debug!("tag write requested for {} byte address", address.len());
        NfcResult::Success
    }

    /// Re-arms foreground dispatch when the UI returns to the foreground.
    pub fn on_resume(&self) {
        let mut inner = self.lock();
        if !inner.has_active_session() {
            return;
        }
        if let NfcResult::Error { message } = self.arm_dispatch(&mut inner) {
            log::warn!("failed to re-arm foreground dispatch: {message}");
        }
    }

    /// Disarms foreground dispatch when the UI leaves the foreground.
    pub fn on_pause(&self) {
        let mut inner = self.lock();
        self.disarm_dispatch(&mut inner);
    }

    /// The responder the platform HCE service forwards APDUs to.
    #[must_use]
    pub fn apdu_responder(&self) -> Arc<ApduResponder> {
        Arc::clone(&self.responder)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Snapshot of the sharing session.
    #[must_use]
    pub fn active_session(&self) -> SharingSession {
        self.lock().sharing.clone()
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl NfcSessionManager {
    /// Entry point for NFC intents / reader-session callbacks.
    ///
    /// Tag I/O runs on the blocking pool. Errors are logged; the listener is
    /// simply not called for a tag that carried no address.
    pub async fn handle_nfc_intent(
        &self,
        action: NfcAction,
        messages: Vec<NdefMessage>,
        tag: Option<Arc<dyn NfcTag>>,
    ) {
        self.handle_event(action, &messages, tag).await;
    }

    /// Resolves with the next address delivered while reading.
    ///
    /// Resolves with `None` immediately when not reading, or once reading
    /// stops.
    pub async fn next_address(&self) -> Option<String> {
        let receiver = {
            let mut inner = self.lock();
            if inner.state != SessionState::Reading {
                return None;
            }
            let (sender, receiver) = oneshot::channel();
            inner.waiters.push(sender);
            receiver
        };
        receiver.await.ok()
    }
}
