//! In-memory NFC adapter, tags and listener.
//!
//! These stand in for the Android / iOS adapters in unit and integration
//! tests. [`MemoryIsoDep::emulating`] wires a reader directly to another
//! device's [`ApduResponder`], so a full tap can be exercised in-process.

#![allow(clippy::significant_drop_tightening)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::apdu::ApduResponder;
use super::platform::{
    IsoDepConnection, NdefConnection, NfcPlatform, NfcTag, WalletAddressListener,
};
use crate::error::NfcTransportError;

/// Adapter whose hardware / radio / activity state is set by the test.
#[derive(Debug)]
pub struct MemoryNfcPlatform {
    /// Whether NFC hardware exists.
    pub has_adapter: AtomicBool,
    /// Whether the radio is on.
    pub enabled: AtomicBool,
    /// Whether an activity is in the foreground.
    pub has_activity: AtomicBool,
    /// Whether foreground dispatch is currently armed.
    pub dispatch_armed: AtomicBool,
    /// Number of `bind_adapter` calls.
    pub bind_calls: AtomicUsize,
}

impl MemoryNfcPlatform {
    /// A device with NFC switched on and an activity in the foreground.
    #[must_use]
    pub const fn ready() -> Self {
        Self {
            has_adapter: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            has_activity: AtomicBool::new(true),
            dispatch_armed: AtomicBool::new(false),
            bind_calls: AtomicUsize::new(0),
        }
    }

    /// A device without NFC hardware.
    #[must_use]
    pub fn without_adapter() -> Self {
        let platform = Self::ready();
        platform.has_adapter.store(false, Ordering::SeqCst);
        platform
    }

    /// A device with NFC hardware and the radio switched off.
    #[must_use]
    pub fn disabled() -> Self {
        let platform = Self::ready();
        platform.enabled.store(false, Ordering::SeqCst);
        platform
    }

    /// Whether foreground dispatch is armed.
    #[must_use]
    pub fn is_dispatch_armed(&self) -> bool {
        self.dispatch_armed.load(Ordering::SeqCst)
    }
}

impl NfcPlatform for MemoryNfcPlatform {
    fn bind_adapter(&self) -> Result<bool, NfcTransportError> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_adapter.load(Ordering::SeqCst))
    }

    fn is_enabled(&self) -> Result<bool, NfcTransportError> {
        Ok(self.has_adapter.load(Ordering::SeqCst) && self.enabled.load(Ordering::SeqCst))
    }

    fn enable_foreground_dispatch(&self) -> Result<(), NfcTransportError> {
        if !self.has_activity.load(Ordering::SeqCst) {
            return Err(NfcTransportError::NoActivity);
        }
        self.dispatch_armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_foreground_dispatch(&self) -> Result<(), NfcTransportError> {
        self.dispatch_armed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

enum IsoDepBehaviour {
    Scripted(Vec<u8>),
    Emulating(Arc<ApduResponder>),
    Failing,
}

/// ISO-DEP channel that records commands and counts closes.
pub struct MemoryIsoDep {
    behaviour: IsoDepBehaviour,
    commands: Mutex<Vec<Vec<u8>>>,
    /// Number of `close` calls.
    pub close_count: AtomicUsize,
}

impl MemoryIsoDep {
    fn with_behaviour(behaviour: IsoDepBehaviour) -> Self {
        Self {
            behaviour,
            commands: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Answers every command with `response`.
    #[must_use]
    pub fn scripted(response: Vec<u8>) -> Self {
        Self::with_behaviour(IsoDepBehaviour::Scripted(response))
    }

    /// Forwards every command to another device's responder.
    #[must_use]
    pub fn emulating(responder: Arc<ApduResponder>) -> Self {
        Self::with_behaviour(IsoDepBehaviour::Emulating(responder))
    }

    /// Fails every transceive with [`NfcTransportError::TagLost`].
    #[must_use]
    pub fn failing() -> Self {
        Self::with_behaviour(IsoDepBehaviour::Failing)
    }

    /// Commands received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl IsoDepConnection for MemoryIsoDep {
    fn connect(&self) -> Result<(), NfcTransportError> {
        Ok(())
    }

    fn transceive(&self, command: Vec<u8>) -> Result<Vec<u8>, NfcTransportError> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).push(command.clone());
        match &self.behaviour {
            IsoDepBehaviour::Scripted(response) => Ok(response.clone()),
            IsoDepBehaviour::Emulating(responder) => Ok(responder.respond(&command)),
            IsoDepBehaviour::Failing => Err(NfcTransportError::TagLost),
        }
    }

    fn close(&self) -> Result<(), NfcTransportError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// NDEF connection holding a fixed binary message.
pub struct MemoryNdef {
    message: Option<Vec<u8>>,
    /// Number of `close` calls.
    pub close_count: AtomicUsize,
}

impl MemoryNdef {
    /// A tag holding `message`.
    #[must_use]
    pub const fn holding(message: Vec<u8>) -> Self {
        Self {
            message: Some(message),
            close_count: AtomicUsize::new(0),
        }
    }

    /// A formatted tag without a message.
    #[must_use]
    pub const fn blank() -> Self {
        Self {
            message: None,
            close_count: AtomicUsize::new(0),
        }
    }
}

impl NdefConnection for MemoryNdef {
    fn connect(&self) -> Result<(), NfcTransportError> {
        Ok(())
    }

    fn read_message(&self) -> Result<Option<Vec<u8>>, NfcTransportError> {
        Ok(self.message.clone())
    }

    fn close(&self) -> Result<(), NfcTransportError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Tag exposing any combination of the two technologies.
#[derive(Default)]
pub struct MemoryTag {
    iso_dep: Option<Arc<MemoryIsoDep>>,
    ndef: Option<Arc<MemoryNdef>>,
}

impl MemoryTag {
    /// Tag supporting ISO-DEP only.
    #[must_use]
    pub const fn with_iso_dep(iso_dep: Arc<MemoryIsoDep>) -> Self {
        Self {
            iso_dep: Some(iso_dep),
            ndef: None,
        }
    }

    /// Tag supporting NDEF only.
    #[must_use]
    pub const fn with_ndef(ndef: Arc<MemoryNdef>) -> Self {
        Self {
            iso_dep: None,
            ndef: Some(ndef),
        }
    }

    /// Tag supporting both technologies.
    #[must_use]
    pub const fn with_both(iso_dep: Arc<MemoryIsoDep>, ndef: Arc<MemoryNdef>) -> Self {
        Self {
            iso_dep: Some(iso_dep),
            ndef: Some(ndef),
        }
    }
}

impl NfcTag for MemoryTag {
    fn id(&self) -> Vec<u8> {
        vec![0x04, 0x4E, 0x58, 0x50]
    }

    fn iso_dep(&self) -> Option<Arc<dyn IsoDepConnection>> {
        self.iso_dep
            .clone()
            .map(|iso_dep| iso_dep as Arc<dyn IsoDepConnection>)
    }

    fn ndef(&self) -> Option<Arc<dyn NdefConnection>> {
        self.ndef.clone().map(|ndef| ndef as Arc<dyn NdefConnection>)
    }
}

/// Listener that records every delivered address.
#[derive(Debug, Default)]
pub struct RecordingListener {
    addresses: Mutex<Vec<String>>,
}

impl RecordingListener {
    /// Addresses delivered so far.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl WalletAddressListener for RecordingListener {
    fn on_wallet_address(&self, address: String) {
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner).push(address);
    }
}
