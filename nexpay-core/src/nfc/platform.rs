//! Capability traits implemented by the Android and iOS adapters.

use std::sync::Arc;

use crate::error::NfcTransportError;

/// The device's NFC adapter and foreground-dispatch hooks.
#[uniffi::export(with_foreign)]
pub trait NfcPlatform: Send + Sync {
    /// Binds the adapter to the current context.
    ///
    /// Returns `false` when the device has no NFC hardware. Called again on
    /// later queries until it reports an adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be queried.
    fn bind_adapter(&self) -> Result<bool, NfcTransportError>;

    /// Whether the NFC radio is switched on.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be queried.
    fn is_enabled(&self) -> Result<bool, NfcTransportError>;

    /// Routes tag discoveries to the foreground app.
    ///
    /// # Errors
    ///
    /// Returns [`NfcTransportError::NoActivity`] when nothing is in the
    /// foreground, or another error if the platform call fails.
    fn enable_foreground_dispatch(&self) -> Result<(), NfcTransportError>;

    /// Stops routing tag discoveries to the app.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform call fails.
    fn disable_foreground_dispatch(&self) -> Result<(), NfcTransportError>;
}

/// A tag handed over by a discovery event.
#[uniffi::export(with_foreign)]
pub trait NfcTag: Send + Sync {
    /// Tag UID, for logging.
    fn id(&self) -> Vec<u8>;

    /// ISO-DEP technology, when the tag supports it.
    fn iso_dep(&self) -> Option<Arc<dyn IsoDepConnection>>;

    /// NDEF technology, when the tag supports it.
    fn ndef(&self) -> Option<Arc<dyn NdefConnection>>;
}

/// Blocking ISO 14443-4 channel to a tag.
#[uniffi::export(with_foreign)]
pub trait IsoDepConnection: Send + Sync {
    /// Opens the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag cannot be connected.
    fn connect(&self) -> Result<(), NfcTransportError>;

    /// Sends a command APDU and waits for the response APDU.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the tag left the field.
    fn transceive(&self, command: Vec<u8>) -> Result<Vec<u8>, NfcTransportError>;

    /// Closes the channel. Must be safe to call when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform reports one.
    fn close(&self) -> Result<(), NfcTransportError>;
}

/// Blocking NDEF access to a tag.
#[uniffi::export(with_foreign)]
pub trait NdefConnection: Send + Sync {
    /// Opens the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag cannot be connected.
    fn connect(&self) -> Result<(), NfcTransportError>;

    /// Reads the tag's NDEF message in binary form, `None` if it holds none.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn read_message(&self) -> Result<Option<Vec<u8>>, NfcTransportError>;

    /// Closes the connection. Must be safe to call when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform reports one.
    fn close(&self) -> Result<(), NfcTransportError>;
}

/// Receives wallet addresses read from another device or a tag.
///
/// Implementations post to the UI thread themselves; calls arrive on
/// whichever thread handled the discovery event.
#[uniffi::export(with_foreign)]
pub trait WalletAddressListener: Send + Sync {
    /// Called once per decoded address.
    fn on_wallet_address(&self, address: String);
}
