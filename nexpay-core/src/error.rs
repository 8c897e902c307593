use thiserror::Error;

/// Terminal outcome of every NFC operation exposed to the app.
///
/// NFC operations never return an `Err` across the FFI boundary; platform
/// failures are folded into [`NfcResult::Error`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum NfcResult {
    /// The operation completed.
    Success,
    /// A platform call failed or a precondition was not met.
    Error {
        /// Human readable reason.
        message: String,
    },
    /// The device has no NFC hardware.
    NotAvailable,
    /// NFC hardware exists but the radio is switched off.
    NotEnabled,
    /// The app is not allowed to use NFC.
    PermissionDenied,
}

impl NfcResult {
    /// Returns `true` for [`NfcResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<NfcTransportError> for NfcResult {
    fn from(error: NfcTransportError) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }
}

/// Errors raised by the platform NFC traits.
#[derive(Debug, Error, uniffi::Error)]
pub enum NfcTransportError {
    /// The NFC adapter could not be queried or configured.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Foreground dispatch needs a visible activity / view controller.
    #[error("no foreground activity available")]
    NoActivity,

    /// Connecting to the tag technology failed.
    #[error("tag connection error: {0}")]
    Connection(String),

    /// Exchanging bytes with a connected tag failed.
    #[error("transceive error: {0}")]
    Transceive(String),

    /// The tag left the field before the exchange finished.
    #[error("tag lost")]
    TagLost,

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for NfcTransportError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Errors raised by the credential guard and its backing store.
#[derive(Debug, Error, uniffi::Error)]
pub enum CredentialError {
    /// The encrypted key-value store failed.
    #[error("credential store error: {0}")]
    Store(String),

    /// A stored value has a different type than expected.
    #[error("type mismatch for key {key}")]
    TypeMismatch {
        /// Key holding the unexpected value.
        key: String,
    },

    /// PINs must not be empty.
    #[error("invalid pin")]
    InvalidPin,

    /// The account generator returned a malformed address or key.
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for CredentialError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Errors raised while loading [`crate::NfcConfig`].
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum ConfigError {
    /// The configuration is not valid JSON for the expected shape.
    #[error("malformed config: {0}")]
    Malformed(String),
    /// A field is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Offending field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
