use serde::Deserialize;

use crate::error::ConfigError;

/// Application identifier the `NexPay` HCE service registers for.
pub const WALLET_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];

/// Prefix of the URI record carrying a wallet address.
pub const WALLET_URI_PREFIX: &str = "nexpay://wallet/";

/// Language tag written into NDEF text records.
pub const TEXT_RECORD_LANGUAGE: &str = "en";

// ISO/IEC 7816-5 registered AIDs are 5 to 16 bytes long.
const AID_LEN_RANGE: std::ops::RangeInclusive<usize> = 5..=16;

// The text record status byte stores the language length in 6 bits.
const MAX_LANGUAGE_LEN: usize = 0x3F;

/// Tunables of the NFC exchange.
///
/// The defaults match what the published Android and iOS apps expect, so
/// only test builds and white-label variants should need to override them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct NfcConfig {
    /// Application identifier sent in the `SELECT` command.
    pub aid: Vec<u8>,
    /// URI prefix used for wallet URI records.
    pub uri_prefix: String,
    /// Language tag used for wallet text records.
    pub text_language: String,
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            aid: WALLET_AID.to_vec(),
            uri_prefix: WALLET_URI_PREFIX.to_string(),
            text_language: TEXT_RECORD_LANGUAGE.to_string(),
        }
    }
}

impl NfcConfig {
    /// Parses a JSON configuration, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] for invalid JSON and
    /// [`ConfigError::InvalidField`] if a value cannot be put on the wire.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field fits its wire encoding.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !AID_LEN_RANGE.contains(&self.aid.len()) {
            return Err(ConfigError::InvalidField {
                field: "aid",
                reason: format!("expected 5 to 16 bytes, got {}", self.aid.len()),
            });
        }
        if self.uri_prefix.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "uri_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        let language_len = self.text_language.len();
        if language_len == 0 || language_len > MAX_LANGUAGE_LEN {
            return Err(ConfigError::InvalidField {
                field: "text_language",
                reason: format!("expected 1 to 63 bytes, got {language_len}"),
            });
        }
        Ok(())
    }
}

/// Loads an [`NfcConfig`] from JSON.
///
/// # Errors
///
/// See [`NfcConfig::from_json`].
#[uniffi::export]
#[allow(clippy::needless_pass_by_value)]
pub fn nfc_config_from_json(json: String) -> Result<NfcConfig, ConfigError> {
    NfcConfig::from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NfcConfig::default();
        config.validate().unwrap();
        assert_eq!(config.aid, WALLET_AID);
        assert_eq!(config.uri_prefix, "nexpay://wallet/");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = NfcConfig::from_json(r#"{"text_language": "de"}"#).unwrap();
        assert_eq!(config.text_language, "de");
        assert_eq!(config.aid, WALLET_AID);
    }

    #[test]
    fn test_short_aid_is_rejected() {
        let err = NfcConfig::from_json(r#"{"aid": [1, 2]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "aid", .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = NfcConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }
}
