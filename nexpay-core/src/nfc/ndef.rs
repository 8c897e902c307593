//! NDEF records carrying a wallet address.
//!
//! A shared address is written as two well-known records:
//!
//! ```text
//! T: <status: lang len in bits 0..6> <lang> <UTF-8 address>
//! U: <abbreviation code = 0x00> "nexpay://wallet/" <address>
//! ```
//!
//! Decoding is lenient: any record that does not look like one of the above
//! yields `None` and the caller moves on to the next record.
//!
//! [`NdefMessage::parse`] and [`NdefMessage::to_bytes`] implement the NFC Forum
//! binary layout for platforms that only hand over raw message bytes.

use thiserror::Error;

use crate::config::{NfcConfig, TEXT_RECORD_LANGUAGE, WALLET_URI_PREFIX};

/// Well-known record type of text records.
pub const RTD_TEXT: &[u8] = b"T";

/// Well-known record type of URI records.
pub const RTD_URI: &[u8] = b"U";

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const LANGUAGE_LEN_MASK: u8 = 0x3F;
const URI_NO_ABBREVIATION: u8 = 0x00;

/// Type name format of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Tnf {
    /// No type, id or payload.
    Empty,
    /// NFC Forum well-known type (`T`, `U`, ...).
    WellKnown,
    /// RFC 2046 media type.
    MimeMedia,
    /// RFC 3986 absolute URI.
    AbsoluteUri,
    /// NFC Forum external type.
    External,
    /// Unknown payload type.
    Unknown,
    /// Continuation chunk.
    Unchanged,
    /// Reserved value `0x07`.
    Reserved,
}

impl Tnf {
    /// Decodes the low three bits of a record header.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & TNF_MASK {
            0x00 => Self::Empty,
            0x01 => Self::WellKnown,
            0x02 => Self::MimeMedia,
            0x03 => Self::AbsoluteUri,
            0x04 => Self::External,
            0x05 => Self::Unknown,
            0x06 => Self::Unchanged,
            _ => Self::Reserved,
        }
    }

    /// Encodes into the low three bits of a record header.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::WellKnown => 0x01,
            Self::MimeMedia => 0x02,
            Self::AbsoluteUri => 0x03,
            Self::External => 0x04,
            Self::Unknown => 0x05,
            Self::Unchanged => 0x06,
            Self::Reserved => 0x07,
        }
    }
}

/// One NDEF record.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct NdefRecord {
    /// Type name format.
    pub tnf: Tnf,
    /// Record type, interpreted according to `tnf`.
    pub record_type: Vec<u8>,
    /// Optional record identifier.
    pub id: Vec<u8>,
    /// Record payload.
    pub payload: Vec<u8>,
}

/// An ordered list of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct NdefMessage {
    /// Records in wire order.
    pub records: Vec<NdefRecord>,
}

/// Errors from the binary message layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NdefError {
    /// The buffer ended inside a record.
    #[error("truncated record at offset {offset}")]
    Truncated {
        /// Offset of the record header.
        offset: usize,
    },
    /// The first record does not carry the message-begin flag.
    #[error("first record is missing the MB flag")]
    MissingMessageBegin,
    /// A later record carries the message-begin flag.
    #[error("unexpected MB flag at offset {offset}")]
    UnexpectedMessageBegin {
        /// Offset of the record header.
        offset: usize,
    },
    /// No record carries the message-end flag.
    #[error("message has no ME record")]
    MissingMessageEnd,
    /// Bytes follow the message-end record.
    #[error("{0} trailing bytes after the last record")]
    TrailingBytes(usize),
    /// Chunked records are not supported.
    #[error("chunked records are not supported")]
    ChunkedRecord,
    /// A type or id field is longer than 255 bytes.
    #[error("{field} longer than 255 bytes")]
    FieldTooLong {
        /// Which field.
        field: &'static str,
    },
    /// A payload does not fit in 32 bits.
    #[error("payload too large")]
    PayloadTooLarge,
}

impl NdefRecord {
    /// Builds a well-known text record.
    ///
    /// Language tags longer than 63 bytes are cut to fit the status byte.
    #[must_use]
    pub fn text(language: &str, text: &str) -> Self {
        let language = &language.as_bytes()[..language.len().min(LANGUAGE_LEN_MASK.into())];
        let mut payload = Vec::with_capacity(1 + language.len() + text.len());
        // bit 7 clear: UTF-8
        payload.push(u8::try_from(language.len()).unwrap_or(LANGUAGE_LEN_MASK));
        payload.extend_from_slice(language);
        payload.extend_from_slice(text.as_bytes());
        Self {
            tnf: Tnf::WellKnown,
            record_type: RTD_TEXT.to_vec(),
            id: Vec::new(),
            payload,
        }
    }

    /// Builds a well-known URI record without prefix abbreviation.
    #[must_use]
    pub fn uri(uri: &str) -> Self {
        let mut payload = Vec::with_capacity(1 + uri.len());
        payload.push(URI_NO_ABBREVIATION);
        payload.extend_from_slice(uri.as_bytes());
        Self {
            tnf: Tnf::WellKnown,
            record_type: RTD_URI.to_vec(),
            id: Vec::new(),
            payload,
        }
    }

    fn is_well_known(&self, record_type: &[u8]) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == record_type
    }
}

/// Text record carrying `address`, tagged with the default language.
#[must_use]
pub fn encode_text(address: &str) -> NdefRecord {
    NdefRecord::text(TEXT_RECORD_LANGUAGE, address)
}

/// URI record `nexpay://wallet/<address>`.
#[must_use]
pub fn encode_uri(address: &str) -> NdefRecord {
    NdefRecord::uri(&format!("{WALLET_URI_PREFIX}{address}"))
}

/// The two-record message written for a shared address.
#[must_use]
pub fn encode_wallet_address(address: &str, config: &NfcConfig) -> NdefMessage {
    NdefMessage {
        records: vec![
            NdefRecord::text(&config.text_language, address),
            NdefRecord::uri(&format!("{}{address}", config.uri_prefix)),
        ],
    }
}

/// Extracts a wallet address from a text or URI record.
#[must_use]
pub fn decode_record(record: &NdefRecord) -> Option<String> {
    decode_record_with_prefix(record, WALLET_URI_PREFIX)
}

/// Like [`decode_record`] with a custom URI prefix.
#[must_use]
pub fn decode_record_with_prefix(record: &NdefRecord, uri_prefix: &str) -> Option<String> {
    if record.is_well_known(RTD_TEXT) {
        decode_text_payload(&record.payload)
    } else if record.is_well_known(RTD_URI) {
        decode_uri_payload(&record.payload, uri_prefix)
    } else {
        None
    }
}

/// Returns the address of the first decodable record in `message`.
#[must_use]
pub fn decode_message(message: &NdefMessage, uri_prefix: &str) -> Option<String> {
    message
        .records
        .iter()
        .find_map(|record| decode_record_with_prefix(record, uri_prefix))
}

fn decode_text_payload(payload: &[u8]) -> Option<String> {
    if payload.len() <= 3 {
        return None;
    }
    let language_len = usize::from(payload[0] & LANGUAGE_LEN_MASK);
    let text = payload.get(language_len + 1..)?;
    String::from_utf8(text.to_vec()).ok()
}

fn decode_uri_payload(payload: &[u8], uri_prefix: &str) -> Option<String> {
    let (_abbreviation, uri) = payload.split_first()?;
    let uri = std::str::from_utf8(uri).ok()?;
    Some(uri.strip_prefix(uri_prefix).unwrap_or(uri).to_string())
}

impl NdefMessage {
    /// Parses the NFC Forum binary layout.
    ///
    /// A lone empty record (`D0 00 00`) parses to a message without records.
    ///
    /// # Errors
    ///
    /// Returns an [`NdefError`] when the flags or lengths are inconsistent.
    pub fn parse(bytes: &[u8]) -> Result<Self, NdefError> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let start = offset;
            let truncated = || NdefError::Truncated { offset: start };
            let header = *bytes.get(offset).ok_or_else(truncated)?;
            offset += 1;

            if start == 0 && header & FLAG_MB == 0 {
                return Err(NdefError::MissingMessageBegin);
            }
            if start != 0 && header & FLAG_MB != 0 {
                return Err(NdefError::UnexpectedMessageBegin { offset: start });
            }
            if header & FLAG_CF != 0 {
                return Err(NdefError::ChunkedRecord);
            }

            let type_len = usize::from(*bytes.get(offset).ok_or_else(truncated)?);
            offset += 1;

            let payload_len = if header & FLAG_SR != 0 {
                let len = usize::from(*bytes.get(offset).ok_or_else(truncated)?);
                offset += 1;
                len
            } else {
                let raw = bytes.get(offset..offset + 4).ok_or_else(truncated)?;
                offset += 4;
                let len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                usize::try_from(len).map_err(|_| NdefError::PayloadTooLarge)?
            };

            let id_len = if header & FLAG_IL != 0 {
                let len = usize::from(*bytes.get(offset).ok_or_else(truncated)?);
                offset += 1;
                len
            } else {
                0
            };

            let mut take = |len: usize| -> Result<Vec<u8>, NdefError> {
                let end = offset.checked_add(len).ok_or_else(truncated)?;
                let field = bytes.get(offset..end).ok_or_else(truncated)?.to_vec();
                offset = end;
                Ok(field)
            };
            let record_type = take(type_len)?;
            let id = take(id_len)?;
            let payload = take(payload_len)?;

            records.push(NdefRecord {
                tnf: Tnf::from_bits(header),
                record_type,
                id,
                payload,
            });

            if header & FLAG_ME != 0 {
                break;
            }
            if offset >= bytes.len() {
                return Err(NdefError::MissingMessageEnd);
            }
        }

        if offset != bytes.len() {
            return Err(NdefError::TrailingBytes(bytes.len() - offset));
        }

        if let [only] = records.as_slice() {
            if only.tnf == Tnf::Empty && only.record_type.is_empty() && only.payload.is_empty() {
                records.clear();
            }
        }

        Ok(Self { records })
    }

    /// Serializes into the NFC Forum binary layout.
    ///
    /// Payloads under 256 bytes use the short-record form.
    ///
    /// # Errors
    ///
    /// Returns an [`NdefError`] when a field does not fit its length byte.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NdefError> {
        if self.records.is_empty() {
            return Ok(vec![FLAG_MB | FLAG_ME | FLAG_SR | Tnf::Empty.bits(), 0x00, 0x00]);
        }

        let last = self.records.len() - 1;
        let mut out = Vec::new();
        for (index, record) in self.records.iter().enumerate() {
            let type_len = u8::try_from(record.record_type.len())
                .map_err(|_| NdefError::FieldTooLong { field: "type" })?;
            let id_len = u8::try_from(record.id.len())
                .map_err(|_| NdefError::FieldTooLong { field: "id" })?;
            let short_payload = u8::try_from(record.payload.len()).ok();

            let mut header = record.tnf.bits();
            if index == 0 {
                header |= FLAG_MB;
            }
            if index == last {
                header |= FLAG_ME;
            }
            if short_payload.is_some() {
                header |= FLAG_SR;
            }
            if id_len > 0 {
                header |= FLAG_IL;
            }

            out.push(header);
            out.push(type_len);
            match short_payload {
                Some(len) => out.push(len),
                None => {
                    let len = u32::try_from(record.payload.len())
                        .map_err(|_| NdefError::PayloadTooLarge)?;
                    out.extend_from_slice(&len.to_be_bytes());
                }
            }
            if id_len > 0 {
                out.push(id_len);
            }
            out.extend_from_slice(&record.record_type);
            out.extend_from_slice(&record.id);
            out.extend_from_slice(&record.payload);
        }
        Ok(out)
    }
}

/// Builds the message written for a shared address, for the platform writer.
#[uniffi::export]
#[allow(clippy::needless_pass_by_value)]
pub fn wallet_address_message(address: String, config: NfcConfig) -> NdefMessage {
    encode_wallet_address(&address, &config)
}

/// Extracts a wallet address from a single record.
#[uniffi::export]
#[allow(clippy::needless_pass_by_value)]
pub fn wallet_address_from_record(record: NdefRecord) -> Option<String> {
    decode_record(&record)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ADDRESS: &str = "0x8a2b5f3c1d9e4a7b6c0d2e1f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b";

    #[test]
    fn test_text_round_trip() {
        let record = encode_text(ADDRESS);
        assert_eq!(record.payload[0], 2);
        assert_eq!(&record.payload[1..3], b"en");
        assert_eq!(decode_record(&record).as_deref(), Some(ADDRESS));
    }

    #[test]
    fn test_uri_round_trip() {
        let record = encode_uri(ADDRESS);
        assert_eq!(record.payload[0], 0x00);
        assert!(record.payload[1..].starts_with(b"nexpay://wallet/"));
        assert_eq!(decode_record(&record).as_deref(), Some(ADDRESS));
    }

    #[test]
    fn test_short_text_payload_is_ignored() {
        let record = NdefRecord {
            payload: vec![0x02, b'e', b'n'],
            ..encode_text("")
        };
        assert_eq!(decode_record(&record), None);
    }

    #[test]
    fn test_text_language_longer_than_payload() {
        let record = NdefRecord {
            payload: vec![0x3F, b'e', b'n', b'x'],
            ..encode_text("")
        };
        assert_eq!(decode_record(&record), None);
    }

    #[test]
    fn test_text_status_high_bits_are_ignored() {
        // Only the low six bits carry the language length.
        let mut record = encode_text("0xabc");
        record.payload[0] |= 0x40;
        assert_eq!(decode_record(&record).as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_foreign_uri_is_returned_whole() {
        let record = NdefRecord::uri("https://example.com/pay");
        assert_eq!(
            decode_record(&record).as_deref(),
            Some("https://example.com/pay")
        );
    }

    #[test]
    fn test_empty_uri_payload() {
        let record = NdefRecord {
            payload: Vec::new(),
            ..NdefRecord::uri("")
        };
        assert_eq!(decode_record(&record), None);
    }

    #[test]
    fn test_unrelated_records_are_skipped() {
        let mime = NdefRecord {
            tnf: Tnf::MimeMedia,
            record_type: b"text/plain".to_vec(),
            id: Vec::new(),
            payload: b"0xabc".to_vec(),
        };
        assert_eq!(decode_record(&mime), None);

        let message = NdefMessage {
            records: vec![mime, encode_uri("0xabc")],
        };
        assert_eq!(
            decode_message(&message, WALLET_URI_PREFIX).as_deref(),
            Some("0xabc")
        );
    }

    #[test]
    fn test_wallet_message_layout() {
        let message = encode_wallet_address("0x1", &NfcConfig::default());
        assert_eq!(message.records.len(), 2);
        assert_eq!(message.records[0].record_type, RTD_TEXT);
        assert_eq!(message.records[1].record_type, RTD_URI);
    }

    #[test]
    fn test_binary_layout_of_short_records() {
        let message = NdefMessage {
            records: vec![NdefRecord::uri("a")],
        };
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes, [0xD1, 0x01, 0x02, b'U', 0x00, b'a']);
        assert_eq!(NdefMessage::parse(&bytes).unwrap(), message);
    }

    #[test]
    fn test_binary_long_record_and_id() {
        let mut long = NdefRecord::text("en", &"x".repeat(300));
        long.id = b"w1".to_vec();
        let message = NdefMessage {
            records: vec![encode_uri(ADDRESS), long],
        };
        let bytes = message.to_bytes().unwrap();
        // second record: ME | IL | TNF=1, not short
        let second = bytes.iter().position(|b| *b == 0x49).unwrap();
        assert_eq!(&bytes[second + 2..second + 6], &303u32.to_be_bytes());

        assert_eq!(NdefMessage::parse(&bytes).unwrap(), message);
    }

    #[test]
    fn test_empty_message_bytes() {
        let bytes = NdefMessage::default().to_bytes().unwrap();
        assert_eq!(bytes, [0xD0, 0x00, 0x00]);
        assert!(NdefMessage::parse(&bytes).unwrap().records.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            NdefMessage::parse(&[]),
            Err(NdefError::Truncated { offset: 0 })
        );
        assert_eq!(
            NdefMessage::parse(&[0x11, 0x01, 0x00, b'U']),
            Err(NdefError::MissingMessageBegin)
        );
        assert_eq!(
            NdefMessage::parse(&[0xD1, 0x01, 0x05, b'U', 0x00]),
            Err(NdefError::Truncated { offset: 0 })
        );
        assert_eq!(
            NdefMessage::parse(&[0x91, 0x01, 0x00, b'U']),
            Err(NdefError::MissingMessageEnd)
        );
        assert_eq!(
            NdefMessage::parse(&[0xF1, 0x01, 0x00, b'U']),
            Err(NdefError::ChunkedRecord)
        );
        assert_eq!(
            NdefMessage::parse(&[0xD1, 0x01, 0x00, b'U', 0xFF]),
            Err(NdefError::TrailingBytes(1))
        );
        assert_eq!(
            NdefMessage::parse(&[0x91, 0x01, 0x00, b'U', 0xD1, 0x01, 0x00, b'U']),
            Err(NdefError::UnexpectedMessageBegin { offset: 4 })
        );
    }

    fn address_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(any::<char>(), 0..400).prop_map(String::from_iter)
    }

    proptest! {
        #[test]
        fn prop_wallet_message_survives_the_wire(address in address_strategy()) {
            let config = NfcConfig::default();
            let bytes = encode_wallet_address(&address, &config).to_bytes().unwrap();
            let message = NdefMessage::parse(&bytes).unwrap();

            prop_assert_eq!(&message, &encode_wallet_address(&address, &config));
            prop_assert_eq!(
                decode_message(&message, &config.uri_prefix),
                Some(address)
            );
        }

        #[test]
        fn prop_records_decode_to_their_address(address in address_strategy()) {
            prop_assert_eq!(decode_record(&encode_uri(&address)), Some(address.clone()));
            let text = decode_record(&encode_text(&address));
            if address.is_empty() {
                prop_assert_eq!(text, None);
            } else {
                prop_assert_eq!(text, Some(address));
            }
        }
    }
}
