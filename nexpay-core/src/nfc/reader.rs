//! Reading a wallet address from a discovered tag.

use std::sync::Arc;

use super::apdu::{build_select_command, split_status_word, STATUS_SUCCESS};
use super::ndef::{decode_message, NdefMessage};
use super::platform::{IsoDepConnection, NdefConnection, NfcTag};
use crate::config::NfcConfig;
use crate::error::NfcTransportError;

/// Closes the wrapped connection when dropped.
struct Connected<C: ?Sized + Closeable> {
    connection: Arc<C>,
}

trait Closeable {
    fn close_connection(&self) -> Result<(), NfcTransportError>;
}

impl Closeable for dyn IsoDepConnection {
    fn close_connection(&self) -> Result<(), NfcTransportError> {
        self.close()
    }
}

impl Closeable for dyn NdefConnection {
    fn close_connection(&self) -> Result<(), NfcTransportError> {
        self.close()
    }
}

impl<C: ?Sized + Closeable> Drop for Connected<C> {
    fn drop(&mut self) {
        if let Err(e) = self.connection.close_connection() {
            log::warn!("failed to close tag connection: {e}");
        }
    }
}

/// Reads a wallet address from a tag, over ISO-DEP or NDEF.
///
/// Every method blocks on tag I/O; the `_async` variants move that work to
/// Tokio's blocking pool. Connections are closed on every exit path.
#[derive(Debug, Clone)]
pub struct CardReader {
    select_command: Vec<u8>,
    uri_prefix: String,
}

impl Default for CardReader {
    fn default() -> Self {
        Self::new(&NfcConfig::default())
    }
}

impl CardReader {
    /// Creates a reader selecting `config.aid`.
    #[must_use]
    pub fn new(config: &NfcConfig) -> Self {
        Self {
            select_command: build_select_command(&config.aid),
            uri_prefix: config.uri_prefix.clone(),
        }
    }

    /// `SELECT`s the wallet application over ISO-DEP.
    ///
    /// Returns `None` when the tag has no ISO-DEP technology, the exchange
    /// fails, or the status word is not `90 00`.
    #[must_use]
    pub fn read_address(&self, tag: &dyn NfcTag) -> Option<String> {
        let Some(iso_dep) = tag.iso_dep() else {
            log::debug!("tag {} does not support ISO-DEP", hex::encode(tag.id()));
            return None;
        };

        match self.select(iso_dep) {
            Ok(address) => address,
            Err(e) => {
                log::warn!("ISO-DEP exchange failed: {e}");
                None
            }
        }
    }

    fn select(
        &self,
        iso_dep: Arc<dyn IsoDepConnection>,
    ) -> Result<Option<String>, NfcTransportError> {
        let session = Connected {
            connection: iso_dep,
        };
        session.connection.connect()?;
        let response = session.connection.transceive(self.select_command.clone())?;
        drop(session);

        Ok(parse_select_response(&response))
    }

    /// Reads the tag's NDEF message and decodes the first wallet record.
    #[must_use]
    pub fn read_ndef_address(&self, tag: &dyn NfcTag) -> Option<String> {
        let ndef = tag.ndef()?;
        let bytes = match read_ndef_bytes(ndef) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log::debug!("tag holds no NDEF message");
                return None;
            }
            Err(e) => {
                log::warn!("NDEF read failed: {e}");
                return None;
            }
        };

        match NdefMessage::parse(&bytes) {
            Ok(message) => decode_message(&message, &self.uri_prefix),
            Err(e) => {
                log::warn!("malformed NDEF message on tag: {e}");
                None
            }
        }
    }

    /// [`Self::read_address`] on the blocking pool.
    pub async fn read_address_async(&self, tag: Arc<dyn NfcTag>) -> Option<String> {
        let reader = self.clone();
        tokio::task::spawn_blocking(move || reader.read_address(tag.as_ref()))
            .await
            .unwrap_or_else(|e| {
                log::error!("ISO-DEP read task failed: {e}");
                None
            })
    }

    /// [`Self::read_ndef_address`] on the blocking pool.
    pub async fn read_ndef_address_async(&self, tag: Arc<dyn NfcTag>) -> Option<String> {
        let reader = self.clone();
        tokio::task::spawn_blocking(move || reader.read_ndef_address(tag.as_ref()))
            .await
            .unwrap_or_else(|e| {
                log::error!("NDEF read task failed: {e}");
                None
            })
    }
}

fn read_ndef_bytes(
    ndef: Arc<dyn NdefConnection>,
) -> Result<Option<Vec<u8>>, NfcTransportError> {
    let session = Connected { connection: ndef };
    session.connection.connect()?;
    session.connection.read_message()
}

/// Decodes `<address> 90 00`; any other status yields `None`.
#[must_use]
pub fn parse_select_response(response: &[u8]) -> Option<String> {
    let (data, status) = split_status_word(response)?;
    if status != STATUS_SUCCESS {
        log::debug!("SELECT rejected with status {}", hex::encode(status));
        return None;
    }
    match String::from_utf8(data.to_vec()) {
        Ok(address) => Some(address),
        Err(e) => {
            log::warn!("SELECT response is not UTF-8: {e}");
            None
        }
    }
}
