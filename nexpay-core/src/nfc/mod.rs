//! NFC wallet-address exchange.
//!
//! Two devices exchange a wallet address in one tap:
//!
//! - The **sharing** device publishes its address into a [`SharedAddressSlot`]
//!   read by the [`ApduResponder`], which answers the HCE `SELECT` command.
//! - The **reading** device receives a tag discovery from the OS, first tries
//!   the [`CardReader`] (ISO-DEP `SELECT` against the emulated card), and on a
//!   miss falls back to decoding NDEF records with the [`ndef`] codec.
//!
//! [`NfcSessionManager`] owns the slot, the responder and the reader, and
//! delivers every extracted address to the registered
//! [`WalletAddressListener`].
//!
//! # Platform adapters
//!
//! The manager only sees the [`NfcPlatform`] and [`NfcTag`] capability traits.
//! Android implements them over `NfcAdapter` / `IsoDep` / `Ndef`, iOS over
//! `NFCTagReaderSession`. [`memory`] provides an in-process adapter used by the
//! test suites.

pub mod apdu;
pub mod memory;
pub mod ndef;
mod platform;
mod reader;
mod session;
mod slot;

pub use apdu::{ApduResponder, DeactivationReason};
pub use ndef::{NdefMessage, NdefRecord, Tnf};
pub use platform::{
    IsoDepConnection, NdefConnection, NfcPlatform, NfcTag, WalletAddressListener,
};
pub use reader::CardReader;
pub use session::{NfcAction, NfcSessionManager, SessionState, SharingSession};
pub use slot::SharedAddressSlot;
