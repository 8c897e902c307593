#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Core of the `NexPay` wallet app.
//!
//! Two pieces of logic live here rather than in the Kotlin / Swift layers:
//!
//! - [`nfc`]: peer-to-peer wallet-address exchange over NFC. The sharing
//!   device emulates a card (HCE) and answers `SELECT` with its address; the
//!   reading device either talks APDUs to that emulated card or falls back to
//!   NDEF text / URI records written on a physical tag.
//! - [`credential`]: the app-lock guard (PIN hash, biometric flag) and the
//!   cached wallet account handle.
//!
//! Platform specifics (the NFC adapter, tags, the encrypted preference store,
//! the log sink) are reached through foreign traits implemented by the host
//! application.

mod config;
pub use config::*;

mod error;
pub use error::*;

pub mod credential;
pub mod logger;
pub mod nfc;

uniffi::setup_scaffolding!("nexpay_core");
