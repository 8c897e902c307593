//! Mobile bindings for the NexPay wallet core.
//!
//! This crate only re-exports `nexpay-core` so that a single `cdylib` /
//! `staticlib` carries every UniFFI symbol for the Kotlin and Swift packages.

nexpay_core::uniffi_reexport_scaffolding!();

pub use nexpay_core::*;
