//! Generates the Kotlin and Swift bindings for the `nexpay` library.

fn main() {
    uniffi::uniffi_bindgen_main();
}
