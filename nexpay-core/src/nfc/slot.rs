//! Address holder shared between the session manager and the HCE responder.

use std::sync::{Arc, PoisonError, RwLock};

/// Single-value, thread-safe holder for the address being shared.
///
/// The session manager is the only writer; the responder reads it from the
/// platform's HCE callback thread. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct SharedAddressSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedAddressSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the shared address.
    pub fn publish(&self, address: String) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(address);
    }

    /// Removes the shared address.
    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns a copy of the shared address, if any.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_observe_writes() {
        let slot = SharedAddressSlot::new();
        let reader = slot.clone();
        assert_eq!(reader.current(), None);

        slot.publish("0xabc".to_string());
        assert_eq!(reader.current().as_deref(), Some("0xabc"));

        slot.clear();
        assert_eq!(reader.current(), None);
    }

    #[test]
    fn test_visible_across_threads() {
        let slot = SharedAddressSlot::new();
        let writer = slot.clone();
        std::thread::spawn(move || writer.publish("0x1".to_string()))
            .join()
            .unwrap();
        assert_eq!(slot.current().as_deref(), Some("0x1"));
    }
}
