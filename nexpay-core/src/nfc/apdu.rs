//! APDU framing and the HCE responder.
//!
//! ```text
//! SELECT  = 00 A4 04 00 | Lc | AID
//! success = <UTF-8 wallet address> | 90 00
//! unknown = 00 00
//! ```

use super::slot::SharedAddressSlot;

/// `CLA INS P1 P2` of a SELECT-by-name command.
pub const SELECT_APDU_HEADER: [u8; 4] = [0x00, 0xA4, 0x04, 0x00];

/// Status word for a successful command.
pub const STATUS_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Status word returned for anything the responder does not understand.
pub const STATUS_UNKNOWN: [u8; 2] = [0x00, 0x00];

/// Builds `00 A4 04 00 <Lc> <aid>`.
///
/// Short APDUs carry at most 255 data bytes; a longer `aid` is truncated.
#[must_use]
pub fn build_select_command(aid: &[u8]) -> Vec<u8> {
    let aid = &aid[..aid.len().min(usize::from(u8::MAX))];
    let lc = u8::try_from(aid.len()).unwrap_or(u8::MAX);
    let mut command = Vec::with_capacity(SELECT_APDU_HEADER.len() + 1 + aid.len());
    command.extend_from_slice(&SELECT_APDU_HEADER);
    command.push(lc);
    command.extend_from_slice(aid);
    command
}

/// Returns `true` when the first four bytes are the SELECT header.
#[must_use]
pub fn is_select_command(command: &[u8]) -> bool {
    command.starts_with(&SELECT_APDU_HEADER)
}

/// Splits a response into its data and trailing status word.
///
/// Returns `None` for responses shorter than a status word.
#[must_use]
pub fn split_status_word(response: &[u8]) -> Option<(&[u8], [u8; 2])> {
    let split = response.len().checked_sub(2)?;
    let (data, status) = response.split_at(split);
    Some((data, [status[0], status[1]]))
}

/// Why the reader link went away, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum DeactivationReason {
    /// The reader moved out of the field.
    LinkLoss,
    /// The reader selected another application.
    Deselected,
}

/// Host Card Emulation responder.
///
/// Called on the platform's HCE thread for every APDU; it only reads the
/// injected slot and never blocks.
#[derive(Debug, uniffi::Object)]
pub struct ApduResponder {
    slot: SharedAddressSlot,
}

impl ApduResponder {
    /// Creates a responder reading from `slot`.
    #[must_use]
    pub const fn new(slot: SharedAddressSlot) -> Self {
        Self { slot }
    }

    /// Answers one command APDU.
    #[must_use]
    pub fn respond(&self, command: &[u8]) -> Vec<u8> {
        if !is_select_command(command) {
            log::debug!("ignoring non-SELECT command ({} bytes)", command.len());
            return STATUS_UNKNOWN.to_vec();
        }

        let Some(address) = self.slot.current() else {
            log::debug!("SELECT received while nothing is shared");
            return STATUS_UNKNOWN.to_vec();
        };

        let mut response = Vec::with_capacity(address.len() + STATUS_SUCCESS.len());
        response.extend_from_slice(address.as_bytes());
        response.extend_from_slice(&STATUS_SUCCESS);
        response
    }
}

#[uniffi::export]
impl ApduResponder {
    /// Entry point for `HostApduService.processCommandApdu`.
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn process_command(&self, command: Vec<u8>) -> Vec<u8> {
        self.respond(&command)
    }

    /// Entry point for `HostApduService.onDeactivated`. Nothing to clean up.
    #[allow(clippy::unused_self)]
    pub fn on_deactivated(&self, reason: DeactivationReason) {
        log::debug!("HCE link deactivated: {reason:?}");
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::config::WALLET_AID;

    fn select() -> Vec<u8> {
        build_select_command(&WALLET_AID)
    }

    #[test]
    fn test_select_command_layout() {
        assert_eq!(
            select(),
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01]
        );
    }

    #[test_case(&[] ; "empty")]
    #[test_case(&[0x00] ; "one byte")]
    #[test_case(&[0x00, 0xA4, 0x04] ; "truncated header")]
    #[test_case(&[0x00, 0xB0, 0x00, 0x00] ; "read binary")]
    #[test_case(&[0x80, 0xA4, 0x04, 0x00, 0x01, 0x00] ; "proprietary class")]
    fn test_unknown_commands(command: &[u8]) {
        let slot = SharedAddressSlot::new();
        slot.publish("0xabc".to_string());
        let responder = ApduResponder::new(slot);

        assert_eq!(responder.respond(command), STATUS_UNKNOWN);
    }

    #[test]
    fn test_select_returns_shared_address() {
        let slot = SharedAddressSlot::new();
        let responder = ApduResponder::new(slot.clone());
        slot.publish("0xfeed".to_string());

        assert_eq!(responder.respond(&select()), b"0xfeed\x90\x00");
    }

    #[test]
    fn test_select_without_address() {
        let responder = ApduResponder::new(SharedAddressSlot::new());
        assert_eq!(responder.respond(&select()), STATUS_UNKNOWN);
    }

    #[test]
    fn test_header_only_select_is_accepted() {
        // Matching looks at the header alone, the AID is not checked.
        let slot = SharedAddressSlot::new();
        slot.publish("a".to_string());
        let responder = ApduResponder::new(slot);

        assert_eq!(responder.respond(&SELECT_APDU_HEADER), b"a\x90\x00");
    }

    #[test]
    fn test_split_status_word() {
        assert_eq!(split_status_word(&[0x90]), None);
        assert_eq!(split_status_word(&[0x90, 0x00]), Some((&[][..], STATUS_SUCCESS)));
        assert_eq!(
            split_status_word(b"ab\x6A\x82"),
            Some((&b"ab"[..], [0x6A, 0x82]))
        );
    }
}
