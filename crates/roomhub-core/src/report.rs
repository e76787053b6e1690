//! HID report byte building.
//!
//! Pure functions and state: the daemon's output state machine layers
//! de-duplication and the steady-repeat timer on top of these.
//!
//! Keyboard reports are the standard 8-byte boot layout: modifier mask,
//! reserved zero byte, then six usage-code slots, zero-padded. Consumer
//! reports are a single 16-bit usage, little-endian; usage 0 is the neutral
//! "nothing pressed" payload.

/// Keyboard report key-slot capacity (6-key rollover).
pub const MAX_ROLLOVER: usize = 6;

/// Size in bytes of a keyboard report.
pub const KEYBOARD_REPORT_LEN: usize = 8;

/// The currently-down keyboard usage codes, capped at [`MAX_ROLLOVER`].
///
/// Insertion order is preserved so a rebuilt report is byte-stable for an
/// unchanged set, which is what makes de-duplication by comparison sound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySlots {
    codes: Vec<u8>,
}

impl KeySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a code. Ignored when already present or when all six slots are
    /// taken.
    pub fn press(&mut self, code: u8) {
        if self.codes.len() < MAX_ROLLOVER && !self.codes.contains(&code) {
            self.codes.push(code);
        }
    }

    /// Removes a specific code; unknown codes are ignored.
    pub fn release(&mut self, code: u8) {
        self.codes.retain(|c| *c != code);
    }

    /// Releases everything.
    pub fn clear(&mut self) {
        self.codes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> &[u8] {
        &self.codes
    }
}

/// Builds the 8-byte keyboard report for a modifier mask and key roster.
pub fn keyboard_report(modifiers: u8, keys: &KeySlots) -> [u8; KEYBOARD_REPORT_LEN] {
    let mut report = [0u8; KEYBOARD_REPORT_LEN];
    report[0] = modifiers;
    // report[1] is the reserved byte, always zero.
    for (slot, code) in keys.codes().iter().enumerate() {
        report[2 + slot] = *code;
    }
    report
}

/// Builds the 2-byte little-endian consumer-control report.
pub fn consumer_report(usage: u16) -> [u8; 2] {
    usage.to_le_bytes()
}
