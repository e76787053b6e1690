//! Logical key name → HID usage code tables.
//!
//! Two independent tables, matching the two HID report channels:
//!
//! - **keyboard** – Usage page 0x07 (Keyboard/Keypad), codes 0–255.
//! - **consumer** – Usage page 0x0C (Consumer Control), usages 0–0x3FF.
//!
//! Ranges are enforced when the table is built, so a bad config entry is
//! rejected at load time instead of surfacing as a mangled report later.
//! A lookup miss at dispatch time is a no-op, not an error: a mapping may
//! legitimately reference names the current keymap file does not define.

use std::collections::HashMap;

use thiserror::Error;

/// Largest valid consumer-control usage accepted from configuration.
pub const MAX_CONSUMER_USAGE: u32 = 0x3FF;

/// Largest valid keyboard usage code accepted from configuration.
pub const MAX_KEYBOARD_CODE: u32 = 0xFF;

/// Error produced while validating keymap tables.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeymapError {
    #[error("keyboard entry {name:?}: code {code:#x} out of range 0..={max:#x}", max = MAX_KEYBOARD_CODE)]
    KeyboardCodeOutOfRange { name: String, code: u32 },

    #[error("consumer entry {name:?}: usage {usage:#x} out of range 0..={max:#x}", max = MAX_CONSUMER_USAGE)]
    ConsumerUsageOutOfRange { name: String, usage: u32 },
}

/// Immutable snapshot of both keymap tables.
///
/// Replaced wholesale on hot reload; never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymaps {
    keyboard: HashMap<String, u8>,
    consumer: HashMap<String, u16>,
}

impl Keymaps {
    /// Builds a validated snapshot from raw (wider-typed) config tables.
    pub fn from_tables(
        keyboard: HashMap<String, u32>,
        consumer: HashMap<String, u32>,
    ) -> Result<Self, KeymapError> {
        let mut kb = HashMap::with_capacity(keyboard.len());
        for (name, code) in keyboard {
            if code > MAX_KEYBOARD_CODE {
                return Err(KeymapError::KeyboardCodeOutOfRange { name, code });
            }
            kb.insert(name, code as u8);
        }

        let mut cc = HashMap::with_capacity(consumer.len());
        for (name, usage) in consumer {
            if usage > MAX_CONSUMER_USAGE {
                return Err(KeymapError::ConsumerUsageOutOfRange { name, usage });
            }
            cc.insert(name, usage as u16);
        }

        Ok(Self {
            keyboard: kb,
            consumer: cc,
        })
    }

    /// Resolves a keyboard key name to its usage code.
    pub fn keyboard_code(&self, name: &str) -> Option<u8> {
        self.keyboard.get(name).copied()
    }

    /// Resolves a consumer-control name to its usage.
    pub fn consumer_usage(&self, name: &str) -> Option<u16> {
        self.consumer.get(name).copied()
    }

    pub fn keyboard_len(&self) -> usize {
        self.keyboard.len()
    }

    pub fn consumer_len(&self) -> usize {
        self.consumer.len()
    }
}
