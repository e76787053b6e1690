//! # roomhub-core
//!
//! Shared domain library for roomhub, a remote-control hub that converts
//! physical button edges into BLE-HID reports, home-automation service calls,
//! and media-player gestures.
//!
//! This crate holds the pure model: no OS APIs, no async runtime, no I/O.
//!
//! - **`domain`** – Button edges, the closed [`Action`] vocabulary, activity
//!   tables (which mapping governs the buttons right now), and the name→usage
//!   keymap tables with their load-time validation.
//!
//! - **`report`** – HID report byte building: the 6-key roster plus modifier
//!   mask that becomes an 8-byte keyboard report, and the 2-byte little-endian
//!   consumer-control payload.
//!
//! The daemon crate layers timers, de-duplication, and device I/O on top.

pub mod domain;
pub mod report;

pub use domain::action::{Action, EdgeSelector, GatedAction, GestureCmd, RepeatSpec};
pub use domain::activity::{ActivityMapping, ActivityTable};
pub use domain::edge::Edge;
pub use domain::keymap::{KeymapError, Keymaps};
pub use report::{consumer_report, keyboard_report, KeySlots, MAX_ROLLOVER};
