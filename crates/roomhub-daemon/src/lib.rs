//! # roomhub-daemon
//!
//! The hub application: reads a physical remote control, funnels its button
//! edges through a bounded pipeline into the activity dispatcher, and drives
//! the BLE-HID output state machine and the external home-automation /
//! media-player sinks.
//!
//! Layering follows the core/application/infrastructure split:
//!
//! - **`application`** – runtime logic that depends only on traits and
//!   `roomhub-core` types: the dispatcher, the event pipeline and its consumer
//!   loop, the HID output state machine, and the text-command router.
//! - **`infrastructure`** – the concrete edges of the process: evdev input,
//!   TOML config loading and hot reload, and the placeholder sink
//!   implementations the real BLE/broker stacks replace at integration time.

pub mod application;
pub mod infrastructure;
