//! Infrastructure: the concrete edges of the process.
//!
//! - `input` – the physical remote control (evdev) and its reconnect loop.
//! - `config` – TOML loading and the hot-reload poller.
//! - `sinks` – log-only placeholder implementations of the collaborator
//!   traits, replaced by the real BLE/broker stacks at integration time.

pub mod config;
pub mod input;
pub mod sinks;
