//! Application layer: dispatcher, pipeline, HID output, text commands.
//!
//! Everything here is testable without hardware: the sinks are traits
//! injected at construction time, and the input side is fed through the
//! pipeline's `push`.

pub mod commands;
pub mod dispatch;
pub mod hid_output;
pub mod pipeline;

use std::sync::Arc;

use roomhub_core::{ActivityTable, GatedAction, Keymaps};

/// Control-lane messages consumed by the same task that drains the event
/// pipeline, preserving the single-mutator model for dispatcher state.
#[derive(Debug)]
pub enum ControlMsg {
    /// The external activity authority selected an activity.
    SetActivity(String),
    /// Hot-reload produced a new activity table snapshot.
    Activities(Arc<ActivityTable>),
    /// Hot-reload produced a new keymap snapshot.
    Keymaps(Arc<Keymaps>),
    /// A long-hold timer elapsed while its button was (at spawn time) held.
    HoldElapsed {
        button: String,
        action: Box<GatedAction>,
    },
}
