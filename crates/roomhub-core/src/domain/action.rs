//! The closed action vocabulary a button can be mapped to.
//!
//! An action's `do` tag selects its behavior. The set is closed: an
//! unrecognized tag fails deserialization, so a typo in a mapping file is
//! rejected when the config is loaded, never discovered at dispatch time.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::edge::Edge;

/// Which edge(s) a single-fire action responds to.
///
/// Each action kind has its own default (`service_call` and `gesture` fire on
/// release, `set_activity` on press), so the field is optional in config and
/// the default is applied at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSelector {
    Down,
    Up,
    Both,
}

impl EdgeSelector {
    /// Returns `true` when `edge` should trigger the action.
    pub fn matches(self, edge: Edge) -> bool {
        match self {
            EdgeSelector::Both => true,
            EdgeSelector::Down => edge == Edge::Down,
            EdgeSelector::Up => edge == Edge::Up,
        }
    }
}

/// Hold-to-repeat timing for a `service_call`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepeatSpec {
    /// Delay from the immediate first fire to the first repeat.
    #[serde(default = "default_repeat_ms")]
    pub initial_ms: u64,
    /// Cadence of subsequent repeats.
    #[serde(default = "default_repeat_ms")]
    pub every_ms: u64,
}

fn default_repeat_ms() -> u64 {
    500
}

/// Gesture flavor sent to the media-player client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureCmd {
    Tap,
    Hold,
    #[serde(alias = "doubletap")]
    Double,
}

/// One concrete thing to do when a button edge arrives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum Action {
    /// Mirror the edge onto the BLE keyboard channel (page 0x07).
    HidKeyboard { name: String },

    /// Mirror the edge onto the BLE consumer channel (page 0x0C).
    HidConsumer { name: String },

    /// Publish a home-automation service call, optionally repeating while held.
    ServiceCall {
        domain: String,
        service: String,
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        repeat: Option<RepeatSpec>,
        /// Single-fire edge selector; ignored when `repeat` is set. Default: up.
        #[serde(default)]
        when: Option<EdgeSelector>,
    },

    /// Ask the external activity authority to switch activities.
    ///
    /// Local activity state is never changed here; the authority echoes the
    /// change back through `set_activity`.
    SetActivity {
        to: String,
        /// Default: down.
        #[serde(default)]
        when: Option<EdgeSelector>,
    },

    /// Send a semantic gesture to the media-player client.
    Gesture {
        cmd: GestureCmd,
        key: String,
        /// Default: up.
        #[serde(default)]
        when: Option<EdgeSelector>,
        /// Hold duration for `cmd = "hold"`.
        #[serde(default)]
        hold_ms: Option<u64>,
        /// Pacing delay after the gesture, before the next action in the
        /// same sequence.
        #[serde(default)]
        delay_ms: Option<u64>,
    },

    /// Suspend the remainder of this action sequence (down edge only).
    Sleep { ms: u64 },

    /// Intentionally does nothing; silences a button without unmapping it.
    Noop,
}

/// An [`Action`] with its optional long-hold gate.
///
/// When `min_hold_ms` is set, the action only fires if the button is still
/// held after that many milliseconds; an early release fires nothing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatedAction {
    #[serde(default)]
    pub min_hold_ms: Option<u64>,
    #[serde(flatten)]
    pub action: Action,
}

impl GatedAction {
    /// The same action with the gate stripped, as fired by an elapsed hold
    /// timer.
    pub fn ungated(&self) -> GatedAction {
        GatedAction {
            min_hold_ms: None,
            action: self.action.clone(),
        }
    }
}
