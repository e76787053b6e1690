//! Button edge transitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A press or release transition of a logical button.
///
/// Hardware auto-repeat (evdev value 2) is filtered out upstream and has no
/// representation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Down,
    Up,
}

/// Error returned when a string is neither a down nor an up synonym.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized edge {0:?} (expected down/press or up/release)")]
pub struct EdgeParseError(pub String);

impl Edge {
    pub fn as_str(self) -> &'static str {
        match self {
            Edge::Down => "down",
            Edge::Up => "up",
        }
    }
}

impl FromStr for Edge {
    type Err = EdgeParseError;

    /// Normalizes the synonyms used by different event sources:
    /// `down`/`press` and `up`/`release`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" | "press" => Ok(Edge::Down),
            "up" | "release" => Ok(Edge::Up),
            other => Err(EdgeParseError(other.to_string())),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
