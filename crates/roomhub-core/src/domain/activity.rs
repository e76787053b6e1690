//! Activity tables: which action mapping governs the buttons right now.
//!
//! A table is an immutable snapshot. Hot reload builds a whole new table and
//! swaps the reference; the dispatcher keeps its current activity name if the
//! new table still defines it, otherwise it falls back to the new default.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use super::action::GatedAction;

/// One activity's button → action-sequence mapping.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActivityMapping {
    /// Logical button name → ordered action list. A single action table and
    /// an array of tables are both accepted in config.
    #[serde(default, deserialize_with = "one_or_many_map")]
    pub map: HashMap<String, Vec<GatedAction>>,
}

/// Snapshot of all activities plus the declared fallback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityTable {
    /// Activity used at startup and when the current one disappears on reload.
    pub default_activity: String,
    #[serde(default)]
    pub activities: HashMap<String, ActivityMapping>,
}

impl ActivityTable {
    /// An empty table with only a default name, used before the first real
    /// snapshot arrives from the config loader.
    pub fn empty(default_activity: impl Into<String>) -> Self {
        Self {
            default_activity: default_activity.into(),
            activities: HashMap::new(),
        }
    }

    /// Returns `true` when `activity` is defined in this snapshot.
    pub fn contains(&self, activity: &str) -> bool {
        self.activities.contains_key(activity)
    }

    /// Looks up the ordered action list for a button in an activity.
    ///
    /// `None` covers both an unknown activity and an unmapped button; the
    /// dispatcher treats either as a silent no-op.
    pub fn actions_for(&self, activity: &str, button: &str) -> Option<&[GatedAction]> {
        self.activities
            .get(activity)?
            .map
            .get(button)
            .map(|v| v.as_slice())
    }
}

fn one_or_many_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Vec<GatedAction>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(GatedAction),
        Many(Vec<GatedAction>),
    }

    let raw: HashMap<String, OneOrMany> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(button, v)| {
            let actions = match v {
                OneOrMany::One(a) => vec![a],
                OneOrMany::Many(list) => list,
            };
            (button, actions)
        })
        .collect())
}
