//! Rows of the Dreadsylvania event pattern database (`dread.csv`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Zone value marking a combat row.
pub const COMBAT_ZONE: &str = "(combat)";

/// Subzone value marking a boss kill.
pub const BOSS_SUBZONE: &str = "boss";

/// One pattern row.
///
/// Only non-empty CSV values are kept: a blank `zone` cell becomes `None`,
/// and blank extra columns are absent from [`ClassifierRow::extra`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRow {
    /// Raid log heading the row applies to.
    pub category: String,
    /// Pattern tested against the event text.
    pub regex: String,
    /// Zone the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Subzone the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subzone: Option<String>,
    /// Any further non-empty columns.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ClassifierRow {
    /// True if this row describes a boss kill.
    pub fn is_boss_kill(&self) -> bool {
        self.zone.as_deref() == Some(COMBAT_ZONE) && self.subzone.as_deref() == Some(BOSS_SUBZONE)
    }
}
