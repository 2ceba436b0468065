//! Supported dungeons and the per-dungeon view of a raid log.

use serde::{Deserialize, Serialize};

use crate::raidlog::{DreadStats, Event};

/// The clan dungeons the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DungeonKind {
    /// Hobopolis, the sewer city.
    #[default]
    Hobopolis,
    /// Dreadsylvania.
    Dreadsylvania,
}

impl DungeonKind {
    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hobopolis => "Hobopolis",
            Self::Dreadsylvania => "Dreadsylvania",
        }
    }

    /// Chat channel the dungeon's manager must be attached to.
    pub const fn channel(self) -> &'static str {
        match self {
            Self::Hobopolis => "hobopolis",
            Self::Dreadsylvania => "dread",
        }
    }

    /// Key of the instance number in the raid log.
    pub const fn log_key(self) -> &'static str {
        match self {
            Self::Hobopolis => "hoid",
            Self::Dreadsylvania => "dvid",
        }
    }

    /// Reserved persistent-state key holding the last known instance number.
    pub const fn persist_key(self) -> &'static str {
        match self {
            Self::Hobopolis => "__hoid__",
            Self::Dreadsylvania => "__dvid__",
        }
    }
}

impl core::fmt::Display for DungeonKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// The keys of a raid log relevant to one dungeon, after classification.
///
/// This is what modules receive. It is built once per fetch and shared as an
/// immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredLog {
    /// Dungeon this view belongs to.
    pub dungeon: DungeonKind,
    /// Current instance number, if the dungeon is open.
    pub instance_id: Option<i64>,
    /// Events from this dungeon's categories, in page order.
    pub events: Vec<Event>,
    /// Dreadsylvania counters (Dreadsylvania only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dread: Option<DreadStats>,
}

impl FilteredLog {
    /// An empty view for a dungeon that has no open instance.
    pub fn empty(dungeon: DungeonKind) -> Self {
        Self {
            dungeon,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_per_dungeon() {
        assert_eq!(DungeonKind::Hobopolis.persist_key(), "__hoid__");
        assert_eq!(DungeonKind::Dreadsylvania.persist_key(), "__dvid__");
        assert_eq!(DungeonKind::Dreadsylvania.channel(), "dread");
        assert_eq!(DungeonKind::Hobopolis.log_key(), "hoid");
    }

    #[test]
    fn empty_log_has_no_instance() {
        let log = FilteredLog::empty(DungeonKind::Dreadsylvania);
        assert_eq!(log.dungeon, DungeonKind::Dreadsylvania);
        assert!(log.instance_id.is_none());
        assert!(log.events.is_empty());
    }
}
