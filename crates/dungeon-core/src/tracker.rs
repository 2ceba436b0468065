//! Instance tracking: cleared detection and reset detection.
//!
//! Two independent questions are answered for every classified log:
//! has the current instance just been cleared (or reopened), and is this
//! log from a different instance than the one in persistent state.

use dungeon_types::FilteredLog;
use tracing::info;

use crate::dungeon::Dungeon;

/// Change of the active flag between two logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTransition {
    /// First observation, or no change.
    Unchanged,
    /// Active to inactive: the dungeon was cleared.
    Cleared,
    /// Inactive to active: the dungeon was reset and a new instance is due.
    Reopened,
}

/// Outcome of comparing the stored instance id with a fetched one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceChange {
    /// Nothing was stored; the fetched id is adopted.
    Adopted(i64),
    /// Same instance as before.
    Unchanged,
    /// A new instance replaced the stored one.
    Reset {
        /// The stored id.
        previous: i64,
        /// The fetched id.
        current: i64,
    },
    /// The fetched log carries no instance id.
    Unknown,
}

/// Compare the stored instance id with the one in a fetched log.
pub const fn compare_instance(stored: Option<i64>, fetched: Option<i64>) -> InstanceChange {
    match (stored, fetched) {
        (_, None) => InstanceChange::Unknown,
        (None, Some(id)) => InstanceChange::Adopted(id),
        (Some(previous), Some(current)) if previous == current => InstanceChange::Unchanged,
        (Some(previous), Some(current)) => InstanceChange::Reset { previous, current },
    }
}

/// The active flag of one dungeon.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceTracker {
    active: Option<bool>,
}

impl InstanceTracker {
    /// A tracker that has not observed anything yet.
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Last computed active flag.
    pub const fn active(&self) -> Option<bool> {
        self.active
    }

    /// Set the flag without reporting a transition.
    pub const fn seed(&mut self, active: bool) {
        self.active = Some(active);
    }

    /// Recompute the flag from `log` and log any transition.
    pub fn observe<D: Dungeon + ?Sized>(&mut self, dungeon: &D, log: &FilteredLog) -> ActiveTransition {
        let now = dungeon.is_active(log);
        let transition = match self.active {
            Some(true) if !now => ActiveTransition::Cleared,
            Some(false) if now => ActiveTransition::Reopened,
            _ => ActiveTransition::Unchanged,
        };
        self.active = Some(now);

        let dungeon_name = dungeon.kind().name();
        match transition {
            ActiveTransition::Cleared => {
                info!(dungeon = dungeon_name, instance_id = ?log.instance_id, "{}", dungeon.cleared_message());
            }
            ActiveTransition::Reopened => {
                info!(dungeon = dungeon_name, "dungeon reset; new instance should appear soon");
            }
            ActiveTransition::Unchanged => {}
        }
        transition
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dungeon_types::{DungeonKind, Event};

    use super::*;
    use crate::dungeon::Hobopolis;

    fn log_with(texts: &[&str]) -> FilteredLog {
        FilteredLog {
            dungeon: DungeonKind::Hobopolis,
            instance_id: Some(42),
            events: texts
                .iter()
                .map(|text| Event {
                    category: "Town Square".to_owned(),
                    user_name: "Alice".to_owned(),
                    user_id: 1,
                    event: (*text).to_owned(),
                    turns: 1,
                    db_match: None,
                })
                .collect(),
            dread: None,
        }
    }

    #[test]
    fn compare_covers_every_case() {
        assert_eq!(compare_instance(None, Some(42)), InstanceChange::Adopted(42));
        assert_eq!(compare_instance(Some(42), Some(42)), InstanceChange::Unchanged);
        assert_eq!(
            compare_instance(Some(42), Some(43)),
            InstanceChange::Reset {
                previous: 42,
                current: 43
            }
        );
        assert_eq!(compare_instance(Some(42), None), InstanceChange::Unknown);
        assert_eq!(compare_instance(None, None), InstanceChange::Unknown);
    }

    #[test]
    fn first_observation_is_not_a_transition() {
        let hobo = Hobopolis::new().unwrap();
        let mut tracker = InstanceTracker::new();
        assert_eq!(
            tracker.observe(&hobo, &log_with(&["defeated  Hodgman"])),
            ActiveTransition::Unchanged
        );
        assert_eq!(tracker.active(), Some(false));
    }

    #[test]
    fn hodgman_kill_clears_then_new_log_reopens() {
        let hobo = Hobopolis::new().unwrap();
        let mut tracker = InstanceTracker::new();
        tracker.seed(true);

        assert_eq!(
            tracker.observe(&hobo, &log_with(&["defeated a hobo", "defeated  Hodgman"])),
            ActiveTransition::Cleared
        );
        assert_eq!(tracker.observe(&hobo, &log_with(&[])), ActiveTransition::Reopened);
        assert_eq!(tracker.observe(&hobo, &log_with(&[])), ActiveTransition::Unchanged);
    }
}
