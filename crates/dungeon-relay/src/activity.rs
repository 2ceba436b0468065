//! Module that logs new raid log activity as it appears.

use dungeon_core::{DungeonModule, InitData};
use dungeon_types::{DungeonKind, FilteredLog};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Persisted state of [`ActivityLog`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ActivityState {
    seen: usize,
}

/// Logs each raid log event once, in the order the log lists them.
#[derive(Debug)]
pub struct ActivityLog {
    dungeon: DungeonKind,
    state: ActivityState,
}

impl ActivityLog {
    /// A module for `dungeon`'s manager.
    pub const fn new(dungeon: DungeonKind) -> Self {
        Self {
            dungeon,
            state: ActivityState { seen: 0 },
        }
    }
}

impl DungeonModule for ActivityLog {
    fn name(&self) -> &str {
        "activity"
    }

    fn initialize(&mut self, saved: Option<&Value>, init: &InitData) {
        self.state = saved
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        info!(
            dungeon = self.dungeon.name(),
            instance_id = ?init.log.instance_id,
            seen = self.state.seen,
            "activity log ready"
        );
    }

    fn state(&self) -> Option<Value> {
        serde_json::to_value(self.state).ok()
    }

    fn process_log(&mut self, log: &FilteredLog) {
        let dungeon = self.dungeon.name();
        for event in log.events.iter().skip(self.state.seen) {
            info!(
                dungeon,
                category = %event.category,
                user = %event.user_name,
                turns = event.turns,
                "{}",
                event.event
            );
        }
        self.state.seen = log.events.len();
    }

    fn process_dungeon(&mut self, text: &str, _log: &FilteredLog) -> Option<String> {
        debug!(dungeon = self.dungeon.name(), text, "dungeon announcement");
        None
    }

    fn reset(&mut self, init: &InitData) {
        info!(
            dungeon = self.dungeon.name(),
            instance_id = ?init.log.instance_id,
            "activity log restarted for new instance"
        );
        self.state = ActivityState::default();
    }
}
