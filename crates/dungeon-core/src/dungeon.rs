//! The per-dungeon capability set.
//!
//! A [`DungeonManager`] is generic over a [`Dungeon`], which decides how a
//! raw [`RaidLog`] is projected for modules and when the instance counts as
//! cleared. [`Hobopolis`] and [`Dreadsylvania`] are the two implementations.
//!
//! [`DungeonManager`]: crate::manager::DungeonManager

use std::sync::Arc;
use std::time::Duration;

use dungeon_types::{ClassifierRow, DungeonKind, FilteredLog, RaidLog};
use regex::Regex;

use crate::classifier::{ClassifierError, ClassifierTable, DREAD_CATEGORIES};

/// Raid log categories belonging to Hobopolis.
pub const HOBOPOLIS_CATEGORIES: [&str; 8] = [
    "Sewers",
    "Town Square",
    "Burnbarrel Blvd.",
    "Exposure Esplanade",
    "The Heap",
    "The Ancient Hobo Burial Ground",
    "The Purple Light District",
    "Miscellaneous",
];

/// Upper bound on the Dreadsylvania polling period, in seconds.
pub const DREAD_MAX_POLL_SECS: u64 = 300;

/// Bosses that must fall before Dreadsylvania counts as cleared.
pub const DREAD_BOSS_COUNT: usize = 3;

/// What a module receives on initialization and reset.
#[derive(Debug, Clone)]
pub struct InitData {
    /// The current classified log.
    pub log: Arc<FilteredLog>,
    /// The classifier table (Dreadsylvania only).
    pub event_db: Option<Arc<[ClassifierRow]>>,
}

/// Dungeon-specific behavior of a manager.
pub trait Dungeon: Send + Sync + 'static {
    /// Which dungeon this is.
    fn kind(&self) -> DungeonKind;

    /// Project a raw log onto this dungeon's keys and events.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::DuplicateMatch`] if classification is
    /// ambiguous.
    fn filter(&self, log: &RaidLog) -> Result<FilteredLog, ClassifierError>;

    /// Whether the instance described by `log` is still being fought.
    fn is_active(&self, log: &FilteredLog) -> bool;

    /// Message logged when the instance flips from active to cleared.
    fn cleared_message(&self) -> &'static str;

    /// Polling period for a configured `log_check_interval`.
    fn poll_interval(&self, configured_secs: u64) -> Duration {
        Duration::from_secs(configured_secs)
    }

    /// Data handed to module `initialize` and `reset` hooks.
    fn init_data(&self, log: Arc<FilteredLog>) -> InitData {
        InitData { log, event_db: None }
    }

    /// Whether the last events are kept in persistent state under `__log__`.
    fn keeps_log_snapshot(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Hobopolis
// ---------------------------------------------------------------------------

/// Hobopolis: unclassified, cleared once Hodgman falls.
#[derive(Debug, Clone)]
pub struct Hobopolis {
    hodgman_defeated: Regex,
}

impl Hobopolis {
    /// Create the Hobopolis capability set.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::BadPattern`] if the built-in pattern fails
    /// to compile.
    pub fn new() -> Result<Self, ClassifierError> {
        let pattern = "defeated +Hodgman";
        let hodgman_defeated = Regex::new(pattern).map_err(|source| ClassifierError::BadPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self { hodgman_defeated })
    }
}

impl Dungeon for Hobopolis {
    fn kind(&self) -> DungeonKind {
        DungeonKind::Hobopolis
    }

    fn filter(&self, log: &RaidLog) -> Result<FilteredLog, ClassifierError> {
        Ok(FilteredLog {
            dungeon: DungeonKind::Hobopolis,
            instance_id: log.instance_id(DungeonKind::Hobopolis.log_key()),
            events: log
                .events
                .iter()
                .filter(|e| HOBOPOLIS_CATEGORIES.contains(&e.category.trim()))
                .cloned()
                .collect(),
            dread: None,
        })
    }

    fn is_active(&self, log: &FilteredLog) -> bool {
        !log.events
            .iter()
            .any(|e| self.hodgman_defeated.is_match(&e.event))
    }

    fn cleared_message(&self) -> &'static str {
        "Hodgman killed!"
    }

    fn keeps_log_snapshot(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Dreadsylvania
// ---------------------------------------------------------------------------

/// Dreadsylvania: classified against `dread.csv`, cleared after three bosses.
#[derive(Debug, Clone)]
pub struct Dreadsylvania {
    table: Arc<ClassifierTable>,
}

impl Dreadsylvania {
    /// Create the Dreadsylvania capability set over a compiled table.
    pub const fn new(table: Arc<ClassifierTable>) -> Self {
        Self { table }
    }

    /// The classifier table.
    pub const fn table(&self) -> &Arc<ClassifierTable> {
        &self.table
    }
}

impl Dungeon for Dreadsylvania {
    fn kind(&self) -> DungeonKind {
        DungeonKind::Dreadsylvania
    }

    fn filter(&self, log: &RaidLog) -> Result<FilteredLog, ClassifierError> {
        let events = self
            .table
            .classify(&log.events)?
            .into_iter()
            .filter(|e| DREAD_CATEGORIES.contains(&e.category.trim()))
            .collect();
        Ok(FilteredLog {
            dungeon: DungeonKind::Dreadsylvania,
            instance_id: log.instance_id(DungeonKind::Dreadsylvania.log_key()),
            events,
            dread: Some(log.dread.clone()),
        })
    }

    fn is_active(&self, log: &FilteredLog) -> bool {
        let bosses = log
            .events
            .iter()
            .filter(|e| e.db_match.as_ref().is_some_and(ClassifierRow::is_boss_kill))
            .count();
        bosses < DREAD_BOSS_COUNT
    }

    fn cleared_message(&self) -> &'static str {
        "Dreadsylvania bosses defeated!"
    }

    fn poll_interval(&self, configured_secs: u64) -> Duration {
        Duration::from_secs(configured_secs.min(DREAD_MAX_POLL_SECS))
    }

    fn init_data(&self, log: Arc<FilteredLog>) -> InitData {
        InitData {
            log,
            event_db: Some(Arc::clone(self.table.rows())),
        }
    }
}
