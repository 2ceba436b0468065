//! Shared type definitions for the clan dungeon relay.
//!
//! This crate is the single source of truth for the data flowing between the
//! raid log fetcher, the classifier, the channel managers, and the handler
//! modules. Everything here is plain data with `serde` derives so it can be
//! persisted as JSON and shared across threads as immutable snapshots.
//!
//! # Modules
//!
//! - [`raidlog`] -- The parsed raid log: events, Dreadsylvania counters,
//!   loot distribution, previous runs
//! - [`classifier`] -- Rows of the CSV pattern database
//! - [`dungeon`] -- Supported dungeons and the per-dungeon filtered log
//! - [`chat`] -- Inbound chat messages and the `dungeon` pseudo-user

pub mod chat;
pub mod classifier;
pub mod dungeon;
pub mod raidlog;

// Re-export all public types at crate root for convenience.
pub use chat::{ChatKind, ChatMessage, DUNGEON_USER_ID, DUNGEON_USER_NAME};
pub use classifier::ClassifierRow;
pub use dungeon::{DungeonKind, FilteredLog};
pub use raidlog::{DreadStats, DrunkActivity, Event, LootRecord, PreviousRun, RaidLog, RunDate};
