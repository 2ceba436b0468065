//! Dungeon channel managers for the clan dungeon relay.
//!
//! This crate turns raid logs into a race-free event stream for modules:
//! it classifies each log, tracks the dungeon instance, persists module
//! state, and shares fetched logs between managers over an in-process bus.
//!
//! # Architecture
//!
//! ```text
//! heartbeat / dungeon chat / bus
//!            |
//!            v
//!   DungeonManager<D> --fetch--> RaidLogClient
//!            |
//!            +--> D::filter (ClassifierTable for Dreadsylvania)
//!            +--> LogCache (Arc snapshots)
//!            +--> InstanceTracker (cleared / reset)
//!            +--> ModuleSet (process_log, process_dungeon, reset)
//!            +--> PersistStore (flush)
//! ```
//!
//! # Modules
//!
//! - [`bus`] -- [`EventBus`] broadcast with request-reply
//! - [`cache`] -- [`LogCache`] of the latest snapshots
//! - [`classifier`] -- [`CsvLoader`] and [`ClassifierTable`]
//! - [`config`] -- Configuration loading from `dungeon-relay.yaml`
//! - [`dungeon`] -- The [`Dungeon`] trait, [`Hobopolis`] and [`Dreadsylvania`]
//! - [`error`] -- [`ManagerError`]
//! - [`manager`] -- [`DungeonManager`], the dispatcher
//! - [`module`] -- The [`DungeonModule`] hooks
//! - [`persist`] -- [`PersistentState`] and its stores
//! - [`sink`] -- Outbound [`ChatSink`]
//! - [`tracker`] -- [`InstanceTracker`] and reset detection

pub mod bus;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod dungeon;
pub mod error;
pub mod manager;
pub mod module;
pub mod persist;
pub mod sink;
pub mod tracker;

pub use bus::{BusMessage, EventBus, SubscriberId};
pub use cache::LogCache;
pub use classifier::{ClassifierError, ClassifierTable, CsvLoader};
pub use config::{ConfigError, ManagerConfig, RelayConfig};
pub use dungeon::{Dreadsylvania, Dungeon, Hobopolis, InitData};
pub use error::ManagerError;
pub use manager::{DungeonManager, ManagerDeps};
pub use module::{DungeonModule, ModuleSet};
pub use persist::{JsonFileStore, MemoryStore, PersistError, PersistStore, PersistentState};
pub use sink::{ChatSink, RecordingSink};
pub use tracker::{ActiveTransition, InstanceChange, InstanceTracker};
