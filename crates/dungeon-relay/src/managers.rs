//! The set of running dungeon managers.
//!
//! [`DungeonManager`] is generic over its dungeon, so the relay keeps its
//! managers behind [`RelayManager`], one variant per dungeon.

use std::sync::Arc;

use dungeon_core::classifier::DREAD_CSV;
use dungeon_core::{
    ClassifierTable, CsvLoader, Dreadsylvania, DungeonManager, DungeonModule, Hobopolis,
    ManagerConfig, ManagerDeps, ManagerError,
};
use dungeon_types::{ChatMessage, DungeonKind};
use tokio::task::JoinHandle;

use crate::activity::ActivityLog;
use crate::error::RelayError;

/// A manager for one of the supported dungeons.
#[derive(Debug, Clone)]
pub enum RelayManager {
    /// The Hobopolis manager.
    Hobopolis(Arc<DungeonManager<Hobopolis>>),
    /// The Dreadsylvania manager.
    Dreadsylvania(Arc<DungeonManager<Dreadsylvania>>),
}

macro_rules! each {
    ($self:expr, $manager:ident => $body:expr) => {
        match $self {
            RelayManager::Hobopolis($manager) => $body,
            RelayManager::Dreadsylvania($manager) => $body,
        }
    };
}

impl RelayManager {
    /// Build the manager for `kind` with the default module set.
    ///
    /// The Dreadsylvania classifier table is loaded through `loader`. Replies
    /// go to `deps.sink` unchanged.
    pub fn build(
        kind: DungeonKind,
        config: &ManagerConfig,
        loader: &CsvLoader,
        deps: ManagerDeps,
    ) -> Result<Self, RelayError> {
        let modules: Vec<Box<dyn DungeonModule>> = vec![Box::new(ActivityLog::new(kind))];

        Ok(match kind {
            DungeonKind::Hobopolis => Self::Hobopolis(Arc::new(DungeonManager::new(
                Hobopolis::new()?,
                config,
                modules,
                deps,
            )?)),
            DungeonKind::Dreadsylvania => {
                let table = ClassifierTable::load(loader, DREAD_CSV)?;
                Self::Dreadsylvania(Arc::new(DungeonManager::new(
                    Dreadsylvania::new(Arc::new(table)),
                    config,
                    modules,
                    deps,
                )?))
            }
        })
    }

    /// Which dungeon this manager serves.
    pub const fn kind(&self) -> DungeonKind {
        match self {
            Self::Hobopolis(_) => DungeonKind::Hobopolis,
            Self::Dreadsylvania(_) => DungeonKind::Dreadsylvania,
        }
    }

    /// See [`DungeonManager::spawn_bus_listener`].
    pub fn spawn_bus_listener(&self) -> JoinHandle<()> {
        each!(self, manager => manager.spawn_bus_listener())
    }

    /// See [`DungeonManager::initialize`].
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        each!(self, manager => manager.initialize().await)
    }

    /// See [`DungeonManager::on_heartbeat`].
    pub async fn on_heartbeat(&self) -> Result<(), ManagerError> {
        each!(self, manager => manager.on_heartbeat().await)
    }

    /// Dispatch `message` if it arrived on this manager's channel.
    pub async fn on_chat(
        &self,
        message: &ChatMessage,
        check_num: u64,
    ) -> Result<Vec<String>, ManagerError> {
        if message.channel.as_deref() != Some(self.kind().channel()) {
            return Ok(Vec::new());
        }
        each!(self, manager => manager.on_chat(message, check_num).await)
    }

    /// See [`DungeonManager::shutdown`].
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        each!(self, manager => manager.shutdown().await)
    }
}
