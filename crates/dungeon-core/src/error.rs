//! Error types for the dungeon managers.
//!
//! [`ManagerError`] wraps every failure a manager operation can surface.
//! Transport flakes never reach it: they are retried, and on exhaustion the
//! manager falls back to its cached log.

use dungeon_raidlog::FetchError;

use crate::classifier::ClassifierError;
use crate::persist::PersistError;

/// Errors surfaced by [`DungeonManager`](crate::manager::DungeonManager)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The session is logged out or the server is in maintenance.
    #[error("fetch error: {source}")]
    Fetch {
        /// The underlying fetch error.
        #[from]
        source: FetchError,
    },

    /// Classification of the fetched log failed.
    #[error("classifier error: {source}")]
    Classifier {
        /// The underlying classifier error.
        #[from]
        source: ClassifierError,
    },

    /// Loading or saving persistent state failed.
    #[error("persist error: {source}")]
    Persist {
        /// The underlying store error.
        #[from]
        source: PersistError,
    },

    /// The event snapshot could not be encoded for persistent state.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

impl ManagerError {
    /// True if the session is gone and polling cannot continue.
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Fetch { source } if source.is_disconnect())
    }
}
