//! Error types for the relay binary.
//!
//! [`RelayError`] wraps every failure that can stop the relay during startup
//! or shutdown.

/// Top-level error for the relay binary.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: dungeon_core::ConfigError,
    },

    /// The game server session could not be set up or was lost.
    #[error("session error: {source}")]
    Fetch {
        /// The underlying fetch error.
        #[from]
        source: dungeon_raidlog::FetchError,
    },

    /// The Dreadsylvania classifier table could not be loaded.
    #[error("classifier error: {source}")]
    Classifier {
        /// The underlying classifier error.
        #[from]
        source: dungeon_core::ClassifierError,
    },

    /// A dungeon manager failed.
    #[error("manager error: {source}")]
    Manager {
        /// The underlying manager error.
        #[from]
        source: dungeon_core::ManagerError,
    },

    /// No manager could be created from the configuration.
    #[error("no dungeon managers configured")]
    NoManagers,
}
