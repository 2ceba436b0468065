//! Raid log download and parsing for the clan dungeon relay.
//!
//! The remote game exposes a clan's dungeon activity as an HTML page,
//! `clan_raidlogs.php`. This crate fetches that page with an authenticated
//! [`Session`], scrapes it into a [`dungeon_types::RaidLog`], and retries
//! transient failures with exponential backoff.
//!
//! # Architecture
//!
//! ```text
//! Session --> RaidLogClient (POST clan_raidlogs.php) --> RaidLogParser --> RaidLog
//!                  ^                                         |
//!                  +----------- RetryPolicy (transport) -----+
//! ```
//!
//! # Modules
//!
//! - [`client`] -- HTTP fetcher and redirect classification
//! - [`error`] -- [`FetchError`]
//! - [`parse`] -- Regex scraping of the raid log HTML
//! - [`retry`] -- Exponential backoff policy
//! - [`session`] -- The session handle shared with the chat layer

pub mod client;
pub mod error;
pub mod parse;
pub mod retry;
pub mod session;

pub use client::RaidLogClient;
pub use error::FetchError;
pub use parse::RaidLogParser;
pub use retry::RetryPolicy;
pub use session::Session;
