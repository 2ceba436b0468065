//! Error types for raid log downloads.
//!
//! Uses `thiserror` for typed errors. Only [`FetchError::Transport`] is
//! considered transient; everything else is surfaced to the caller as-is.

/// Errors that can occur while downloading or parsing a raid log.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server redirected the request to the login page.
    #[error("not logged in: request was redirected to the login page")]
    NotLoggedIn,

    /// The server redirected the request to the nightly maintenance page.
    #[error("nightly maintenance: request was redirected to the maintenance page")]
    NightlyMaintenance,

    /// The HTTP request failed or returned a non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session could not be set up (bad base URL, cookie or client).
    #[error("session error: {0}")]
    Session(String),

    /// A built-in scraping pattern failed to compile.
    #[error("raid log pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Every attempt of a retried fetch failed.
    #[error("raid log fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// True for failures worth retrying.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// True if the failure means the session is no longer usable.
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotLoggedIn | Self::NightlyMaintenance)
    }
}
