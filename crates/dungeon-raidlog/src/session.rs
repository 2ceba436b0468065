//! The authenticated session handle.
//!
//! Logging in is the chat layer's job; this handle only carries what a raid
//! log request needs (base URL, cookie, `pwd` hash) plus a `connected` flag
//! that fetches clear when the server bounces them to the login or
//! maintenance page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};

use crate::error::FetchError;

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An authenticated connection to the game server.
#[derive(Debug)]
pub struct Session {
    client: reqwest::Client,
    base_url: Url,
    pwd_hash: Option<String>,
    connected: AtomicBool,
}

impl Session {
    /// Build a session for the server at `base_url`.
    ///
    /// `cookie` is sent verbatim as the `Cookie` header on every request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Session`] if the URL or cookie is malformed or
    /// the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        cookie: Option<&str>,
        pwd_hash: Option<String>,
    ) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, cookie, pwd_hash, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Like [`Session::new`] with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Session`] on malformed input.
    pub fn with_timeout(
        base_url: &str,
        cookie: Option<&str>,
        pwd_hash: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        // Url::join drops the last path segment unless it ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| FetchError::Session(format!("invalid base URL {normalized}: {e}")))?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| FetchError::Session(format!("invalid session cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Session(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            pwd_hash,
            connected: AtomicBool::new(true),
        })
    }

    /// The shared HTTP client.
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The server base URL.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The `pwd` form value, if the session has one.
    pub fn pwd_hash(&self) -> Option<&str> {
        self.pwd_hash.as_deref()
    }

    /// Resolve a server-relative path such as `clan_raidlogs.php`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Session`] if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Session(format!("invalid endpoint {path}: {e}")))
    }

    /// Whether the last request found the session logged in.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record that the server rejected the session.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Record that the server accepted the session.
    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }
}
