//! HTTP download of `clan_raidlogs.php`.
//!
//! The server answers an unauthenticated or out-of-hours request with a
//! redirect rather than an error status, so the final URL after redirects is
//! inspected: a login page means the session expired, a maintenance page
//! means the nightly reset is running. Both mark the session disconnected.

use std::sync::Arc;

use dungeon_types::RaidLog;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::parse::RaidLogParser;
use crate::retry::RetryPolicy;
use crate::session::Session;

/// Server-relative path of the raid log page.
pub const RAIDLOG_PATH: &str = "clan_raidlogs.php";

/// Downloads and parses raid logs for one session.
#[derive(Debug)]
pub struct RaidLogClient {
    session: Arc<Session>,
    parser: RaidLogParser,
}

impl RaidLogClient {
    /// Create a client bound to `session`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Pattern`] if the scraping patterns fail to
    /// compile.
    pub fn new(session: Arc<Session>) -> Result<Self, FetchError> {
        Ok(Self {
            session,
            parser: RaidLogParser::new()?,
        })
    }

    /// The session this client downloads with.
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Fetch and parse the current raid log.
    ///
    /// # Errors
    ///
    /// See [`RaidLogClient::fetch_raid`].
    pub async fn fetch(&self) -> Result<RaidLog, FetchError> {
        self.fetch_raid(None).await
    }

    /// Fetch and parse a raid log, optionally an old run by id.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotLoggedIn`] or [`FetchError::NightlyMaintenance`]
    /// when redirected, and [`FetchError::Transport`] when the request fails.
    pub async fn fetch_raid(&self, raid_id: Option<i64>) -> Result<RaidLog, FetchError> {
        let body = self.download(raid_id).await?;
        Ok(self.parser.parse(&body, raid_id))
    }

    /// Fetch the current raid log, retrying transport failures per `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RetriesExhausted`] when every attempt failed, or
    /// the first non-transient error.
    pub async fn fetch_with_retry(&self, policy: &RetryPolicy) -> Result<RaidLog, FetchError> {
        policy.run("raid log fetch", || self.fetch()).await
    }

    /// Like [`RaidLogClient::fetch_with_retry`] but logs and swallows errors.
    pub async fn fetch_or_none(&self, policy: &RetryPolicy) -> Option<RaidLog> {
        match self.fetch_with_retry(policy).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %e, "raid log fetch failed, continuing without a log");
                None
            }
        }
    }

    async fn download(&self, raid_id: Option<i64>) -> Result<String, FetchError> {
        let mut url = self.session.endpoint(RAIDLOG_PATH)?;
        if let Some(id) = raid_id {
            url.query_pairs_mut().append_pair("viewlog", &id.to_string());
        }

        debug!(url = %url, "requesting raid log");

        let mut request = self.session.client().post(url);
        if let Some(pwd) = self.session.pwd_hash() {
            request = request.form(&[("pwd", pwd)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("raid log request failed: {e}")))?;

        let final_path = response.url().path().to_owned();
        if final_path.ends_with("login.php") {
            warn!(path = final_path, "raid log request redirected to login page");
            self.session.mark_disconnected();
            return Err(FetchError::NotLoggedIn);
        }
        if final_path.ends_with("maint.php") {
            warn!(path = final_path, "raid log request redirected to maintenance page");
            self.session.mark_disconnected();
            return Err(FetchError::NightlyMaintenance);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport(format!(
                "raid log request returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read raid log body: {e}")))?;

        self.session.mark_connected();
        debug!(bytes = body.len(), "raid log downloaded");
        Ok(body)
    }
}
