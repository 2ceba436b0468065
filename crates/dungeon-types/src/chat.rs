//! Inbound chat messages.
//!
//! The chat transport itself lives outside this workspace; managers only see
//! already-decoded [`ChatMessage`] values.

use serde::{Deserialize, Serialize};

/// Name of the pseudo-user the server uses for dungeon announcements.
pub const DUNGEON_USER_NAME: &str = "dungeon";

/// Id of the pseudo-user the server uses for dungeon announcements.
pub const DUNGEON_USER_ID: i64 = -2;

/// How a chat line was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// A regular line in the current channel.
    Normal,
    /// A line from a channel being listened to.
    Listen,
    /// A `/me` emote.
    Emote,
    /// A private message.
    Private,
}

/// A decoded inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Delivery kind.
    #[serde(rename = "type")]
    pub kind: ChatKind,
    /// Channel the line arrived on (absent for private messages).
    #[serde(default)]
    pub channel: Option<String>,
    /// Sender name.
    pub user_name: String,
    /// Sender id.
    pub user_id: i64,
    /// Message body.
    pub text: String,
}

impl ChatMessage {
    /// True if the line was injected by the server's `dungeon` pseudo-user.
    pub fn is_from_dungeon(&self) -> bool {
        self.user_name == DUNGEON_USER_NAME && self.user_id == DUNGEON_USER_ID
    }
}
