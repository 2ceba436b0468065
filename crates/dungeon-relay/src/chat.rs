//! Inbound chat feed.
//!
//! The chat client runs as a separate process and pipes decoded batches to
//! the relay's stdin, one JSON object per line:
//!
//! ```json
//! {"checkNum": 7, "messages": [{"type": "normal", "channel": "hobopolis",
//!   "userName": "dungeon", "userId": -2, "text": "Alice defeated Hodgman."}]}
//! ```

use dungeon_types::ChatMessage;
use serde::Deserialize;

/// One poll's worth of chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBatch {
    /// Identifies the poll; every message in the batch shares it.
    pub check_num: u64,
    /// The decoded messages, in arrival order.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Parse one feed line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ChatBatch>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
