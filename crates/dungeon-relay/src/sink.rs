//! Chat sink that writes outbound lines to the log.

use dungeon_core::ChatSink;
use tracing::info;

/// Logs every outbound chat line with its channel.
///
/// Stands in for the chat transport, which runs outside this process.
#[derive(Debug, Clone, Copy)]
pub struct TracingChatSink {
    channel: &'static str,
}

impl TracingChatSink {
    /// A sink for `channel`.
    pub const fn new(channel: &'static str) -> Self {
        Self { channel }
    }
}

impl ChatSink for TracingChatSink {
    fn send_chat_message(&self, text: &str) {
        info!(target: "chat", channel = self.channel, text, "chat out");
    }
}
