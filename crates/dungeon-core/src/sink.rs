//! Outbound chat.

use std::sync::{Mutex, PoisonError};

/// Where module replies and manager announcements are sent.
pub trait ChatSink: Send + Sync {
    /// Send one line to the manager's channel.
    fn send_chat_message(&self, text: &str);
}

/// Collects sent lines in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChatSink for RecordingSink {
    fn send_chat_message(&self, text: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_owned());
    }
}
