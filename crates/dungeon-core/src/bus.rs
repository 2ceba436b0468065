//! In-process event bus shared by the dungeon managers.
//!
//! Managers publish every freshly fetched raid log so siblings can skip
//! their own download, and an initializing manager can ask whether anyone
//! already holds a current log. Both travel over one broadcast channel;
//! requests carry an `mpsc` sender for the replies.

use std::sync::Arc;
use std::time::Duration;

use dungeon_types::RaidLog;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

/// Capacity of the broadcast channel.
///
/// Managers drain it continuously; a receiver that falls further behind
/// gets [`broadcast::error::RecvError::Lagged`] and skips ahead.
const BUS_CAPACITY: usize = 64;

/// Identifies the sender of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message on the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// `request_raid_log`: anyone holding a current log should reply.
    RequestRaidLog {
        /// The asking manager.
        origin: SubscriberId,
        /// Where replies go.
        reply: mpsc::Sender<Arc<RaidLog>>,
    },
    /// `new_raid_log`: a manager just fetched this log.
    NewRaidLog {
        /// The fetching manager.
        origin: SubscriberId,
        /// The raw log.
        log: Arc<RaidLog>,
    },
}

impl BusMessage {
    /// The sender of this message.
    pub const fn origin(&self) -> SubscriberId {
        match self {
            Self::RequestRaidLog { origin, .. } | Self::NewRaidLog { origin, .. } => *origin,
        }
    }
}

/// Handle to the bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Publish a message. Returns the number of receivers it reached.
    pub fn publish(&self, message: BusMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    /// Announce a freshly fetched log.
    pub fn publish_raid_log(&self, origin: SubscriberId, log: Arc<RaidLog>) -> usize {
        self.publish(BusMessage::NewRaidLog { origin, log })
    }

    /// Ask the other subscribers for their current log.
    ///
    /// Returns the first reply, or `None` if nobody answers within
    /// `timeout`.
    pub async fn request_raid_log(
        &self,
        origin: SubscriberId,
        timeout: Duration,
    ) -> Option<Arc<RaidLog>> {
        let (reply, mut replies) = mpsc::channel(1);
        let reached = self.publish(BusMessage::RequestRaidLog { origin, reply });
        if reached <= 1 {
            debug!(%origin, "no other bus subscribers to ask for a raid log");
        }

        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(log)) => {
                debug!(%origin, "raid log received over the bus");
                Some(log)
            }
            Ok(None) => None,
            Err(_) => {
                debug!(%origin, timeout_ms = timeout.as_millis(), "no raid log reply before timeout");
                None
            }
        }
    }
}
