//! The most recent logs of one manager.
//!
//! Both logs are immutable snapshots: an update swaps the `Arc`, so a reader
//! holding an older snapshot keeps a consistent view.

use std::sync::Arc;

use dungeon_types::{DungeonKind, FilteredLog, RaidLog};

/// Cached logs plus the chat and lifecycle flags guarded with them.
#[derive(Debug, Default)]
pub struct LogCache {
    raw: Option<Arc<RaidLog>>,
    filtered: Option<Arc<FilteredLog>>,
    /// Whether the manager has finished initializing.
    pub initialized: bool,
    /// Batch id of the last dungeon chat that forced a fetch.
    pub last_chat_batch: Option<u64>,
}

impl LogCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both logs.
    pub fn store(&mut self, raw: Arc<RaidLog>, filtered: Arc<FilteredLog>) {
        self.raw = Some(raw);
        self.filtered = Some(filtered);
    }

    /// The last raw log, if any.
    pub fn raw(&self) -> Option<Arc<RaidLog>> {
        self.raw.clone()
    }

    /// The last classified log, or an empty one for `dungeon`.
    pub fn filtered_or_empty(&self, dungeon: DungeonKind) -> Arc<FilteredLog> {
        self.filtered
            .clone()
            .unwrap_or_else(|| Arc::new(FilteredLog::empty(dungeon)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_yields_empty_log() {
        let cache = LogCache::new();
        assert!(cache.raw().is_none());
        assert!(cache.filtered_or_empty(DungeonKind::Hobopolis).events.is_empty());
    }

    #[test]
    fn store_swaps_snapshots() {
        let mut cache = LogCache::new();
        let first = Arc::new(FilteredLog {
            instance_id: Some(1),
            ..FilteredLog::default()
        });
        cache.store(Arc::new(RaidLog::default()), Arc::clone(&first));

        let held = cache.filtered_or_empty(DungeonKind::Hobopolis);
        cache.store(
            Arc::new(RaidLog::default()),
            Arc::new(FilteredLog {
                instance_id: Some(2),
                ..FilteredLog::default()
            }),
        );

        assert_eq!(held.instance_id, Some(1));
        assert_eq!(
            cache.filtered_or_empty(DungeonKind::Hobopolis).instance_id,
            Some(2)
        );
    }
}
