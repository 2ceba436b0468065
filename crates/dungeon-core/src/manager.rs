//! The dungeon channel manager.
//!
//! A [`DungeonManager`] polls the raid log for one dungeon, keeps the latest
//! classified snapshot, detects cleared and reset instances, and feeds its
//! modules from both the log and the `dungeon` pseudo-user's chat lines.
//!
//! # Locking
//!
//! Three `tokio` mutexes, always taken in this order and never in reverse:
//!
//! 1. download -- at most one fetch in flight; guards the last fetch time
//! 2. events -- the [`LogCache`], `initialized` and the last chat batch id
//! 3. sync -- modules, the instance tracker and persistent state
//!
//! Every module hook runs under the sync lock, so modules see a total order
//! of logs, chat lines and resets, and a reset is fully applied before the
//! next hook call.

use std::sync::Arc;
use std::time::Duration;

use dungeon_raidlog::{RaidLogClient, RetryPolicy};
use dungeon_types::{ChatMessage, FilteredLog, RaidLog};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, EventBus, SubscriberId};
use crate::cache::LogCache;
use crate::config::{ConfigError, ManagerConfig};
use crate::dungeon::Dungeon;
use crate::error::ManagerError;
use crate::module::{DungeonModule, ModuleSet};
use crate::persist::{INIT_KEY, LOG_KEY, PersistStore, PersistentState};
use crate::sink::ChatSink;
use crate::tracker::{InstanceChange, InstanceTracker, compare_instance};

/// Chat line announcing a new dungeon instance.
pub const RESET_MESSAGE: &str = "The dungeon has been reset!";

/// Shared collaborators of a manager.
#[derive(Clone)]
pub struct ManagerDeps {
    /// Raid log downloader.
    pub client: Arc<RaidLogClient>,
    /// Retry schedule for downloads.
    pub retry: RetryPolicy,
    /// The process-wide event bus.
    pub bus: EventBus,
    /// How long to wait for a sibling's log during initialization.
    pub bus_reply_timeout: Duration,
    /// Persistent state backend.
    pub store: Arc<dyn PersistStore>,
    /// Outbound chat.
    pub sink: Arc<dyn ChatSink>,
}

impl std::fmt::Debug for ManagerDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerDeps")
            .field("client", &self.client)
            .field("retry", &self.retry)
            .field("bus_reply_timeout", &self.bus_reply_timeout)
            .finish_non_exhaustive()
    }
}

/// State behind the download lock.
#[derive(Debug, Default)]
struct FetchState {
    last_fetch_at: Option<Instant>,
}

/// State behind the sync lock.
#[derive(Debug, Default)]
struct SyncState {
    modules: ModuleSet,
    persist: PersistentState,
    tracker: InstanceTracker,
    /// Set while `persist` holds changes the store has not accepted yet.
    dirty: bool,
}

/// Poll-driven manager for one dungeon.
pub struct DungeonManager<D: Dungeon> {
    dungeon: D,
    id: SubscriberId,
    state_key: &'static str,
    delay: Duration,
    deps: ManagerDeps,
    download: Mutex<FetchState>,
    events: Mutex<LogCache>,
    sync: Mutex<SyncState>,
}

impl<D: Dungeon> std::fmt::Debug for DungeonManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DungeonManager")
            .field("dungeon", &self.dungeon.kind())
            .field("id", &self.id)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl<D: Dungeon> DungeonManager<D> {
    /// Create a manager for `dungeon`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WrongChannel`] if `config` does not list the
    /// dungeon's channel and [`ConfigError::BadConfig`] if its
    /// `log_check_interval` is not an integer.
    pub fn new(
        dungeon: D,
        config: &ManagerConfig,
        modules: Vec<Box<dyn DungeonModule>>,
        deps: ManagerDeps,
    ) -> Result<Self, ConfigError> {
        let kind = dungeon.kind();
        if !config.serves(kind) {
            return Err(ConfigError::WrongChannel {
                channel: config.channel.clone(),
                expected: kind.channel().to_owned(),
            });
        }
        let delay = dungeon.poll_interval(config.log_check_interval()?);
        let modules = ModuleSet::new(modules);
        if modules.is_empty() {
            warn!(dungeon = kind.name(), "dungeon manager has no modules");
        }

        info!(
            dungeon = kind.name(),
            channel = %config.channel,
            delay_secs = delay.as_secs(),
            modules = modules.len(),
            "dungeon manager created"
        );

        Ok(Self {
            dungeon,
            id: SubscriberId::new(),
            state_key: kind.channel(),
            delay,
            deps,
            download: Mutex::new(FetchState::default()),
            events: Mutex::new(LogCache::new()),
            sync: Mutex::new(SyncState {
                modules,
                ..SyncState::default()
            }),
        })
    }

    /// The dungeon capability set.
    pub const fn dungeon(&self) -> &D {
        &self.dungeon
    }

    /// This manager's bus identity.
    pub const fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    /// Minimum time between two unforced fetches.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Seed the cache, restore persistent state and initialize the modules.
    ///
    /// A sibling's log is borrowed over the bus when one answers; otherwise
    /// the log is fetched. If the stored instance id is missing or differs
    /// from the fetched one, module state is wiped first. When the log has an
    /// instance id, modules get it through `process_log` right after
    /// `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the session is disconnected, the log
    /// cannot be classified, or persistent state cannot be read or written.
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        let kind = self.dungeon.kind();
        let mut fetch = self.download.lock().await;

        let (raw, fetched_here) = match self
            .deps
            .bus
            .request_raid_log(self.id, self.deps.bus_reply_timeout)
            .await
        {
            Some(log) => (Some(log), false),
            None => match self.deps.client.fetch_with_retry(&self.deps.retry).await {
                Ok(log) => (Some(Arc::new(log)), true),
                Err(e) if e.is_disconnect() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        dungeon = kind.name(),
                        error = %e,
                        "initial raid log fetch failed, starting without a log"
                    );
                    (None, false)
                }
            },
        };

        let filtered = match &raw {
            Some(raw) => Some(Arc::new(self.dungeon.filter(raw)?)),
            None => None,
        };
        if let Some(raw) = &raw {
            fetch.last_fetch_at = Some(Instant::now());
            if fetched_here {
                self.deps.bus.publish_raid_log(self.id, Arc::clone(raw));
            }
        }

        let mut cache = self.events.lock().await;
        let mut sync = self.sync.lock().await;

        let fetched_id = filtered.as_ref().and_then(|log| log.instance_id);
        if let (Some(raw), Some(filtered)) = (&raw, &filtered)
            && fetched_id.is_some()
        {
            cache.store(Arc::clone(raw), Arc::clone(filtered));
        }

        let mut persist = self.deps.store.load(self.state_key)?;
        let key = kind.persist_key();
        let stored_id = persist.instance_id(key);
        let stale = match (stored_id, fetched_id) {
            (None, _) => true,
            (Some(stored), Some(fetched)) => stored != fetched,
            (Some(_), None) => false,
        };
        if stale {
            info!(
                dungeon = kind.name(),
                stored_id = ?stored_id,
                fetched_id = ?fetched_id,
                "instance changed while offline, wiping module state"
            );
            persist.wipe_module_keys();
        }
        if let Some(id) = fetched_id {
            persist.set_instance_id(key, id);
        }
        persist.insert(INIT_KEY, serde_json::Value::Bool(true));

        let log = cache.filtered_or_empty(kind);
        let init = self.dungeon.init_data(Arc::clone(&log));
        sync.modules.initialize(&persist, &init);
        sync.persist = persist;
        if fetched_id.is_some() {
            sync.tracker.seed(self.dungeon.is_active(&log));
            sync.modules.process_log(&log);
            if self.dungeon.keeps_log_snapshot() {
                sync.persist.insert(LOG_KEY, serde_json::to_value(&log.events)?);
            }
        }
        self.flush_locked(&mut sync)?;
        cache.initialized = true;

        info!(
            dungeon = kind.name(),
            instance_id = ?fetched_id,
            active = ?sync.tracker.active(),
            "dungeon manager initialized"
        );
        Ok(())
    }

    /// Stop reacting to heartbeats and chat, and flush persistent state.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Persist`] if the final flush fails.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        self.events.lock().await.initialized = false;
        let mut sync = self.sync.lock().await;
        self.flush_locked(&mut sync)?;
        info!(dungeon = self.dungeon.kind().name(), "dungeon manager shut down");
        Ok(())
    }

    /// Delete this manager's persistent state.
    ///
    /// The stored instance id goes with it, so the next log is adopted
    /// without a reset. Modules keep their in-memory state.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Persist`] if the store cannot remove it.
    pub async fn clear_persist(&self) -> Result<(), ManagerError> {
        let mut sync = self.sync.lock().await;
        self.deps.store.clear(self.state_key)?;
        sync.persist = PersistentState::new();
        sync.dirty = false;
        info!(dungeon = self.dungeon.kind().name(), "persistent state cleared");
        Ok(())
    }

    /// Spawn the task that feeds bus messages into [`Self::on_event`].
    ///
    /// The subscription starts before this returns, so nothing published
    /// afterwards is missed.
    pub fn spawn_bus_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.deps.bus.subscribe();
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let dungeon = manager.dungeon.kind().name();
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if let Err(e) = manager.on_event(&message).await {
                            warn!(dungeon, error = %e, "bus message handling failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(dungeon, skipped, "bus listener lagged, skipping messages");
                    }
                    Err(RecvError::Closed) => {
                        debug!(dungeon, "bus closed, listener exiting");
                        break;
                    }
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Periodic tick: poll the log if due, then retry a failed flush.
    ///
    /// Every hook call flushes on its own, so the store is only written here
    /// when that flush failed. Does nothing until the manager is initialized.
    ///
    /// # Errors
    ///
    /// See [`Self::update_logs`].
    pub async fn on_heartbeat(&self) -> Result<(), ManagerError> {
        if !self.is_initialized().await {
            return Ok(());
        }
        self.update_logs(false).await?;
        let mut sync = self.sync.lock().await;
        if !sync.dirty {
            return Ok(());
        }
        debug!(dungeon = self.dungeon.kind().name(), "retrying persistent state flush");
        self.flush_locked(&mut sync)
    }

    /// Handle an inbound chat message.
    ///
    /// Only lines from the `dungeon` pseudo-user are handled. The first line
    /// of a new batch (`check_num`) forces a fetch so modules see the log
    /// entry behind it; later lines of the same batch reuse the cache.
    /// Returns the reply lines, which have also been sent to the sink.
    ///
    /// # Errors
    ///
    /// See [`Self::update_logs`].
    pub async fn on_chat(
        &self,
        message: &ChatMessage,
        check_num: u64,
    ) -> Result<Vec<String>, ManagerError> {
        let dungeon = self.dungeon.kind().name();
        if !message.is_from_dungeon() {
            debug!(dungeon, user = %message.user_name, "ignoring chat from a regular user");
            return Ok(Vec::new());
        }

        let mut fetch = self.download.lock().await;
        let new_batch = {
            let mut cache = self.events.lock().await;
            if !cache.initialized {
                debug!(dungeon, "dungeon chat before initialization, ignored");
                return Ok(Vec::new());
            }
            let new_batch = cache.last_chat_batch != Some(check_num);
            if new_batch {
                cache.last_chat_batch = Some(check_num);
            }
            new_batch
        };

        let log = if new_batch {
            debug!(dungeon, check_num, "new dungeon chat batch, refreshing raid log");
            self.update_logs_locked(&mut fetch, true).await?
        } else {
            self.last_events().await
        };
        drop(fetch);

        let mut sync = self.sync.lock().await;
        let replies = sync.modules.process_dungeon(&message.text, &log);
        for reply in &replies {
            self.deps.sink.send_chat_message(reply);
        }
        self.flush_locked(&mut sync)?;
        Ok(replies)
    }

    /// Return the current log, fetching first if the cache is older than the
    /// polling delay or `force` is set.
    ///
    /// Concurrent callers are serialized: only one fetch is in flight and
    /// the others see its result as a fresh cache.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Fetch`] if the session is disconnected and
    /// [`ManagerError::Classifier`] if the log is ambiguous; in both cases
    /// the cache and persistent state are unchanged. Exhausted retries are
    /// not an error: the cached log is returned.
    pub async fn update_logs(&self, force: bool) -> Result<Arc<FilteredLog>, ManagerError> {
        let mut fetch = self.download.lock().await;
        self.update_logs_locked(&mut fetch, force).await
    }

    async fn update_logs_locked(
        &self,
        fetch: &mut FetchState,
        force: bool,
    ) -> Result<Arc<FilteredLog>, ManagerError> {
        let fresh = fetch
            .last_fetch_at
            .is_some_and(|at| at.elapsed() < self.delay);
        if fresh && !force {
            return Ok(self.last_events().await);
        }

        let result = self.deps.client.fetch_with_retry(&self.deps.retry).await;
        fetch.last_fetch_at = Some(Instant::now());
        let raw = match result {
            Ok(log) => Arc::new(log),
            Err(e) if e.is_disconnect() => return Err(e.into()),
            Err(e) => {
                warn!(
                    dungeon = self.dungeon.kind().name(),
                    error = %e,
                    "raid log fetch failed, using cached log"
                );
                return Ok(self.last_events().await);
            }
        };

        let filtered = self.dungeon.filter(&raw)?;
        self.deps.bus.publish_raid_log(self.id, Arc::clone(&raw));
        self.apply_log(raw, filtered).await
    }

    /// Handle a bus message from another manager.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if a broadcast log cannot be classified or
    /// applied.
    pub async fn on_event(&self, message: &BusMessage) -> Result<(), ManagerError> {
        if message.origin() == self.id {
            return Ok(());
        }
        let dungeon = self.dungeon.kind().name();

        match message {
            BusMessage::RequestRaidLog { origin, reply } => {
                if let Some(raw) = self.last_raw_log().await {
                    if reply.try_send(raw).is_err() {
                        debug!(dungeon, %origin, "raid log request already answered");
                    } else {
                        debug!(dungeon, %origin, "answered raid log request");
                    }
                }
            }
            BusMessage::NewRaidLog { origin, log } => {
                debug!(dungeon, %origin, "raid log received from sibling");
                let mut fetch = self.download.lock().await;
                let filtered = self.dungeon.filter(log)?;
                fetch.last_fetch_at = Some(Instant::now());
                self.apply_log(Arc::clone(log), filtered).await?;
            }
        }
        Ok(())
    }

    /// Cache a classified log and, once initialized, run tracker and modules.
    ///
    /// Must be called with the download lock held.
    async fn apply_log(
        &self,
        raw: Arc<RaidLog>,
        filtered: FilteredLog,
    ) -> Result<Arc<FilteredLog>, ManagerError> {
        let kind = self.dungeon.kind();
        if filtered.instance_id.is_none() {
            debug!(dungeon = kind.name(), "raid log has no open instance, state unchanged");
            return Ok(Arc::new(FilteredLog::empty(kind)));
        }

        let filtered = Arc::new(filtered);
        let initialized = {
            let mut cache = self.events.lock().await;
            cache.store(raw, Arc::clone(&filtered));
            cache.initialized
        };
        if !initialized {
            return Ok(filtered);
        }

        let mut sync = self.sync.lock().await;
        self.notify_locked(&mut sync, &filtered)?;
        Ok(filtered)
    }

    fn notify_locked(&self, sync: &mut SyncState, log: &Arc<FilteredLog>) -> Result<(), ManagerError> {
        let kind = self.dungeon.kind();
        sync.tracker.observe(&self.dungeon, log);

        let key = kind.persist_key();
        match compare_instance(sync.persist.instance_id(key), log.instance_id) {
            InstanceChange::Adopted(id) => {
                debug!(dungeon = kind.name(), instance_id = id, "instance id adopted");
                sync.persist.set_instance_id(key, id);
            }
            InstanceChange::Reset { previous, current } => {
                info!(
                    dungeon = kind.name(),
                    previous_id = previous,
                    instance_id = current,
                    "dungeon reset"
                );
                self.deps.sink.send_chat_message(RESET_MESSAGE);
                sync.persist.wipe_module_keys();
                sync.persist.set_instance_id(key, current);
                let init = self.dungeon.init_data(Arc::clone(log));
                sync.modules.reset(&init);
            }
            InstanceChange::Unchanged | InstanceChange::Unknown => {}
        }

        sync.modules.process_log(log);
        if self.dungeon.keeps_log_snapshot() {
            sync.persist.insert(LOG_KEY, serde_json::to_value(&log.events)?);
        }
        self.flush_locked(sync)
    }

    fn flush_locked(&self, sync: &mut SyncState) -> Result<(), ManagerError> {
        let SyncState {
            modules,
            persist,
            dirty,
            ..
        } = sync;
        modules.collect_state(persist);
        *dirty = true;
        self.deps.store.save(self.state_key, persist)?;
        *dirty = false;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The latest classified log, empty if none is cached.
    pub async fn last_events(&self) -> Arc<FilteredLog> {
        self.events
            .lock()
            .await
            .filtered_or_empty(self.dungeon.kind())
    }

    /// The latest raw log.
    pub async fn last_raw_log(&self) -> Option<Arc<RaidLog>> {
        self.events.lock().await.raw()
    }

    /// Whether the manager has been initialized and not shut down.
    pub async fn is_initialized(&self) -> bool {
        self.events.lock().await.initialized
    }

    /// Whether the current instance is still being fought.
    pub async fn is_active(&self) -> Option<bool> {
        self.sync.lock().await.tracker.active()
    }

    /// The instance id recorded in persistent state.
    pub async fn current_instance_id(&self) -> Option<i64> {
        self.sync
            .lock()
            .await
            .persist
            .instance_id(self.dungeon.kind().persist_key())
    }

    /// A copy of the persistent state as last written.
    pub async fn persistent_state(&self) -> PersistentState {
        self.sync.lock().await.persist.clone()
    }
}
