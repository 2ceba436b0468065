//! Shared fixtures for the manager integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dungeon_core::dungeon::InitData;
use dungeon_core::{
    ChatSink, DungeonModule, EventBus, ManagerDeps, MemoryStore, PersistError, PersistStore,
    PersistentState, RecordingSink,
};
use dungeon_raidlog::{RaidLogClient, RetryPolicy, Session};
use dungeon_types::{ChatKind, ChatMessage, DUNGEON_USER_ID, DUNGEON_USER_NAME, FilteredLog};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A hook invocation seen by [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Init {
        saved: Option<Value>,
        instance: Option<i64>,
    },
    Log {
        instance: Option<i64>,
        events: usize,
    },
    Dungeon {
        text: String,
        instance: Option<i64>,
        events: usize,
    },
    Reset {
        instance: Option<i64>,
        has_event_db: bool,
    },
}

pub type Calls = Arc<Mutex<Vec<Call>>>;

/// Module that records every hook call.
pub struct Recorder {
    calls: Calls,
}

impl Recorder {
    pub fn new() -> (Box<dyn DungeonModule>, Calls) {
        let calls: Calls = Arc::default();
        (
            Box::new(Self {
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DungeonModule for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn initialize(&mut self, saved: Option<&Value>, init: &InitData) {
        self.push(Call::Init {
            saved: saved.cloned(),
            instance: init.log.instance_id,
        });
    }

    fn process_log(&mut self, log: &FilteredLog) {
        self.push(Call::Log {
            instance: log.instance_id,
            events: log.events.len(),
        });
    }

    fn process_dungeon(&mut self, text: &str, log: &FilteredLog) -> Option<String> {
        self.push(Call::Dungeon {
            text: text.to_owned(),
            instance: log.instance_id,
            events: log.events.len(),
        });
        Some(format!("ack: {text}"))
    }

    fn reset(&mut self, init: &InitData) {
        self.push(Call::Reset {
            instance: init.log.instance_id,
            has_event_db: init.event_db.is_some(),
        });
    }
}

pub fn calls(calls: &Calls) -> Vec<Call> {
    calls.lock().unwrap().clone()
}

/// A raid log page with the given id markers and one block per event.
pub fn page(ids: &str, events: &[(&str, &str)]) -> String {
    let blocks: String = events
        .iter()
        .map(|(category, line)| format!("<b>{category}:</b><blockquote>{line}</blockquote>\n"))
        .collect();
    format!("<html><body><!-- {ids} -->\n{blocks}</body></html>")
}

pub async fn serve_page(server: &MockServer, body: String) {
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/clan_raidlogs.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), 2)
}

pub fn deps(
    server: &MockServer,
    bus: &EventBus,
    store: Arc<dyn PersistStore>,
    sink: Arc<dyn ChatSink>,
    bus_reply_timeout: Duration,
) -> ManagerDeps {
    let session = Session::new(&server.uri(), Some("PHPSESSID=test"), None).unwrap();
    ManagerDeps {
        client: Arc::new(RaidLogClient::new(Arc::new(session)).unwrap()),
        retry: fast_retry(),
        bus: bus.clone(),
        bus_reply_timeout,
        store,
        sink,
    }
}

/// Sink and store handles kept by a test alongside the manager.
pub struct Outputs {
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
}

impl Outputs {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            sink: Arc::new(RecordingSink::new()),
            store: Arc::new(store),
        }
    }

    pub fn deps(&self, server: &MockServer, bus: &EventBus) -> ManagerDeps {
        deps(
            server,
            bus,
            Arc::clone(&self.store) as Arc<dyn PersistStore>,
            Arc::clone(&self.sink) as Arc<dyn ChatSink>,
            Duration::ZERO,
        )
    }
}

/// Memory store that counts saves and can be told to fail the next one.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    saves: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingStore {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_next_save(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl PersistStore for CountingStore {
    fn load(&self, channel: &str) -> Result<PersistentState, PersistError> {
        self.inner.load(channel)
    }

    fn save(&self, channel: &str, state: &PersistentState) -> Result<(), PersistError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PersistError::Io {
                path: PathBuf::from(format!("{channel}.json")),
                source: std::io::Error::other("disk full"),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(channel, state)
    }

    fn clear(&self, channel: &str) -> Result<(), PersistError> {
        self.inner.clear(channel)
    }
}

pub fn dungeon_chat(text: &str) -> ChatMessage {
    ChatMessage {
        kind: ChatKind::Normal,
        channel: Some("hobopolis".to_owned()),
        user_name: DUNGEON_USER_NAME.to_owned(),
        user_id: DUNGEON_USER_ID,
        text: text.to_owned(),
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
