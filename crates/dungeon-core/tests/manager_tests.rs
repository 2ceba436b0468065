//! End-to-end tests for the dungeon manager.
//!
//! Each test runs a real [`DungeonManager`] against a `wiremock` server
//! serving raid log pages, with an in-memory store and a recording sink.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

mod common;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use common::{
    Call, CountingStore, Outputs, Recorder, calls, dungeon_chat, page, request_count, serve_page,
};
use dungeon_core::classifier::{ClassifierError, DREAD_CSV};
use dungeon_core::dungeon::InitData;
use dungeon_core::manager::RESET_MESSAGE;
use dungeon_core::persist::{HOID_KEY, INIT_KEY, LOG_KEY};
use dungeon_core::{
    BusMessage, ChatSink, ClassifierTable, ConfigError, CsvLoader, Dreadsylvania, DungeonManager,
    DungeonModule, EventBus, Hobopolis, ManagerConfig, ManagerError, MemoryStore, PersistError,
    PersistStore, PersistentState, RecordingSink, SubscriberId,
};
use dungeon_raidlog::FetchError;
use dungeon_types::{ChatKind, ChatMessage, FilteredLog};
use serde_json::json;
use tracing_test::traced_test;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEWER_GATOR: (&str, &str) = ("Sewers", "Alice (#1) defeated a sewer gator (3 turns)");
const SEWER_EXPLORE: (&str, &str) = ("Sewers", "Bob (#2) explored the sewers (12 turns)");
const HODGMAN: (&str, &str) = ("Town Square", "Alice (#1) defeated  Hodgman (1 turn)");

fn stored(entries: &[(&str, serde_json::Value)]) -> MemoryStore {
    let state: PersistentState = entries
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect();
    MemoryStore::with_state("hobopolis", state)
}

fn hobopolis(
    server: &MockServer,
    outputs: &Outputs,
) -> (Arc<DungeonManager<Hobopolis>>, common::Calls) {
    let (module, calls) = Recorder::new();
    let manager = DungeonManager::new(
        Hobopolis::new().unwrap(),
        &ManagerConfig::with_interval("hobopolis", 15),
        vec![module],
        outputs.deps(server, &EventBus::new()),
    )
    .unwrap();
    (Arc::new(manager), calls)
}

fn dread_table(rows: &str) -> (tempfile::TempDir, ClassifierTable) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(DREAD_CSV),
        format!("category,regex,zone,subzone\n{rows}"),
    )
    .unwrap();
    let table = ClassifierTable::load(&CsvLoader::new(dir.path()), DREAD_CSV).unwrap();
    (dir, table)
}

/// Hook bookkeeping shared between a test and its [`Exclusive`] module.
#[derive(Debug, Default)]
struct HookStats {
    inside: AtomicBool,
    overlaps: AtomicUsize,
    calls: AtomicUsize,
}

/// Module that flags any hook entered while another is still running.
struct Exclusive(Arc<HookStats>);

impl Exclusive {
    fn hook(&self) {
        if self.0.inside.swap(true, Ordering::SeqCst) {
            self.0.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        self.0.inside.store(false, Ordering::SeqCst);
    }
}

impl DungeonModule for Exclusive {
    fn initialize(&mut self, _saved: Option<&serde_json::Value>, _init: &InitData) {
        self.hook();
    }

    fn process_log(&mut self, _log: &FilteredLog) {
        self.hook();
    }

    fn process_dungeon(&mut self, _text: &str, _log: &FilteredLog) -> Option<String> {
        self.hook();
        None
    }

    fn reset(&mut self, _init: &InitData) {
        self.hook();
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cold_start_same_instance_keeps_module_state() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(stored(&[
        (HOID_KEY, json!(42)),
        ("recorder", json!({ "kills": 3 })),
    ]));
    let (manager, recorded) = hobopolis(&server, &outputs);

    manager.initialize().await.unwrap();
    manager.on_heartbeat().await.unwrap();

    assert_eq!(request_count(&server).await, 1);
    assert_eq!(
        calls(&recorded),
        vec![
            Call::Init {
                saved: Some(json!({ "kills": 3 })),
                instance: Some(42),
            },
            Call::Log {
                instance: Some(42),
                events: 1,
            },
        ]
    );
    assert_eq!(manager.is_active().await, Some(true));
    assert_eq!(manager.current_instance_id().await, Some(42));
    assert!(outputs.sink.sent().is_empty());

    let saved = outputs.store.load("hobopolis").unwrap();
    assert_eq!(saved.get("recorder"), Some(&json!({ "kills": 3 })));
    assert_eq!(saved.get(INIT_KEY), Some(&json!(true)));
    assert_eq!(saved.get(LOG_KEY).and_then(|v| v.as_array()).map(Vec::len), Some(1));
}

#[tokio::test]
async fn instance_change_while_offline_wipes_before_initialize() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:43", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(stored(&[(HOID_KEY, json!(42)), ("recorder", json!("old"))]));
    let (manager, recorded) = hobopolis(&server, &outputs);

    manager.initialize().await.unwrap();

    assert_eq!(
        calls(&recorded),
        vec![
            Call::Init {
                saved: None,
                instance: Some(43),
            },
            Call::Log {
                instance: Some(43),
                events: 1,
            },
        ]
    );
    let saved = outputs.store.load("hobopolis").unwrap();
    assert_eq!(saved.instance_id(HOID_KEY), Some(43));
    assert!(!saved.contains("recorder"));
    assert!(outputs.sink.sent().is_empty());
}

#[tokio::test]
async fn missing_stored_id_is_seeded() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[])).await;
    let outputs = Outputs::new(stored(&[("recorder", json!("orphan"))]));
    let (manager, recorded) = hobopolis(&server, &outputs);

    manager.initialize().await.unwrap();

    assert_eq!(
        calls(&recorded)[0],
        Call::Init {
            saved: None,
            instance: Some(42),
        }
    );
    assert_eq!(manager.current_instance_id().await, Some(42));
}

#[tokio::test]
async fn clear_persist_forgets_the_instance() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(stored(&[(HOID_KEY, json!(42)), ("recorder", json!(1))]));
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    manager.clear_persist().await.unwrap();

    assert_eq!(outputs.store.load("hobopolis").unwrap(), PersistentState::new());
    assert_eq!(manager.current_instance_id().await, None);

    manager.update_logs(true).await.unwrap();
    assert_eq!(manager.current_instance_id().await, Some(42));
    assert!(outputs.sink.sent().is_empty());
    assert!(
        !calls(&recorded)
            .iter()
            .any(|call| matches!(call, Call::Reset { .. }))
    );
}

#[tokio::test]
async fn heartbeat_only_retries_a_failed_flush() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let store = Arc::new(CountingStore::default());
    let (module, _recorded) = Recorder::new();
    let manager = DungeonManager::new(
        Hobopolis::new().unwrap(),
        &ManagerConfig::with_interval("hobopolis", 15),
        vec![module],
        common::deps(
            &server,
            &EventBus::new(),
            Arc::clone(&store) as Arc<dyn PersistStore>,
            Arc::new(RecordingSink::new()) as Arc<dyn ChatSink>,
            Duration::ZERO,
        ),
    )
    .unwrap();

    manager.initialize().await.unwrap();
    assert_eq!(store.saves(), 1);
    manager.on_heartbeat().await.unwrap();
    assert_eq!(store.saves(), 1);

    store.fail_next_save();
    let result = manager.update_logs(true).await;
    assert!(matches!(
        result,
        Err(ManagerError::Persist {
            source: PersistError::Io { .. }
        })
    ));

    manager.on_heartbeat().await.unwrap();
    assert_eq!(store.saves(), 2);
    manager.on_heartbeat().await.unwrap();
    assert_eq!(store.saves(), 2);
    assert_eq!(
        store.load("hobopolis").unwrap().instance_id(HOID_KEY),
        Some(42)
    );
}

#[tokio::test]
async fn wrong_channel_and_bad_interval_are_rejected() {
    let server = MockServer::start().await;
    let outputs = Outputs::new(MemoryStore::new());

    let wrong = DungeonManager::new(
        Hobopolis::new().unwrap(),
        &ManagerConfig::new("dread"),
        Vec::new(),
        outputs.deps(&server, &EventBus::new()),
    );
    assert!(matches!(wrong, Err(ConfigError::WrongChannel { .. })));

    let config: ManagerConfig =
        serde_yml::from_str("channel: hobopolis\nlog_check_interval: soon").unwrap();
    let bad = DungeonManager::new(
        Hobopolis::new().unwrap(),
        &config,
        Vec::new(),
        outputs.deps(&server, &EventBus::new()),
    );
    assert!(matches!(bad, Err(ConfigError::BadConfig { .. })));
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn instance_rollover_resets_modules_before_next_log() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(stored(&[(HOID_KEY, json!(42)), ("foo", json!("x"))]));
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();
    assert!(outputs.store.load("hobopolis").unwrap().contains("foo"));

    serve_page(&server, page("hoid:43", &[SEWER_EXPLORE])).await;
    manager.update_logs(true).await.unwrap();

    assert_eq!(outputs.sink.sent(), vec![RESET_MESSAGE.to_owned()]);
    assert_eq!(
        calls(&recorded)[2..],
        [
            Call::Reset {
                instance: Some(43),
                has_event_db: false,
            },
            Call::Log {
                instance: Some(43),
                events: 1,
            },
        ]
    );

    let saved = outputs.store.load("hobopolis").unwrap();
    assert_eq!(saved.instance_id(HOID_KEY), Some(43));
    assert!(saved.keys().all(PersistentState::is_reserved));
    assert!(saved.contains(LOG_KEY));
}

#[tokio::test]
#[traced_test]
async fn hodgman_kill_clears_without_reset() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(stored(&[(HOID_KEY, json!(42))]));
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();
    assert_eq!(manager.is_active().await, Some(true));

    serve_page(&server, page("hoid:42", &[SEWER_GATOR, HODGMAN])).await;
    manager.update_logs(true).await.unwrap();

    assert_eq!(manager.is_active().await, Some(false));
    assert!(logs_contain("Hodgman killed!"));
    assert!(outputs.sink.sent().is_empty());
    assert!(
        !calls(&recorded)
            .iter()
            .any(|call| matches!(call, Call::Reset { .. }))
    );
}

#[tokio::test]
async fn concurrent_updates_share_one_fetch() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, _recorded) = hobopolis(&server, &outputs);

    let (a, b, c) = tokio::join!(
        manager.update_logs(false),
        manager.update_logs(false),
        manager.update_logs(false)
    );

    assert_eq!(request_count(&server).await, 1);
    for log in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(log.instance_id, Some(42));
        assert_eq!(log.events.len(), 1);
    }
}

#[tokio::test]
async fn heartbeat_respects_the_polling_delay() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, _recorded) = hobopolis(&server, &outputs);

    manager.on_heartbeat().await.unwrap();
    assert_eq!(request_count(&server).await, 0);

    manager.initialize().await.unwrap();
    manager.on_heartbeat().await.unwrap();
    manager.on_heartbeat().await.unwrap();
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn snapshots_are_isolated_from_the_cache() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR, SEWER_EXPLORE])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, _recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    let snapshot = manager.last_events().await;
    let mut copy = (*snapshot).clone();
    copy.events.clear();
    copy.instance_id = Some(999);

    let again = manager.last_events().await;
    assert_eq!(again.events.len(), 2);
    assert_eq!(again.instance_id, Some(42));
}

#[tokio::test]
async fn log_without_instance_leaves_state_alone() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    serve_page(&server, page("no ids here", &[SEWER_EXPLORE])).await;
    let log = manager.update_logs(true).await.unwrap();

    assert!(log.events.is_empty());
    assert_eq!(log.instance_id, None);
    assert_eq!(manager.last_events().await.instance_id, Some(42));
    assert_eq!(manager.current_instance_id().await, Some(42));
    assert_eq!(calls(&recorded).len(), 2);
}

#[tokio::test]
async fn exhausted_retries_fall_back_to_cache() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, _recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    server.reset().await;
    Mock::given(path("/clan_raidlogs.php"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let log = manager.update_logs(true).await.unwrap();
    assert_eq!(log.instance_id, Some(42));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn login_redirect_surfaces_as_fetch_error() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, _recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    server.reset().await;
    Mock::given(path("/clan_raidlogs.php"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login.php"))
        .mount(&server)
        .await;
    Mock::given(path("/login.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = manager.update_logs(true).await;
    assert!(matches!(
        result,
        Err(ManagerError::Fetch {
            source: FetchError::NotLoggedIn
        })
    ));
    assert_eq!(manager.last_events().await.instance_id, Some(42));
}

// ---------------------------------------------------------------------------
// Dungeon chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_chat_batch_forces_fetch_and_reuses_it_within_batch() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(stored(&[(HOID_KEY, json!(42))]));
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    serve_page(&server, page("hoid:42", &[SEWER_GATOR, SEWER_EXPLORE])).await;
    let replies = manager
        .on_chat(&dungeon_chat("Bob explored the sewers."), 7)
        .await
        .unwrap();

    assert_eq!(replies, vec!["ack: Bob explored the sewers."]);
    assert_eq!(request_count(&server).await, 1);
    assert_eq!(
        calls(&recorded).last(),
        Some(&Call::Dungeon {
            text: "Bob explored the sewers.".to_owned(),
            instance: Some(42),
            events: 2,
        })
    );

    manager
        .on_chat(&dungeon_chat("Second line of the same batch."), 7)
        .await
        .unwrap();
    assert_eq!(request_count(&server).await, 1);
    assert_eq!(
        calls(&recorded).last(),
        Some(&Call::Dungeon {
            text: "Second line of the same batch.".to_owned(),
            instance: Some(42),
            events: 2,
        })
    );
    assert_eq!(
        outputs.sink.sent(),
        vec![
            "ack: Bob explored the sewers.".to_owned(),
            "ack: Second line of the same batch.".to_owned(),
        ]
    );
}

#[tokio::test]
async fn regular_chat_is_not_dispatched() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();

    let message = ChatMessage {
        kind: ChatKind::Normal,
        channel: Some("hobopolis".to_owned()),
        user_name: "Alice".to_owned(),
        user_id: 1,
        text: "defeated Hodgman".to_owned(),
    };
    let replies = manager.on_chat(&message, 8).await.unwrap();

    assert!(replies.is_empty());
    assert_eq!(calls(&recorded).len(), 2);
}

#[tokio::test]
async fn shutdown_makes_chat_and_heartbeat_no_ops() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (manager, recorded) = hobopolis(&server, &outputs);
    manager.initialize().await.unwrap();
    manager.shutdown().await.unwrap();

    assert!(!manager.is_initialized().await);
    assert!(manager.on_chat(&dungeon_chat("hello"), 1).await.unwrap().is_empty());
    manager.on_heartbeat().await.unwrap();
    assert_eq!(calls(&recorded).len(), 2);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hook_calls_never_overlap() {
    let server = MockServer::start().await;
    serve_page(&server, page("hoid:42", &[SEWER_GATOR])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let stats = Arc::new(HookStats::default());
    let manager = Arc::new(
        DungeonManager::new(
            Hobopolis::new().unwrap(),
            &ManagerConfig::with_interval("hobopolis", 15),
            vec![Box::new(Exclusive(Arc::clone(&stats)))],
            outputs.deps(&server, &EventBus::new()),
        )
        .unwrap(),
    );
    manager.initialize().await.unwrap();
    let raw = manager.last_raw_log().await.unwrap();
    let sibling = SubscriberId::new();

    let mut tasks = Vec::new();
    for check_num in 0..8_u64 {
        let m = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            m.on_chat(&dungeon_chat("Alice opened the door."), check_num)
                .await
                .map(drop)
        }));
        let m = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move { m.update_logs(true).await.map(drop) }));
        let m = Arc::clone(&manager);
        let message = BusMessage::NewRaidLog {
            origin: sibling,
            log: Arc::clone(&raw),
        };
        tasks.push(tokio::spawn(async move { m.on_event(&message).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(stats.overlaps.load(Ordering::SeqCst), 0);
    // initialize and process_log at startup, then per round: the chat's
    // poll and dispatch, the forced poll and the sibling's log.
    assert_eq!(stats.calls.load(Ordering::SeqCst), 2 + 8 * 4);
}

// ---------------------------------------------------------------------------
// Dreadsylvania
// ---------------------------------------------------------------------------

#[tokio::test]
#[traced_test]
async fn third_dread_boss_clears_without_reset() {
    let (_dir, table) = dread_table(
        "The Woods,defeated +the Great Wolf,(combat),boss\n\
         The Village,defeated +the Zombie Homeowners,(combat),boss\n\
         The Castle,defeated +Count Drunkula,(combat),boss\n",
    );
    let wolf = ("The Woods", "Alice (#1) defeated the Great Wolf (4 turns)");
    let zombies = ("The Village", "Bob (#2) defeated the Zombie Homeowners (3 turns)");
    let count = ("The Castle", "Carol (#3) defeated Count Drunkula (5 turns)");

    let server = MockServer::start().await;
    serve_page(&server, page("dvid:7", &[wolf, zombies])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (module, recorded) = Recorder::new();
    let manager = DungeonManager::new(
        Dreadsylvania::new(Arc::new(table)),
        &ManagerConfig::new("dread"),
        vec![module],
        outputs.deps(&server, &EventBus::new()),
    )
    .unwrap();
    manager.initialize().await.unwrap();
    assert_eq!(manager.is_active().await, Some(true));

    serve_page(&server, page("dvid:7", &[wolf, zombies, count])).await;
    manager.update_logs(true).await.unwrap();

    assert_eq!(manager.is_active().await, Some(false));
    assert!(logs_contain("Dreadsylvania bosses defeated!"));
    assert!(outputs.sink.sent().is_empty());
    assert_eq!(manager.current_instance_id().await, Some(7));
    assert_eq!(
        calls(&recorded)[2..],
        [Call::Log {
            instance: Some(7),
            events: 3,
        }]
    );
}

#[tokio::test]
async fn classifier_conflict_aborts_the_poll() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(DREAD_CSV),
        "category,regex,zone,subzone\n\
         The Castle,defeated +Count Drunkula,(combat),boss\n\
         The Castle,Foo,(noncombat),\n\
         The Castle,happened,(noncombat),\n",
    )
    .unwrap();
    let table = ClassifierTable::load(&CsvLoader::new(dir.path()), DREAD_CSV).unwrap();

    let server = MockServer::start().await;
    serve_page(
        &server,
        page("dvid:7", &[("The Castle", "Alice (#1) defeated Count Drunkula (1 turn)")]),
    )
    .await;
    let outputs = Outputs::new(MemoryStore::new());
    let (module, recorded) = Recorder::new();
    let manager = DungeonManager::new(
        Dreadsylvania::new(Arc::new(table)),
        &ManagerConfig::new("dread"),
        vec![module],
        outputs.deps(&server, &EventBus::new()),
    )
    .unwrap();
    manager.initialize().await.unwrap();

    let before_log = manager.last_events().await;
    let before_state = outputs.store.load("dread").unwrap();
    assert_eq!(before_state.instance_id("__dvid__"), Some(7));
    assert!(before_log.events[0].db_match.as_ref().unwrap().is_boss_kill());

    serve_page(
        &server,
        page(
            "dvid:7",
            &[
                ("The Castle", "Alice (#1) defeated Count Drunkula (1 turn)"),
                ("The Castle", "Bob (#2) Foo happened (1 turn)"),
            ],
        ),
    )
    .await;
    let result = manager.update_logs(true).await;

    match result {
        Err(ManagerError::Classifier {
            source: ClassifierError::DuplicateMatch { first, second, event, .. },
        }) => {
            assert_eq!(first, "Foo");
            assert_eq!(second, "happened");
            assert_eq!(event, "Foo happened");
        }
        other => panic!("expected a duplicate match, got {other:?}"),
    }
    assert_eq!(manager.last_events().await, before_log);
    assert_eq!(outputs.store.load("dread").unwrap(), before_state);
    assert_eq!(calls(&recorded).len(), 2);
}

#[tokio::test]
async fn dread_reset_supplies_event_db() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(DREAD_CSV),
        "category,regex,zone,subzone\nThe Woods,defeated +a ghost,(combat),normal\n",
    )
    .unwrap();
    let table = ClassifierTable::load(&CsvLoader::new(dir.path()), DREAD_CSV).unwrap();

    let server = MockServer::start().await;
    serve_page(&server, page("dvid:7", &[])).await;
    let outputs = Outputs::new(MemoryStore::new());
    let (module, recorded) = Recorder::new();
    let manager = DungeonManager::new(
        Dreadsylvania::new(Arc::new(table)),
        &ManagerConfig::with_interval("dread", 900),
        vec![module],
        outputs.deps(&server, &EventBus::new()),
    )
    .unwrap();
    assert_eq!(manager.delay().as_secs(), 300);
    manager.initialize().await.unwrap();

    serve_page(
        &server,
        page("dvid:8", &[("The Woods", "Carol (#3) defeated a ghost (2 turns)")]),
    )
    .await;
    manager.update_logs(true).await.unwrap();

    assert_eq!(
        calls(&recorded)[2..],
        [
            Call::Reset {
                instance: Some(8),
                has_event_db: true,
            },
            Call::Log {
                instance: Some(8),
                events: 1,
            },
        ]
    );
    let saved = outputs.store.load("dread").unwrap();
    assert!(!saved.contains(LOG_KEY));
}
