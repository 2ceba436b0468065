//! Raid log sharing between sibling managers over the event bus.

#![allow(clippy::unwrap_used)]

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{Call, Recorder, calls, deps, eventually, page, request_count, serve_page};
use dungeon_core::classifier::DREAD_CSV;
use dungeon_core::{
    ChatSink, ClassifierTable, CsvLoader, Dreadsylvania, DungeonManager, EventBus, Hobopolis,
    ManagerConfig, MemoryStore, PersistStore, RecordingSink,
};

#[tokio::test]
async fn siblings_share_fetched_logs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(DREAD_CSV),
        "category,regex,zone,subzone\nThe Castle,defeated +a vampire,(combat),normal\n",
    )
    .unwrap();
    let table = ClassifierTable::load(&CsvLoader::new(dir.path()), DREAD_CSV).unwrap();

    let server = wiremock::MockServer::start().await;
    serve_page(
        &server,
        page(
            "hoid:42 dvid:7",
            &[
                ("Sewers", "Alice (#1) defeated a sewer gator (3 turns)"),
                ("The Castle", "Bob (#2) defeated a vampire (1 turn)"),
            ],
        ),
    )
    .await;

    let bus = EventBus::new();
    let store: Arc<dyn PersistStore> = Arc::new(MemoryStore::new());
    let sink: Arc<dyn ChatSink> = Arc::new(RecordingSink::new());
    let timeout = Duration::from_millis(100);

    let (hobo_module, hobo_calls) = Recorder::new();
    let hobo = Arc::new(
        DungeonManager::new(
            Hobopolis::new().unwrap(),
            &ManagerConfig::new("hobopolis"),
            vec![hobo_module],
            deps(&server, &bus, Arc::clone(&store), Arc::clone(&sink), timeout),
        )
        .unwrap(),
    );
    let (dread_module, dread_calls) = Recorder::new();
    let dread = Arc::new(
        DungeonManager::new(
            Dreadsylvania::new(Arc::new(table)),
            &ManagerConfig::new("dread"),
            vec![dread_module],
            deps(&server, &bus, Arc::clone(&store), Arc::clone(&sink), timeout),
        )
        .unwrap(),
    );
    let listeners = [hobo.spawn_bus_listener(), dread.spawn_bus_listener()];

    // Nobody holds a log yet: the first manager fetches and publishes.
    hobo.initialize().await.unwrap();
    assert_eq!(request_count(&server).await, 1);

    // The second one borrows it instead of fetching.
    dread.initialize().await.unwrap();
    assert_eq!(request_count(&server).await, 1);
    let dread_log = dread.last_events().await;
    assert_eq!(dread_log.instance_id, Some(7));
    assert_eq!(dread_log.events.len(), 1);
    assert_eq!(hobo.last_events().await.events.len(), 1);

    // A later fetch by one manager feeds the other's modules.
    serve_page(
        &server,
        page(
            "hoid:42 dvid:7",
            &[
                ("The Castle", "Bob (#2) defeated a vampire (1 turn)"),
                ("The Castle", "Carol (#3) defeated a vampire (2 turns)"),
            ],
        ),
    )
    .await;
    hobo.update_logs(true).await.unwrap();
    assert_eq!(request_count(&server).await, 1);

    let expected = Call::Log {
        instance: Some(7),
        events: 2,
    };
    assert!(eventually(|| calls(&dread_calls).contains(&expected)).await);
    assert_eq!(
        calls(&hobo_calls).last(),
        Some(&Call::Log {
            instance: Some(42),
            events: 0,
        })
    );

    for listener in listeners {
        listener.abort();
    }
}
