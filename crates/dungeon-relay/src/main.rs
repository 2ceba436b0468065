//! Clan dungeon relay binary.
//!
//! Wires the game server session, the classifier tables, the event bus and
//! one manager per configured dungeon, then drives the managers from a
//! heartbeat and the chat feed on stdin until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `dungeon-relay.yaml`
//! 3. Create the session and raid log client
//! 4. Create the classifier loader, event bus and state store
//! 5. Build the dungeon managers
//! 6. Start bus listeners and initialize the managers
//! 7. Run the heartbeat and chat loop
//! 8. Shut the managers down

mod activity;
mod chat;
mod error;
mod managers;
mod sink;

use std::path::Path;
use std::sync::Arc;

use dungeon_core::{
    CsvLoader, EventBus, JsonFileStore, ManagerDeps, ManagerError, PersistStore, RelayConfig,
};
use dungeon_raidlog::{RaidLogClient, RetryPolicy, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::chat::ChatBatch;
use crate::error::RelayError;
use crate::managers::RelayManager;
use crate::sink::TracingChatSink;

const CONFIG_PATH: &str = "dungeon-relay.yaml";

/// Application entry point for the relay.
///
/// # Errors
///
/// Returns an error if startup fails or the game session is lost.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("dungeon-relay starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        base_url = %config.session.base_url,
        database_folder = %config.database_folder.display(),
        state_dir = %config.state_dir.display(),
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        managers = config.managers.len(),
        "Configuration loaded"
    );

    // 3. Create the session and raid log client.
    let session = Arc::new(Session::new(
        &config.session.base_url,
        config.session.cookie.as_deref(),
        config.session.pwd_hash.clone(),
    )?);
    let client = Arc::new(RaidLogClient::new(Arc::clone(&session))?);
    info!(logged_in = config.session.cookie.is_some(), "Raid log client ready");

    // 4. Create the classifier loader, event bus and state store.
    let loader = CsvLoader::new(&config.database_folder);
    let retry = RetryPolicy::from(config.retry);
    let bus = EventBus::new();
    let store: Arc<dyn PersistStore> = Arc::new(JsonFileStore::new(&config.state_dir));

    // 5. Build the dungeon managers, each replying on its own channel.
    let mut managers = Vec::new();
    for manager_config in &config.managers {
        for kind in manager_config.dungeons()? {
            let deps = ManagerDeps {
                client: Arc::clone(&client),
                retry,
                bus: bus.clone(),
                bus_reply_timeout: config.bus_reply_timeout(),
                store: Arc::clone(&store),
                sink: Arc::new(TracingChatSink::new(kind.channel())),
            };
            managers.push(RelayManager::build(kind, manager_config, &loader, deps)?);
        }
    }
    if managers.is_empty() {
        return Err(RelayError::NoManagers.into());
    }
    info!(
        dungeons = ?managers.iter().map(|m| m.kind().name()).collect::<Vec<_>>(),
        "Dungeon managers built"
    );

    // 6. Start bus listeners, then initialize one manager at a time so later
    //    ones can borrow the first one's log.
    let listeners: Vec<_> = managers.iter().map(RelayManager::spawn_bus_listener).collect();
    for manager in &managers {
        manager.initialize().await.map_err(RelayError::from)?;
    }

    // 7. Run the heartbeat and chat loop.
    let outcome = run(&managers, &config).await;

    // 8. Shut the managers down.
    for manager in &managers {
        if let Err(e) = manager.shutdown().await {
            warn!(dungeon = manager.kind().name(), error = %e, "shutdown flush failed");
        }
    }
    for listener in listeners {
        listener.abort();
    }

    outcome?;
    info!("dungeon-relay shutdown complete");
    Ok(())
}

/// Drive the managers until Ctrl-C or a lost session.
async fn run(managers: &[RelayManager], config: &RelayConfig) -> Result<(), RelayError> {
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut feed = BufReader::new(tokio::io::stdin()).lines();
    let mut feed_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        "Entering heartbeat loop"
    );

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
                }
                info!("Shutdown requested");
                return Ok(());
            }
            _ = heartbeat.tick() => {
                for manager in managers {
                    tolerate(manager, manager.on_heartbeat().await)?;
                }
            }
            line = feed.next_line(), if feed_open => match line {
                Ok(Some(line)) => match chat::parse_line(&line) {
                    Ok(Some(batch)) => dispatch(managers, &batch).await?,
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "malformed chat feed line"),
                },
                Ok(None) => {
                    info!("Chat feed closed");
                    feed_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "chat feed read failed, feed disabled");
                    feed_open = false;
                }
            },
        }
    }
}

async fn dispatch(managers: &[RelayManager], batch: &ChatBatch) -> Result<(), RelayError> {
    for message in &batch.messages {
        for manager in managers {
            let result = manager.on_chat(message, batch.check_num).await.map(drop);
            tolerate(manager, result)?;
        }
    }
    Ok(())
}

/// Log a failed manager operation, propagating only a lost session.
fn tolerate(manager: &RelayManager, result: Result<(), ManagerError>) -> Result<(), RelayError> {
    match result {
        Err(e) if e.is_disconnect() => Err(e.into()),
        Err(e) => {
            warn!(dungeon = manager.kind().name(), error = %e, "manager operation failed");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Load the relay configuration from `dungeon-relay.yaml`.
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<RelayConfig, RelayError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(RelayConfig::from_file(config_path)?)
    } else {
        info!("Config file not found, using defaults");
        let mut config = RelayConfig::default();
        config.session.apply_env_overrides();
        Ok(config)
    }
}
