//! harbor-inspect - print the durable sync state of a Harbor client.
//!
//! Reads the queue and the persisted state subset from the file store named
//! by `HARBOR_STORAGE_DIR` and prints them as JSON.

use harbor_engine::{
    snapshot::{QUEUE_STORAGE_KEY, STATE_STORAGE_KEY},
    PersistedState, QueueCounts, SyncOperation, SyncQueue,
};
use harbor_sync::{DurableStore, FileStore, SyncConfig};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    storage_dir: String,
    counts: QueueCounts,
    operations: Vec<SyncOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<PersistedState>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harbor_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env()?;

    tracing::info!("Inspecting Harbor storage at {}", config.storage_dir.display());

    let store = FileStore::open(&config.storage_dir)?;

    let queue = match store.get(QUEUE_STORAGE_KEY)? {
        Some(json) => SyncQueue::from_json(&json)?,
        None => SyncQueue::new(),
    };

    let state = store
        .get(STATE_STORAGE_KEY)?
        .map(|json| PersistedState::from_json(&json))
        .transpose()?;

    let report = Report {
        storage_dir: config.storage_dir.display().to_string(),
        counts: queue.counts(),
        operations: queue.operations().to_vec(),
        state,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
