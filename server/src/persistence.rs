//! Settings and stats documents.
//!
//! Both documents are read once at startup and rewritten in full whenever
//! they change. Reading never fails from the caller's point of view: a
//! missing document is created from defaults, a malformed one is replaced by
//! defaults. Writes go through a background task so a slow disk never holds
//! up the tick.

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{Settings, Stats};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

pub const SETTINGS_KEY: &str = "settings";
pub const STATS_KEY: &str = "stats";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Opaque key/value document store.
pub trait DocumentStore: Send + Sync {
    /// Returns Ok(None) when the document does not exist.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per document inside a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl DocumentStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        // Write-then-rename so a crash never leaves a truncated document
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store, for tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let documents = self.documents.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(documents.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().map_err(|_| StoreError::Poisoned)?;
        documents.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

pub fn save_document<T: Serialize>(
    store: &dyn DocumentStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(value)?;
    store.write(key, &contents)
}

fn load_or_default<T>(store: &dyn DocumentStore, key: &str) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    match store.read(key) {
        Ok(Some(contents)) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Ignoring malformed {} document: {}", key, e);
            T::default()
        }),
        Ok(None) => {
            let value = T::default();
            if let Err(e) = save_document(store, key, &value) {
                warn!("Could not create {} document: {}", key, e);
            }
            value
        }
        Err(e) => {
            warn!("Could not read {} document: {}", key, e);
            T::default()
        }
    }
}

pub fn load_settings(store: &dyn DocumentStore) -> Settings {
    load_or_default(store, SETTINGS_KEY)
}

pub fn load_stats(store: &dyn DocumentStore) -> Stats {
    load_or_default(store, STATS_KEY)
}

/// A full document to write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PersistJob {
    Settings(Settings),
    Stats(Stats),
}

/// Spawns the writer task and returns its queue.
///
/// Jobs are written one at a time in arrival order, so the last document
/// queued is the one left on disk. Failures are logged and dropped.
pub fn spawn_writer(store: Arc<dyn DocumentStore>) -> mpsc::UnboundedSender<PersistJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let store = Arc::clone(&store);
            let result = tokio::task::spawn_blocking(move || match job {
                PersistJob::Settings(settings) => {
                    save_document(store.as_ref(), SETTINGS_KEY, &settings)
                }
                PersistJob::Stats(stats) => save_document(store.as_ref(), STATS_KEY, &stats),
            })
            .await;

            match result {
                Ok(Ok(())) => debug!("Persisted {:?}", job),
                Ok(Err(e)) => error!("Failed to persist {:?}: {}", job, e),
                Err(e) => error!("Persistence task failed: {}", e),
            }
        }
    });

    tx
}
