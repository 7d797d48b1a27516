use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::record::MealRecord;

pub const MAX_RECORDS: usize = 20;
pub const SHRINK_RECORDS: usize = 10;
pub const QUOTA_FALLBACK_RECORDS: usize = 5;
pub const BYTE_BUDGET: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SlotError {
    /// The medium refused the write for lack of space. Recovered by the
    /// store, never surfaced as a failed save.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The single named storage slot the history lives in. Read and written
/// wholesale; last writer wins.
#[async_trait]
pub trait HistorySlot: Send + Sync {
    async fn read(&self) -> anyhow::Result<Option<String>>;
    async fn write(&self, payload: &str) -> Result<(), SlotError>;
    async fn remove(&self) -> anyhow::Result<()>;
}

/// Production slot: one JSON file on local disk.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl HistorySlot for FileSlot {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }

    async fn write(&self, payload: &str) -> Result<(), SlotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, payload).map_err(|e| match e.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => SlotError::QuotaExceeded,
            _ => SlotError::Io(e),
        })
    }

    async fn remove(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}

/// In-memory slot for tests and ephemeral runs, with an optional byte
/// capacity so quota behavior can be exercised.
#[derive(Default)]
pub struct MemorySlot {
    contents: Mutex<Option<String>>,
    capacity: Option<usize>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contents: Mutex::new(None),
            capacity: Some(capacity),
        }
    }

    /// Seeds the slot with raw contents, bypassing the store's caps and
    /// serialization. Test support only: production code always goes
    /// through [`HistoryStore::save`].
    pub fn put_raw(&self, payload: impl Into<String>) {
        *self.contents.lock().unwrap() = Some(payload.into());
    }
}

#[async_trait]
impl HistorySlot for MemorySlot {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        Ok(self.contents.lock().unwrap().clone())
    }

    async fn write(&self, payload: &str) -> Result<(), SlotError> {
        if let Some(cap) = self.capacity {
            if payload.len() > cap {
                return Err(SlotError::QuotaExceeded);
            }
        }
        *self.contents.lock().unwrap() = Some(payload.to_string());
        Ok(())
    }

    async fn remove(&self) -> anyhow::Result<()> {
        *self.contents.lock().unwrap() = None;
        Ok(())
    }
}

/// How a save landed. `degraded` is set when the quota fallback kicked in
/// and older records were dropped beyond the normal cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub kept: usize,
    pub degraded: bool,
}

/// Append-biased, capacity-bounded record store over an injected slot.
/// Most-recent-first ordering and the 20-record / 4 MiB bounds are
/// maintained on every save.
#[derive(Clone)]
pub struct HistoryStore {
    slot: Arc<dyn HistorySlot>,
}

impl HistoryStore {
    pub fn new(slot: Arc<dyn HistorySlot>) -> Self {
        Self { slot }
    }

    /// Prepends `record`, enforces the caps and persists. A quota refusal
    /// from the medium shrinks the collection to the most recent
    /// `QUOTA_FALLBACK_RECORDS` and reports the degradation instead of
    /// failing the save.
    pub async fn save(&self, record: MealRecord) -> anyhow::Result<SaveOutcome> {
        let mut records = self.load_all().await;
        records.insert(0, record);
        records.truncate(MAX_RECORDS);

        let mut payload = serde_json::to_string(&records).context("serialize history")?;
        if payload.len() > BYTE_BUDGET {
            warn!(
                bytes = payload.len(),
                budget = BYTE_BUDGET,
                "history over byte budget, shrinking to {SHRINK_RECORDS} records"
            );
            records.truncate(SHRINK_RECORDS);
            payload = serde_json::to_string(&records).context("serialize shrunk history")?;
        }

        match self.slot.write(&payload).await {
            Ok(()) => Ok(SaveOutcome {
                kept: records.len(),
                degraded: false,
            }),
            Err(SlotError::QuotaExceeded) => {
                warn!(
                    "storage quota exceeded, keeping only the most recent {QUOTA_FALLBACK_RECORDS} records"
                );
                records.truncate(QUOTA_FALLBACK_RECORDS);
                let payload =
                    serde_json::to_string(&records).context("serialize fallback history")?;
                self.slot
                    .write(&payload)
                    .await
                    .context("persist history after quota fallback")?;
                Ok(SaveOutcome {
                    kept: records.len(),
                    degraded: true,
                })
            }
            Err(e) => Err(e).context("persist history"),
        }
    }

    /// Most-recent-first snapshot of the stored records. Corrupted or
    /// unreadable history is treated as no history.
    pub async fn load_all(&self) -> Vec<MealRecord> {
        let raw = match self.slot.read().await {
            Ok(Some(text)) => text,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "history slot unreadable, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "corrupted history, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        debug!("clearing meal history");
        self.slot.remove().await.context("clear history")
    }
}
