//! Quest persistence seam and its in-memory implementation.

use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use mathhub_core::{CoreError, QuestId, QuestRecord, QuestSummary};

/// Errors raised while loading a seed file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("seed file is not a JSON array of quests: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("seed file is invalid: {0}")]
    Core(#[from] CoreError),
}

/// Storage for quest records.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait QuestStore: Send + Sync {
    /// Published quests ordered by publish time, skipping `offset` rows and
    /// returning at most `limit`.
    async fn list_published(&self, limit: usize, offset: usize) -> Vec<QuestSummary>;

    /// Look a quest up by id, whatever its status.
    async fn get(&self, id: QuestId) -> Option<QuestRecord>;

    /// Store a new quest.
    ///
    /// # Errors
    /// Returns [`CoreError::DuplicateCode`] if a quest with the same code is
    /// already stored.
    async fn insert(&self, record: QuestRecord) -> Result<(), CoreError>;
}

/// Quest store held in process memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    quests: RwLock<IndexMap<QuestId, QuestRecord>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `quests`.
    ///
    /// # Errors
    /// Returns [`CoreError::DuplicateCode`] if two quests share a code.
    pub fn with_quests(quests: impl IntoIterator<Item = QuestRecord>) -> Result<Self, CoreError> {
        let mut map = IndexMap::new();
        for record in quests {
            if map.values().any(|q: &QuestRecord| q.code == record.code) {
                return Err(CoreError::DuplicateCode(record.code));
            }
            map.insert(record.id, record);
        }
        Ok(Self { quests: RwLock::new(map) })
    }

    /// Load a store from a JSON array of quest records.
    ///
    /// # Errors
    /// Returns [`SeedError`] if the file cannot be read or parsed, or holds
    /// duplicate codes.
    pub async fn from_seed_file(path: &Path) -> Result<Self, SeedError> {
        let bytes = tokio::fs::read(path).await?;
        let quests: Vec<QuestRecord> = serde_json::from_slice(&bytes)?;
        let count = quests.len();
        let store = Self::with_quests(quests)?;
        tracing::info!(path = %path.display(), quests = count, "quest store seeded");
        Ok(store)
    }

    /// Number of stored quests, drafts included.
    pub async fn len(&self) -> usize {
        self.quests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.quests.read().await.is_empty()
    }
}

#[async_trait]
impl QuestStore for InMemoryStore {
    async fn list_published(&self, limit: usize, offset: usize) -> Vec<QuestSummary> {
        let quests = self.quests.read().await;
        let mut published: Vec<&QuestRecord> = quests.values().filter(|q| q.is_servable()).collect();
        // Stable, so equal publish times keep insertion order.
        published.sort_by_key(|q| q.publish_time);
        published.into_iter().skip(offset).take(limit).map(QuestRecord::summary).collect()
    }

    async fn get(&self, id: QuestId) -> Option<QuestRecord> {
        self.quests.read().await.get(&id).cloned()
    }

    async fn insert(&self, record: QuestRecord) -> Result<(), CoreError> {
        let mut quests = self.quests.write().await;
        if quests.values().any(|q| q.code == record.code) {
            return Err(CoreError::DuplicateCode(record.code));
        }
        tracing::info!(quest = %record.id, code = %record.code, publisher = %record.publisher_id, "quest stored");
        quests.insert(record.id, record);
        Ok(())
    }
}
