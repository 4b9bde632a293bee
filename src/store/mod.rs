//! Persistence of stopped sessions.
//!
//! Two interchangeable backends implement [`SessionStore`]: a directory of JSON files and
//! the SQLite database in [`crate::db`].

pub mod json_dir;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::db::Database;
use crate::error::RecorderError;
use crate::models::{RecordingMeta, SessionRecord};
use crate::settings::StorageBackend;

pub use json_dir::JsonDirStore;

pub const RECORDINGS_DIR: &str = "recordings";
pub const DATABASE_FILE: &str = "deskreplay.sqlite3";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("recording not found: {0}")]
    NotFound(String),

    #[error("recording {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for RecorderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) | StoreError::Corrupt { id, .. } => {
                RecorderError::RecordNotFound(id)
            }
            StoreError::Backend(err) => RecorderError::store(format!("{err:#}")),
        }
    }
}

/// Create/read/list storage for stopped sessions, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writing the same record twice leaves a single copy.
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<SessionRecord, StoreError>;

    /// Unreadable records are skipped; an empty store lists nothing.
    async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError>;
}

/// Ids become file names and keys, so only `[A-Za-z0-9_-]` is accepted.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn open_store(backend: StorageBackend, data_dir: &Path) -> Result<Arc<dyn SessionStore>> {
    match backend {
        StorageBackend::Json => Ok(Arc::new(JsonDirStore::new(data_dir.join(RECORDINGS_DIR)))),
        StorageBackend::Sqlite => Ok(Arc::new(Database::open(data_dir.join(DATABASE_FILE))?)),
    }
}
