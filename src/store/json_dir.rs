use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;

use crate::models::{RecordingMeta, SessionRecord};

use super::{is_valid_id, SessionStore, StoreError};

/// One pretty-printed `<id>.json` file per recording.
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn parse_record(id: &str, contents: &str) -> Result<SessionRecord, StoreError> {
    let record: SessionRecord =
        serde_json::from_str(contents).map_err(|err| StoreError::Corrupt {
            id: id.to_string(),
            reason: err.to_string(),
        })?;
    if record.id != id {
        return Err(StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("file holds recording {}", record.id),
        });
    }
    Ok(record)
}

#[async_trait]
impl SessionStore for JsonDirStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        if !is_valid_id(&record.id) {
            return Err(anyhow!("invalid recording id '{}'", record.id).into());
        }

        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let serialized =
            serde_json::to_string_pretty(record).context("failed to serialize recording")?;
        let path = self.record_path(&record.id);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", record.id));

        fs::write(&tmp_path, serialized)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("failed to move recording into {}", path.display()))?;

        debug!("Saved recording {} to {}", record.id, path.display());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<SessionRecord, StoreError> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let path = self.record_path(id);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read {}", path.display()))
                    .into())
            }
        };

        parse_record(id, &contents)
    }

    async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to list {}", self.dir.display()))
                    .into())
            }
        };

        let mut recordings = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to read recordings directory entry")?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_valid_id(id) {
                continue;
            }

            let contents = match fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) => {
                    warn!("Skipping unreadable recording {}: {err}", path.display());
                    continue;
                }
            };
            match parse_record(id, &contents) {
                Ok(record) => recordings.push(record.meta()),
                Err(err) => warn!("Skipping recording: {err}"),
            }
        }

        recordings.sort_by(|a, b| {
            a.created_marker
                .cmp(&b.created_marker)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(recordings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionKind;
    use crate::store::fixtures;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonDirStore {
        JsonDirStore::new(dir.path().join("recordings"))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = fixtures::record("intelligent_session_1771065000000");

        store.put(&record).await.unwrap();
        let loaded = store.get(&record.id).await.unwrap();

        assert_eq!(loaded.filtered_events, record.filtered_events);
        assert_eq!(loaded.summary_lines, record.summary_lines);
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn repeated_put_keeps_one_copy() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = fixtures::record("session_1");

        store.put(&record).await.unwrap();
        store.put(&record).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
        let leftovers = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(matches!(
            store.get("session_404").await,
            Err(StoreError::NotFound(id)) if id == "session_404"
        ));
        assert!(matches!(
            store.get("../secrets").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unsafe_ids_are_rejected_on_put() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = fixtures::record("../escape");

        assert!(matches!(store.put(&record).await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.put(&fixtures::record("session_1000")).await.unwrap();
        store
            .put(&fixtures::record("intelligent_session_2000"))
            .await
            .unwrap();
        std::fs::write(store.dir().join("session_3000.json"), "{ not json").unwrap();
        std::fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().await.unwrap();

        let ids: Vec<&str> = listed.iter().map(|meta| meta.id.as_str()).collect();
        assert_eq!(ids, vec!["session_1000", "intelligent_session_2000"]);
        assert_eq!(listed[1].created_marker, "2000");
        assert_eq!(listed[1].action_count, 3);
        assert_eq!(listed[1].kind, SessionKind::Intelligent);

        assert!(matches!(
            store.get("session_3000").await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
