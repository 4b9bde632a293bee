use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_kind, to_i64, to_usize},
    Database,
};
use crate::models::{Event, RecordingMeta, SessionRecord};
use crate::store::{SessionStore, StoreError};

/// Column values of one recording, before they are validated.
struct RecordingRow {
    id: String,
    kind: String,
    total_events_observed: i64,
    relevant_action_count: i64,
    summary_lines: String,
    duration_secs: i64,
    started_at: String,
    stopped_at: String,
    payloads: Vec<String>,
}

fn row_to_recording(row: &Row) -> rusqlite::Result<RecordingRow> {
    Ok(RecordingRow {
        id: row.get("id")?,
        kind: row.get("kind")?,
        total_events_observed: row.get("total_events_observed")?,
        relevant_action_count: row.get("relevant_action_count")?,
        summary_lines: row.get("summary_lines")?,
        duration_secs: row.get("duration_secs")?,
        started_at: row.get("started_at")?,
        stopped_at: row.get("stopped_at")?,
        payloads: Vec::new(),
    })
}

const SELECT_RECORDING: &str =
    "SELECT id, kind, total_events_observed, relevant_action_count, summary_lines, duration_secs, started_at, stopped_at
     FROM recordings";

fn load_payloads(conn: &Connection, recording: &mut RecordingRow) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT payload FROM recording_events
         WHERE recording_id = ?1
         ORDER BY position ASC",
    )?;
    recording.payloads = stmt
        .query_map(params![recording.id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

impl RecordingRow {
    fn into_record(self) -> Result<SessionRecord> {
        let filtered_events = self
            .payloads
            .iter()
            .enumerate()
            .map(|(position, payload)| {
                serde_json::from_str::<Event>(payload)
                    .with_context(|| format!("failed to decode event {position}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SessionRecord {
            kind: parse_kind(&self.kind)?,
            total_events_observed: to_usize(self.total_events_observed, "total_events_observed")?,
            relevant_action_count: to_usize(self.relevant_action_count, "relevant_action_count")?,
            summary_lines: serde_json::from_str(&self.summary_lines)
                .context("failed to decode summary_lines")?,
            duration_secs: self.duration_secs,
            started_at: parse_datetime(&self.started_at, "started_at")?,
            stopped_at: parse_datetime(&self.stopped_at, "stopped_at")?,
            filtered_events,
            id: self.id,
        })
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let record = record.clone();
        let summary_lines =
            serde_json::to_string(&record.summary_lines).context("failed to encode summary")?;
        let payloads = record
            .filtered_events
            .iter()
            .map(serde_json::to_string)
            .collect::<serde_json::Result<Vec<_>>>()
            .context("failed to encode events")?;

        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM recording_events WHERE recording_id = ?1",
                params![record.id],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO recordings (id, kind, total_events_observed, relevant_action_count, summary_lines, duration_secs, started_at, stopped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.kind.as_str(),
                    to_i64(record.total_events_observed)?,
                    to_i64(record.relevant_action_count)?,
                    summary_lines,
                    record.duration_secs,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert recording {}", record.id))?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO recording_events (recording_id, position, event_type, timestamp, description, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (position, (event, payload)) in
                    record.filtered_events.iter().zip(&payloads).enumerate()
                {
                    stmt.execute(params![
                        record.id,
                        to_i64(position)?,
                        event.type_tag(),
                        event.timestamp().to_rfc3339(),
                        event.description(),
                        payload,
                    ])?;
                }
            }

            tx.commit().context("failed to commit recording")?;
            debug!("Saved recording {} to SQLite", record.id);
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<SessionRecord, StoreError> {
        let lookup_id = id.to_string();
        let row = self
            .execute(move |conn| {
                let recording = conn
                    .query_row(
                        &format!("{SELECT_RECORDING} WHERE id = ?1"),
                        params![lookup_id],
                        row_to_recording,
                    )
                    .optional()?;

                let Some(mut recording) = recording else {
                    return Ok(None);
                };
                load_payloads(conn, &mut recording)?;
                Ok(Some(recording))
            })
            .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        row.into_record().map_err(|err| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("{err:#}"),
        })
    }

    /// Decodes every recording in full; one that would fail `get` is left out.
    async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError> {
        let rows = self
            .execute(|conn| {
                let mut stmt =
                    conn.prepare(&format!("{SELECT_RECORDING} ORDER BY started_at ASC, id ASC"))?;
                let mut rows = stmt
                    .query_map([], row_to_recording)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for recording in &mut rows {
                    load_payloads(conn, recording)?;
                }
                Ok(rows)
            })
            .await?;

        let mut recordings = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_record() {
                Ok(record) => recordings.push(record.meta()),
                Err(err) => warn!("Skipping recording {id}: {err:#}"),
            }
        }
        Ok(recordings)
    }
}
