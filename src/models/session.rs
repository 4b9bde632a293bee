//! Session-related data models.
//!
//! A `Session` is the in-memory recording; once stopped it is frozen into a `SessionRecord`,
//! which is what the stores persist and the replayer reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::Event;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Manual,
    Intelligent,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Manual => "manual",
            SessionKind::Intelligent => "intelligent",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            SessionKind::Manual => "session",
            SessionKind::Intelligent => "intelligent_session",
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "manual" => Ok(SessionKind::Manual),
            "intelligent" => Ok(SessionKind::Intelligent),
            other => Err(anyhow::anyhow!("unknown session kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Recording,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Recording => "Recording",
            SessionStatus::Stopped => "Stopped",
        }
    }
}

/// Result of the filter/summarize pass over a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub total_events: usize,
    pub relevant_actions: usize,
    pub summary_lines: Vec<String>,
    pub filtered_events: Vec<Event>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub raw_events: Vec<Event>,
    pub filtered_events: Vec<Event>,
    pub summary_lines: Vec<String>,
}

/// `<prefix>_<unix-millis>`, e.g. `intelligent_session_1700000000000`.
pub fn session_id(kind: SessionKind, millis: i64) -> String {
    format!("{}_{millis}", kind.id_prefix())
}

impl Session {
    pub fn begin(kind: SessionKind, started_at: DateTime<Utc>) -> Self {
        Self::with_id(session_id(kind, started_at.timestamp_millis()), kind, started_at)
    }

    pub fn with_id(id: String, kind: SessionKind, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            status: SessionStatus::Recording,
            started_at,
            stopped_at: None,
            raw_events: Vec::new(),
            filtered_events: Vec::new(),
            summary_lines: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status == SessionStatus::Recording
    }

    /// Appends are ignored once the session has stopped.
    pub fn append(&mut self, event: Event) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.raw_events.push(event);
        true
    }

    /// Freezes the session and returns the record to persist.
    pub fn finish(&mut self, analysis: Analysis, stopped_at: DateTime<Utc>) -> SessionRecord {
        self.status = SessionStatus::Stopped;
        self.stopped_at = Some(stopped_at);
        self.filtered_events = analysis.filtered_events;
        self.summary_lines = analysis.summary_lines;

        SessionRecord {
            id: self.id.clone(),
            kind: self.kind,
            total_events_observed: analysis.total_events,
            relevant_action_count: analysis.relevant_actions,
            summary_lines: self.summary_lines.clone(),
            duration_secs: duration_secs(&self.filtered_events),
            started_at: self.started_at,
            stopped_at,
            filtered_events: self.filtered_events.clone(),
        }
    }
}

/// Rounded seconds between the first and last event.
pub fn duration_secs(events: &[Event]) -> i64 {
    match (events.first(), events.last()) {
        (Some(first), Some(last)) if events.len() >= 2 => {
            let millis = (last.timestamp() - first.timestamp()).num_milliseconds();
            (millis as f64 / 1000.0).round() as i64
        }
        _ => 0,
    }
}

/// A stopped session as persisted and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub kind: SessionKind,
    pub total_events_observed: usize,
    pub relevant_action_count: usize,
    pub summary_lines: Vec<String>,
    #[serde(default)]
    pub duration_secs: i64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub filtered_events: Vec<Event>,
}

impl SessionRecord {
    pub fn meta(&self) -> RecordingMeta {
        RecordingMeta {
            id: self.id.clone(),
            kind: self.kind,
            action_count: self.relevant_action_count,
            created_marker: created_marker(&self.id),
        }
    }
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMeta {
    pub id: String,
    pub kind: SessionKind,
    pub action_count: usize,
    pub created_marker: String,
}

pub fn created_marker(session_id: &str) -> String {
    session_id
        .rsplit('_')
        .next()
        .unwrap_or(session_id)
        .to_string()
}
