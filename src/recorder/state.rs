use chrono::{DateTime, Utc};

use crate::error::RecorderError;
use crate::models::{Event, Session, SessionKind};

/// At most one session records at a time.
#[derive(Debug, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording(Session),
}

impl RecorderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Session> {
        match self {
            RecorderState::Idle => None,
            RecorderState::Recording(session) => Some(session),
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active().map(|session| session.id.as_str())
    }

    pub fn ensure_idle(&self) -> Result<(), RecorderError> {
        match self.active_id() {
            Some(active) => Err(RecorderError::SessionConflict {
                active: active.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn begin(&mut self, session: Session) -> Result<(), RecorderError> {
        self.ensure_idle()?;
        *self = RecorderState::Recording(session);
        Ok(())
    }

    /// Hands out the active session if its id matches, leaving the state idle.
    pub fn take_active(&mut self, id: &str) -> Result<Session, RecorderError> {
        if self.active_id() != Some(id) {
            return Err(RecorderError::NoActiveSession);
        }
        match std::mem::take(self) {
            RecorderState::Recording(session) => Ok(session),
            RecorderState::Idle => Err(RecorderError::NoActiveSession),
        }
    }

    /// Appends a hand-written step to the active manual session; returns the step count.
    pub fn annotate(
        &mut self,
        description: &str,
        context: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, RecorderError> {
        let RecorderState::Recording(session) = self else {
            return Err(RecorderError::NoActiveSession);
        };
        if session.kind != SessionKind::Manual {
            return Err(RecorderError::WrongSessionKind {
                id: session.id.clone(),
            });
        }

        let description = description.trim();
        if description.is_empty() {
            return Err(RecorderError::InvalidAction(
                "description must not be empty".into(),
            ));
        }

        session.append(Event::Annotation {
            timestamp,
            description: description.to_string(),
            context,
        });
        Ok(session.raw_events.len())
    }
}
