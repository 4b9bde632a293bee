use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::bridge::{Actuator, MouseButton};
use crate::error::RecorderError;
use crate::models::{Event, SessionRecord};
use crate::store::SessionStore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// A replay step whose actuation failed.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    /// 1-based position in the replayed sequence
    pub index: usize,
    pub description: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub session_id: String,
    pub total: usize,
    pub performed: usize,
    pub logged_only: usize,
    pub skipped: usize,
    pub failures: Vec<StepFailure>,
    pub cancelled: bool,
}

impl ReplayReport {
    /// A replay that ran to the end counts as successful even if single steps failed.
    pub fn succeeded(&self) -> bool {
        !self.cancelled
    }
}

enum StepOutcome {
    Performed,
    LoggedOnly,
    Skipped,
}

/// Wait before the next event: the recorded gap scaled by `speed`, never below `floor`.
pub fn step_delay(
    current: DateTime<Utc>,
    next: DateTime<Utc>,
    speed: f64,
    floor: Duration,
) -> Duration {
    let gap_ms = (next - current).num_milliseconds();
    if gap_ms <= 0 {
        return floor;
    }
    let scaled = Duration::from_millis((gap_ms as f64 / speed).round() as u64);
    scaled.max(floor)
}

pub struct Replayer {
    actuator: Arc<dyn Actuator>,
    store: Arc<dyn SessionStore>,
    min_step_delay: Duration,
}

impl Replayer {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        store: Arc<dyn SessionStore>,
        min_step_delay: Duration,
    ) -> Self {
        Self {
            actuator,
            store,
            min_step_delay,
        }
    }

    pub async fn replay(
        &self,
        id: &str,
        speed: f64,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, RecorderError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(RecorderError::InvalidSpeed(speed));
        }

        let record = self.store.get(id).await?;
        Ok(self.play(&record, speed, cancel).await)
    }

    pub async fn play(
        &self,
        record: &SessionRecord,
        speed: f64,
        cancel: &CancellationToken,
    ) -> ReplayReport {
        let events = &record.filtered_events;
        let mut report = ReplayReport {
            session_id: record.id.clone(),
            total: events.len(),
            ..ReplayReport::default()
        };

        log_info!(
            "Replaying session {} ({} actions, speed {speed})",
            record.id,
            events.len()
        );

        for (i, event) in events.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            log_info!("Replaying action {}/{}: {}", i + 1, events.len(), event.description());
            match self.perform(event).await {
                Ok(StepOutcome::Performed) => report.performed += 1,
                Ok(StepOutcome::LoggedOnly) => report.logged_only += 1,
                Ok(StepOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    log_error!("Action {} failed: {err:#}", i + 1);
                    report.failures.push(StepFailure {
                        index: i + 1,
                        description: event.description().to_string(),
                        reason: format!("{err:#}"),
                    });
                }
            }

            if let Some(next) = events.get(i + 1) {
                let delay = step_delay(event.timestamp(), next.timestamp(), speed, self.min_step_delay);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        if report.cancelled {
            log_warn!("Replay of {} cancelled", record.id);
        } else {
            log_info!("Replay of {} finished", record.id);
        }
        report
    }

    async fn perform(&self, event: &Event) -> Result<StepOutcome> {
        match event {
            Event::MouseClick { position, .. } => {
                self.actuator.click(*position, MouseButton::Left).await?;
                Ok(StepOutcome::Performed)
            }
            Event::KeyboardInput { content, .. } => {
                type_lines(self.actuator.as_ref(), content).await?;
                Ok(StepOutcome::Performed)
            }
            Event::WindowChange { description, .. } => {
                log_info!("Window change (not replayed): {description}");
                Ok(StepOutcome::LoggedOnly)
            }
            Event::Annotation { description, .. } => {
                log_info!("Manual step (not replayed): {description}");
                Ok(StepOutcome::LoggedOnly)
            }
            Event::Screenshot { .. } => Ok(StepOutcome::Skipped),
        }
    }
}

/// Long lines are typed in pieces of at most this many characters.
const TYPE_CHUNK_CHARS: usize = 50;

/// Types `content` line by line; newlines become Return key presses.
pub async fn type_lines(actuator: &dyn Actuator, content: &str) -> Result<()> {
    for (i, line) in content.split('\n').enumerate() {
        if i > 0 {
            actuator.press_key("Return").await?;
        }
        let chars: Vec<char> = line.trim_end_matches('\r').chars().collect();
        for chunk in chars.chunks(TYPE_CHUNK_CHARS) {
            let piece: String = chunk.iter().collect();
            actuator.type_text(&piece).await?;
        }
    }
    Ok(())
}
