use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::analysis::analyze_session;
use crate::bridge::{Actuator, MouseButton, ScreenSize, StateProbe};
use crate::error::RecorderError;
use crate::models::{
    session_id, Point, RecordingMeta, Session, SessionKind, SessionRecord, WindowInfo,
};
use crate::replay::{type_lines, ReplayReport, Replayer};
use crate::sensing::SensingController;
use crate::settings::Settings;
use crate::store::{SessionStore, StoreError};

use super::state::RecorderState;

/// How many following milliseconds are tried when a session id is already stored.
const MAX_ID_ATTEMPTS: i64 = 1000;

/// What the desktop reports right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub screen: ScreenSize,
    pub pointer: Option<Point>,
    pub active_window: Option<WindowInfo>,
}

/// The recorder's operations: start, annotate, stop, replay and list, plus direct desktop
/// actions outside any session.
#[derive(Clone)]
pub struct RecorderController {
    state: Arc<Mutex<RecorderState>>,
    sensing: Arc<Mutex<SensingController>>,
    probe: Arc<dyn StateProbe>,
    actuator: Arc<dyn Actuator>,
    store: Arc<dyn SessionStore>,
    replayer: Arc<Replayer>,
    settings: Settings,
}

impl RecorderController {
    pub fn new(
        probe: Arc<dyn StateProbe>,
        actuator: Arc<dyn Actuator>,
        store: Arc<dyn SessionStore>,
        settings: Settings,
    ) -> Self {
        let replayer = Replayer::new(
            actuator.clone(),
            store.clone(),
            settings.replay.min_step_delay(),
        );
        Self {
            state: Arc::new(Mutex::new(RecorderState::new())),
            sensing: Arc::new(Mutex::new(SensingController::new())),
            probe,
            actuator,
            store,
            replayer: Arc::new(replayer),
            settings,
        }
    }

    pub async fn active_session(&self) -> Option<(String, SessionKind)> {
        let state = self.state.lock().await;
        state
            .active()
            .map(|session| (session.id.clone(), session.kind))
    }

    pub async fn start_recording(&self, kind: SessionKind) -> Result<String, RecorderError> {
        let mut state = self.state.lock().await;
        state.ensure_idle()?;

        let started_at = Utc::now();
        let id = self.allocate_id(kind, started_at).await;
        let session = Session::with_id(id, kind, started_at);
        let session_id = session.id.clone();

        if kind == SessionKind::Intelligent {
            let screen = self.screen_size().await;
            self.sensing
                .lock()
                .await
                .start_sensing(
                    session_id.clone(),
                    self.probe.clone(),
                    self.settings.sampling.clone(),
                    screen,
                )
                .map_err(|err| RecorderError::SessionConflict {
                    active: format!("{err:#}"),
                })?;
        }

        state.begin(session)?;
        info!("Started {} recording {session_id}", kind.as_str());
        Ok(session_id)
    }

    pub async fn record_manual_action(
        &self,
        description: &str,
        context: serde_json::Value,
    ) -> Result<usize, RecorderError> {
        let mut state = self.state.lock().await;
        let count = state.annotate(description, context, Utc::now())?;
        info!("Recorded manual action {count}: {}", description.trim());
        Ok(count)
    }

    /// Stops the session, filters its events and persists the result.
    ///
    /// A failed save still returns the complete record inside the error.
    pub async fn stop(&self, id: &str) -> Result<SessionRecord, RecorderError> {
        let mut state = self.state.lock().await;
        let mut session = state.take_active(id)?;

        if session.kind == SessionKind::Intelligent {
            match self.sensing.lock().await.stop_sensing().await {
                Ok(log) => {
                    for event in log.into_events() {
                        session.append(event);
                    }
                }
                Err(err) => error!("Sampling for {id} ended abnormally: {err:#}"),
            }
        }

        let analysis = analyze_session(session.kind, &session.raw_events);
        let record = session.finish(analysis, Utc::now());
        info!(
            "Stopped recording {}: {} of {} events kept",
            record.id, record.relevant_action_count, record.total_events_observed
        );

        if let Err(err) = self.store.put(&record).await {
            error!("Failed to save recording {}: {err}", record.id);
            return Err(RecorderError::StoreFailure {
                reason: err.to_string(),
                unsaved: Some(Box::new(record)),
            });
        }

        Ok(record)
    }

    pub async fn replay(
        &self,
        id: &str,
        speed: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, RecorderError> {
        let speed = speed.unwrap_or(self.settings.replay.default_speed);
        self.replayer.replay(id, speed, cancel).await
    }

    pub async fn list(&self) -> Result<Vec<RecordingMeta>, RecorderError> {
        Ok(self.store.list().await?)
    }

    /// Ids embed the start millisecond; a stored one moves the id to the next free millisecond.
    async fn allocate_id(&self, kind: SessionKind, started_at: DateTime<Utc>) -> String {
        let first = started_at.timestamp_millis();
        for millis in first..first + MAX_ID_ATTEMPTS {
            let candidate = session_id(kind, millis);
            match self.store.get(&candidate).await {
                Err(StoreError::NotFound(_)) => return candidate,
                Ok(_) | Err(StoreError::Corrupt { .. }) => {
                    debug!("Session id {candidate} is taken");
                }
                Err(err) => {
                    warn!("Could not check whether {candidate} is taken: {err}");
                    return candidate;
                }
            }
        }
        warn!("No free session id near {first}; a stored recording may be replaced");
        session_id(kind, first)
    }

    pub async fn click_at(&self, position: Point, button: MouseButton) -> Result<(), RecorderError> {
        info!("Clicking {} at ({}, {})", button.as_str(), position.x, position.y);
        self.actuator
            .click(position, button)
            .await
            .map_err(|err| RecorderError::ActuationFailure {
                action: "click",
                reason: format!("{err:#}"),
            })
    }

    /// Types `text` the way replay does: Return between lines, long lines in pieces.
    pub async fn type_text(&self, text: &str) -> Result<(), RecorderError> {
        if text.is_empty() {
            return Err(RecorderError::InvalidAction("nothing to type".into()));
        }
        type_lines(self.actuator.as_ref(), text)
            .await
            .map_err(|err| RecorderError::ActuationFailure {
                action: "typing",
                reason: format!("{err:#}"),
            })
    }

    pub async fn press_key(&self, key: &str) -> Result<(), RecorderError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(RecorderError::InvalidAction("key name is empty".into()));
        }
        self.actuator
            .press_key(key)
            .await
            .map_err(|err| RecorderError::ActuationFailure {
                action: "key press",
                reason: format!("{err:#}"),
            })
    }

    /// Returns the reference (path) of the saved image.
    pub async fn take_screenshot(&self) -> Result<String, RecorderError> {
        let limit = self.settings.sampling.probe_timeout();
        match tokio::time::timeout(limit, self.probe.capture_screen()).await {
            Ok(Ok(image_ref)) => Ok(image_ref),
            Ok(Err(err)) => Err(RecorderError::ActuationFailure {
                action: "screenshot",
                reason: format!("{err:#}"),
            }),
            Err(_) => Err(RecorderError::ActuationFailure {
                action: "screenshot",
                reason: format!("no answer within {limit:?}"),
            }),
        }
    }

    /// Pointer and window are `None` when the desktop does not answer in time.
    pub async fn screen_info(&self) -> ScreenInfo {
        let limit = self.settings.sampling.probe_timeout();
        let screen = self.screen_size().await;
        let pointer = match tokio::time::timeout(limit, self.probe.pointer_position()).await {
            Ok(Ok(point)) => Some(point),
            Ok(Err(err)) => {
                warn!("Pointer position unavailable: {err:#}");
                None
            }
            Err(_) => {
                warn!("Pointer position query timed out");
                None
            }
        };
        let active_window = match tokio::time::timeout(limit, self.probe.active_window()).await {
            Ok(Ok(window)) => Some(window),
            Ok(Err(err)) => {
                warn!("Active window unavailable: {err:#}");
                None
            }
            Err(_) => {
                warn!("Active window query timed out");
                None
            }
        };

        ScreenInfo {
            screen,
            pointer,
            active_window,
        }
    }

    async fn screen_size(&self) -> ScreenSize {
        let limit = self.settings.sampling.probe_timeout();
        match tokio::time::timeout(limit, self.probe.screen_size()).await {
            Ok(Ok(screen)) if screen.width > 0 && screen.height > 0 => {
                debug!("Screen size {}x{}", screen.width, screen.height);
                screen
            }
            Ok(Ok(screen)) => {
                warn!(
                    "Ignoring reported screen size {}x{}",
                    screen.width, screen.height
                );
                self.settings.screen
            }
            Ok(Err(err)) => {
                debug!("Screen size unavailable ({err:#}); using configured size");
                self.settings.screen
            }
            Err(_) => {
                warn!("Screen size query timed out; using configured size");
                self.settings.screen
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ANALYSIS_FAILED;
    use crate::bridge::testing::{Actuation, RecordingActuator, ScriptedProbe};
    use crate::bridge::MouseButton;
    use crate::bridge::testing::Step;
    use crate::models::{Event, EventKind};
    use crate::store::fixtures::record;
    use crate::store::JsonDirStore;
    use chrono::TimeZone;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::time::Duration;

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn put(&self, _: &SessionRecord) -> Result<(), StoreError> {
            Err(anyhow::anyhow!("disk full").into())
        }

        async fn get(&self, id: &str) -> Result<SessionRecord, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }

        async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        _dir: TempDir,
        controller: RecorderController,
        actuator: Arc<RecordingActuator>,
    }

    fn harness(probe: ScriptedProbe) -> Harness {
        let dir = TempDir::new().unwrap();
        let actuator = Arc::new(RecordingActuator::new());
        let store = Arc::new(JsonDirStore::new(dir.path().join("recordings")));
        let controller =
            RecorderController::new(Arc::new(probe), actuator.clone(), store, Settings::default());
        Harness {
            _dir: dir,
            controller,
            actuator,
        }
    }

    #[tokio::test]
    async fn second_start_conflicts() {
        let h = harness(ScriptedProbe::new());
        let id = h.controller.start_recording(SessionKind::Manual).await.unwrap();

        let err = h
            .controller
            .start_recording(SessionKind::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::SessionConflict { active } if active == id));
    }

    #[tokio::test]
    async fn stop_without_matching_session_is_rejected() {
        let h = harness(ScriptedProbe::new());
        assert!(matches!(
            h.controller.stop("session_1").await,
            Err(RecorderError::NoActiveSession)
        ));

        let id = h.controller.start_recording(SessionKind::Manual).await.unwrap();
        assert!(matches!(
            h.controller.stop("session_other").await,
            Err(RecorderError::NoActiveSession)
        ));
        assert_eq!(h.controller.active_session().await.map(|(active, _)| active), Some(id));
    }

    #[tokio::test]
    async fn manual_session_round_trip() {
        let h = harness(ScriptedProbe::new());
        let id = h.controller.start_recording(SessionKind::Manual).await.unwrap();
        assert!(id.starts_with("session_"));

        h.controller
            .record_manual_action("open the quarterly report", json!({"app": "Files"}))
            .await
            .unwrap();
        h.controller
            .record_manual_action("export as PDF", json!(null))
            .await
            .unwrap();
        assert!(matches!(
            h.controller.record_manual_action("", json!(null)).await,
            Err(RecorderError::InvalidAction(_))
        ));

        let record = h.controller.stop(&id).await.unwrap();
        assert_eq!(record.kind, SessionKind::Manual);
        assert_eq!(record.total_events_observed, 2);
        assert_eq!(
            record.summary_lines,
            vec![
                "1. open the quarterly report".to_string(),
                "2. export as PDF".to_string(),
            ]
        );
        assert!(h.controller.active_session().await.is_none());

        let listed = h.controller.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].action_count, 2);
    }

    #[tokio::test]
    async fn manual_actions_rejected_while_sampling() {
        let h = harness(ScriptedProbe::new());
        let id = h
            .controller
            .start_recording(SessionKind::Intelligent)
            .await
            .unwrap();
        assert!(id.starts_with("intelligent_session_"));

        assert!(matches!(
            h.controller.record_manual_action("x", json!(null)).await,
            Err(RecorderError::WrongSessionKind { .. })
        ));
        h.controller.stop(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn intelligent_session_records_and_replays() {
        let probe = ScriptedProbe::new();
        probe.push_position(400, 300);
        probe.push_window("Notes");
        let h = harness(probe);

        let id = h
            .controller
            .start_recording(SessionKind::Intelligent)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let record = h.controller.stop(&id).await.unwrap();

        let kinds: Vec<EventKind> = record.filtered_events.iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::WindowChange, EventKind::MouseClick]);
        assert_eq!(
            record.summary_lines,
            vec![
                "1. switched to window: Notes".to_string(),
                "2. clicked in Notes at (400, 300)".to_string(),
            ]
        );

        let report = h
            .controller
            .replay(&id, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(report.logged_only, 1);
        assert_eq!(
            h.actuator.actions(),
            vec![Actuation::Click(Point::new(400, 300), MouseButton::Left)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reported_screen_size_drives_zones() {
        let mut probe = ScriptedProbe::new();
        probe.screen = Some(ScreenSize {
            width: 800,
            height: 600,
        });
        probe.push_position(400, 560);
        probe.push_window("Notes");
        let h = harness(probe);

        let id = h
            .controller
            .start_recording(SessionKind::Intelligent)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let record = h.controller.stop(&id).await.unwrap();

        assert_eq!(record.filtered_events[1].description(), "clicked the taskbar");
    }

    #[tokio::test]
    async fn save_failure_returns_the_unsaved_record() {
        let controller = RecorderController::new(
            Arc::new(ScriptedProbe::new()),
            Arc::new(RecordingActuator::new()),
            Arc::new(BrokenStore),
            Settings::default(),
        );
        let id = controller.start_recording(SessionKind::Manual).await.unwrap();
        controller
            .record_manual_action("step one", json!(null))
            .await
            .unwrap();

        match controller.stop(&id).await {
            Err(RecorderError::StoreFailure {
                unsaved: Some(record),
                ..
            }) => {
                assert_eq!(record.id, id);
                assert_eq!(record.summary_lines, vec!["1. step one".to_string()]);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(controller.active_session().await.is_none());
    }

    #[tokio::test]
    async fn empty_session_stops_cleanly() {
        let h = harness(ScriptedProbe::new());
        let id = h.controller.start_recording(SessionKind::Manual).await.unwrap();
        let record = h.controller.stop(&id).await.unwrap();

        assert_eq!(record.total_events_observed, 0);
        assert!(record.summary_lines.is_empty());
        assert_ne!(record.summary_lines, vec![ANALYSIS_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn replay_of_unknown_id_is_reported() {
        let h = harness(ScriptedProbe::new());
        assert!(matches!(
            h.controller
                .replay("session_404", None, &CancellationToken::new())
                .await,
            Err(RecorderError::RecordNotFound(_))
        ));
        assert!(h.controller.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_session_keeps_repeated_steps() {
        let h = harness(ScriptedProbe::new());
        let id = h.controller.start_recording(SessionKind::Manual).await.unwrap();
        for step in ["click Next", "click Next", "click Finish"] {
            h.controller
                .record_manual_action(step, json!(null))
                .await
                .unwrap();
        }

        let record = h.controller.stop(&id).await.unwrap();
        assert_eq!(record.relevant_action_count, 3);
        assert_eq!(
            record.summary_lines,
            vec![
                "1. click Next".to_string(),
                "2. click Next".to_string(),
                "3. click Finish".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn taken_ids_move_to_the_next_free_millisecond() {
        let h = harness(ScriptedProbe::new());
        let store = h.controller.store.clone();
        store.put(&record("session_5000")).await.unwrap();
        store.put(&record("session_5001")).await.unwrap();

        let started = Utc.timestamp_millis_opt(5000).unwrap();
        assert_eq!(
            h.controller.allocate_id(SessionKind::Manual, started).await,
            "session_5002"
        );
        assert_eq!(
            h.controller.allocate_id(SessionKind::Intelligent, started).await,
            "intelligent_session_5000"
        );
    }

    #[tokio::test]
    async fn back_to_back_sessions_never_share_an_id() {
        let h = harness(ScriptedProbe::new());
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = h.controller.start_recording(SessionKind::Manual).await.unwrap();
            h.controller
                .record_manual_action("step", json!(null))
                .await
                .unwrap();
            h.controller.stop(&id).await.unwrap();
            ids.push(id);
        }

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert_eq!(h.controller.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn direct_actions_reach_the_actuator() {
        let h = harness(ScriptedProbe::new());
        h.controller
            .click_at(Point::new(12, 34), MouseButton::Right)
            .await
            .unwrap();
        h.controller.type_text("hi\nthere").await.unwrap();
        h.controller.press_key(" ctrl+s ").await.unwrap();

        assert_eq!(
            h.actuator.actions(),
            vec![
                Actuation::Click(Point::new(12, 34), MouseButton::Right),
                Actuation::Type("hi".into()),
                Actuation::Key("Return".into()),
                Actuation::Type("there".into()),
                Actuation::Key("ctrl+s".into()),
            ]
        );
        assert!(matches!(
            h.controller.press_key("  ").await,
            Err(RecorderError::InvalidAction(_))
        ));
        assert!(matches!(
            h.controller.type_text("").await,
            Err(RecorderError::InvalidAction(_))
        ));
    }

    #[tokio::test]
    async fn typing_failure_is_an_actuation_failure() {
        let controller = RecorderController::new(
            Arc::new(ScriptedProbe::new()),
            Arc::new(RecordingActuator::failing_typing()),
            Arc::new(BrokenStore),
            Settings::default(),
        );
        assert!(matches!(
            controller.type_text("abc").await,
            Err(RecorderError::ActuationFailure { action: "typing", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn screen_info_reports_what_answers() {
        let probe = ScriptedProbe::new();
        probe.push_position(640, 480);
        probe.push_window_step(Step::Hang);
        let h = harness(probe);

        let info = h.controller.screen_info().await;
        assert_eq!(info.screen, ScreenSize::default());
        assert_eq!(info.pointer, Some(Point::new(640, 480)));
        assert_eq!(info.active_window, None);

        assert_eq!(h.controller.take_screenshot().await.unwrap(), "screenshot_1.png");
    }
}
