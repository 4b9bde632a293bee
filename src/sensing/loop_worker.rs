use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use log::debug;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bridge::{ScreenSize, StateProbe};
use crate::error::ProbeDegraded;
use crate::models::{Event, Point, Sample, WindowInfo};

use super::config::SamplingConfig;
use super::detector::Detector;
use super::event_log::EventLog;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// A pointer displacement waiting for its dwell check.
#[derive(Debug, Clone, Copy)]
struct PendingDwell {
    origin: Point,
    due: Instant,
}

/// The answer of one desktop query, handed back to the loop once the query task ends.
enum Reading {
    Pointer(Result<Point, ProbeDegraded>),
    Window(Result<WindowInfo, ProbeDegraded>),
    DwellPointer {
        origin: Point,
        reading: Result<Point, ProbeDegraded>,
    },
    DwellWindow {
        origin: Point,
        reading: Result<WindowInfo, ProbeDegraded>,
    },
    Clipboard(Result<String, ProbeDegraded>),
    Screenshot(Result<String, ProbeDegraded>),
}

/// Query tasks still running per tick channel. A tick is skipped while its previous query runs.
#[derive(Default)]
struct InFlight {
    pointer: Option<AbortHandle>,
    window: Option<AbortHandle>,
    clipboard: Option<AbortHandle>,
    screenshot: Option<AbortHandle>,
}

fn is_idle(slot: &Option<AbortHandle>) -> bool {
    slot.as_ref().map_or(true, AbortHandle::is_finished)
}

/// Owns the per-session sampling state.
///
/// Desktop queries run as tasks in `queries`; their readings are applied on the loop task,
/// one at a time, so a slow query never holds up the other timers.
pub struct Sampler {
    session_id: String,
    probe: Arc<dyn StateProbe>,
    config: SamplingConfig,
    detector: Detector,
    last_known: Sample,
    pending_dwells: VecDeque<PendingDwell>,
    queries: JoinSet<Reading>,
    in_flight: InFlight,
    log: EventLog,
    cancel_token: CancellationToken,
}

impl Sampler {
    pub fn new(
        session_id: String,
        probe: Arc<dyn StateProbe>,
        config: SamplingConfig,
        screen: ScreenSize,
        cancel_token: CancellationToken,
    ) -> Self {
        let detector = Detector::new(&config, screen);
        Self {
            session_id,
            probe,
            config,
            detector,
            last_known: Sample {
                timestamp: Utc::now(),
                pointer_position: Point::default(),
                active_window: None,
                clipboard_text: None,
            },
            pending_dwells: VecDeque::new(),
            queries: JoinSet::new(),
            in_flight: InFlight::default(),
            log: EventLog::new(),
            cancel_token,
        }
    }

    fn is_monitoring(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }

    pub fn events(&self) -> &[Event] {
        self.log.events()
    }

    pub fn pending_dwell_checks(&self) -> usize {
        self.pending_dwells.len()
    }

    pub fn next_dwell_due(&self) -> Option<Instant> {
        self.pending_dwells.front().map(|pending| pending.due)
    }

    pub fn on_position_tick(&mut self) {
        if !self.is_monitoring() {
            return;
        }

        if is_idle(&self.in_flight.pointer) {
            self.in_flight.pointer = Some(self.query_pointer(None));
        } else {
            debug!("pointer query still running; skipping tick");
        }

        if is_idle(&self.in_flight.window) {
            self.in_flight.window = Some(self.query_window(None));
        } else {
            debug!("window query still running; skipping tick");
        }
    }

    pub fn on_dwell_due(&mut self) {
        let Some(pending) = self.pending_dwells.pop_front() else {
            return;
        };
        if !self.is_monitoring() {
            return;
        }
        self.query_pointer(Some(pending.origin));
    }

    pub fn on_clipboard_tick(&mut self) {
        if !self.is_monitoring() {
            return;
        }
        if !is_idle(&self.in_flight.clipboard) {
            debug!("clipboard query still running; skipping tick");
            return;
        }

        let probe = self.probe.clone();
        let limit = self.config.probe_timeout();
        self.in_flight.clipboard = Some(self.queries.spawn(async move {
            Reading::Clipboard(bounded("clipboard", limit, probe.clipboard_text()).await)
        }));
    }

    pub fn on_screenshot_tick(&mut self) {
        if !self.is_monitoring() {
            return;
        }
        if !is_idle(&self.in_flight.screenshot) {
            debug!("screen capture still running; skipping tick");
            return;
        }

        let probe = self.probe.clone();
        let limit = self.config.probe_timeout();
        self.in_flight.screenshot = Some(self.queries.spawn(async move {
            Reading::Screenshot(bounded("screen capture", limit, probe.capture_screen()).await)
        }));
    }

    /// `dwell_origin` marks a dwell re-check rather than a regular position sample.
    fn query_pointer(&mut self, dwell_origin: Option<Point>) -> AbortHandle {
        let probe = self.probe.clone();
        let limit = self.config.probe_timeout();
        self.queries.spawn(async move {
            let reading = bounded("pointer", limit, probe.pointer_position()).await;
            match dwell_origin {
                Some(origin) => Reading::DwellPointer { origin, reading },
                None => Reading::Pointer(reading),
            }
        })
    }

    fn query_window(&mut self, dwell_origin: Option<Point>) -> AbortHandle {
        let probe = self.probe.clone();
        let limit = self.config.probe_timeout();
        self.queries.spawn(async move {
            let reading = bounded("active window", limit, probe.active_window()).await;
            match dwell_origin {
                Some(origin) => Reading::DwellWindow { origin, reading },
                None => Reading::Window(reading),
            }
        })
    }

    /// Waits for the next finished query. `None` when nothing is running.
    async fn next_reading(&mut self) -> Option<Reading> {
        while let Some(joined) = self.queries.join_next().await {
            match joined {
                Ok(reading) => return Some(reading),
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    log_warn!("desktop query for session {} failed: {err}", self.session_id);
                }
            }
        }
        None
    }

    fn apply(&mut self, reading: Reading) {
        if !self.is_monitoring() {
            return;
        }

        match reading {
            Reading::Pointer(reading) => {
                let position = self.pointer_or_last(reading);
                if let Some(origin) = self.detector.observe_position(position) {
                    self.pending_dwells.push_back(PendingDwell {
                        origin,
                        due: Instant::now() + self.config.dwell_delay(),
                    });
                }
            }
            Reading::Window(reading) => {
                if let Some(window) = self.window_or_last(reading) {
                    if let Some(event) = self.detector.observe_window(&window, Utc::now()) {
                        self.record(event);
                    }
                }
            }
            Reading::DwellPointer { origin, reading } => {
                let current = self.pointer_or_last(reading);
                if self.detector.has_settled(origin, current) {
                    self.query_window(Some(origin));
                }
            }
            Reading::DwellWindow { origin, reading } => {
                let window = self.window_or_last(reading);
                let event = self.detector.click_event(origin, window.as_ref(), Utc::now());
                self.record(event);
            }
            Reading::Clipboard(reading) => {
                let Some(text) = self.clipboard_or_last(reading) else {
                    return;
                };
                if let Some(event) = self.detector.observe_clipboard(&text, Utc::now()) {
                    self.record(event);
                }
            }
            Reading::Screenshot(Ok(image_ref)) => {
                let event = self.detector.screenshot_event(image_ref, Utc::now());
                self.record(event);
            }
            Reading::Screenshot(Err(err)) => {
                log_warn!("automatic screenshot skipped for session {}: {err}", self.session_id);
            }
        }
    }

    fn record(&mut self, event: Event) {
        if !self.is_monitoring() {
            return;
        }
        log_info!("Detected: {}", event.description());
        self.log.push(event);
    }

    fn pointer_or_last(&mut self, reading: Result<Point, ProbeDegraded>) -> Point {
        match reading {
            Ok(position) => {
                self.last_known.pointer_position = position;
                self.last_known.timestamp = Utc::now();
                position
            }
            Err(err) => {
                log_warn!("{err}; reusing last known pointer position");
                self.last_known.pointer_position
            }
        }
    }

    fn window_or_last(&mut self, reading: Result<WindowInfo, ProbeDegraded>) -> Option<WindowInfo> {
        match reading {
            Ok(window) => {
                self.last_known.active_window = Some(window.clone());
                self.last_known.timestamp = Utc::now();
                Some(window)
            }
            Err(err) => {
                log_warn!("{err}; reusing last known window");
                self.last_known.active_window.clone()
            }
        }
    }

    fn clipboard_or_last(&mut self, reading: Result<String, ProbeDegraded>) -> Option<String> {
        match reading {
            Ok(text) => {
                self.last_known.clipboard_text = Some(text.clone());
                self.last_known.timestamp = Utc::now();
                Some(text)
            }
            Err(err) => {
                log_warn!("{err}; reusing last known clipboard text");
                self.last_known.clipboard_text.clone()
            }
        }
    }

    /// Drops dwell checks that never fired, aborts running queries and hands back the events.
    pub fn finish(mut self) -> EventLog {
        if !self.pending_dwells.is_empty() {
            log_info!(
                "discarding {} pending dwell check(s) for session {}",
                self.pending_dwells.len(),
                self.session_id
            );
        }
        self.queries.abort_all();
        self.log
    }
}

async fn bounded<T, F>(probe: &'static str, limit: Duration, fut: F) -> Result<T, ProbeDegraded>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ProbeDegraded::Failed { probe, source }),
        Err(_) => Err(ProbeDegraded::TimedOut {
            probe,
            after: limit,
        }),
    }
}

/// First tick fires one full period after start.
fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub async fn sampling_loop(mut sampler: Sampler) -> EventLog {
    let cancel_token = sampler.cancel_token.clone();
    let mut position_ticker = ticker(sampler.config.position_interval());
    let mut screenshot_ticker = ticker(sampler.config.screenshot_interval());
    let mut clipboard_ticker = ticker(sampler.config.clipboard_interval());

    log_info!("sampling loop started for session {}", sampler.session_id);

    loop {
        let next_dwell = sampler.next_dwell_due();
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
            Some(reading) = sampler.next_reading() => sampler.apply(reading),
            _ = wait_until(next_dwell) => sampler.on_dwell_due(),
            _ = position_ticker.tick() => sampler.on_position_tick(),
            _ = clipboard_ticker.tick() => sampler.on_clipboard_tick(),
            _ = screenshot_ticker.tick() => sampler.on_screenshot_tick(),
        }
    }

    sampler.finish()
}
