//! Scripted probe and recording actuator used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{Actuator, MouseButton, ScreenSize, StateProbe};
use crate::models::{Point, WindowInfo};

/// A scripted reading: a value, a failure, or a call that never returns in time.
#[derive(Debug, Clone)]
pub enum Step<T> {
    Value(T),
    Fail,
    Hang,
}

/// Replays queued readings; once a queue drains, the last value repeats.
#[derive(Default)]
pub struct ScriptedProbe {
    positions: Mutex<Script<Point>>,
    windows: Mutex<Script<WindowInfo>>,
    clipboard: Mutex<Script<String>>,
    clipboard_reads: Mutex<Vec<tokio::time::Instant>>,
    screenshots: Mutex<u32>,
    pub screen: Option<ScreenSize>,
}

struct Script<T> {
    queue: VecDeque<Step<T>>,
    last: Option<T>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Step<T> {
        match self.queue.pop_front() {
            Some(Step::Value(value)) => {
                self.last = Some(value.clone());
                Step::Value(value)
            }
            Some(other) => other,
            None => match &self.last {
                Some(value) => Step::Value(value.clone()),
                None => Step::Fail,
            },
        }
    }
}

async fn resolve<T>(step: Step<T>, what: &str) -> Result<T> {
    match step {
        Step::Value(value) => Ok(value),
        Step::Fail => Err(anyhow!("scripted {what} failure")),
        Step::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(anyhow!("scripted {what} hang"))
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_position(&self, x: i32, y: i32) -> &Self {
        lock(&self.positions).queue.push_back(Step::Value(Point::new(x, y)));
        self
    }

    pub fn push_position_step(&self, step: Step<Point>) -> &Self {
        lock(&self.positions).queue.push_back(step);
        self
    }

    pub fn push_window(&self, title: &str) -> &Self {
        lock(&self.windows)
            .queue
            .push_back(Step::Value(WindowInfo::titled(title)));
        self
    }

    pub fn push_window_info(&self, window: WindowInfo) -> &Self {
        lock(&self.windows).queue.push_back(Step::Value(window));
        self
    }

    pub fn push_window_step(&self, step: Step<WindowInfo>) -> &Self {
        lock(&self.windows).queue.push_back(step);
        self
    }

    pub fn push_clipboard(&self, text: &str) -> &Self {
        lock(&self.clipboard)
            .queue
            .push_back(Step::Value(text.to_string()));
        self
    }

    pub fn push_clipboard_step(&self, step: Step<String>) -> &Self {
        lock(&self.clipboard).queue.push_back(step);
        self
    }

    /// The (tokio) instants at which the clipboard was read.
    pub fn clipboard_reads(&self) -> Vec<tokio::time::Instant> {
        lock(&self.clipboard_reads).clone()
    }

    pub fn screenshots_taken(&self) -> u32 {
        *lock(&self.screenshots)
    }
}

#[async_trait]
impl StateProbe for ScriptedProbe {
    async fn pointer_position(&self) -> Result<Point> {
        let step = lock(&self.positions).next();
        resolve(step, "pointer").await
    }

    async fn active_window(&self) -> Result<WindowInfo> {
        let step = lock(&self.windows).next();
        resolve(step, "window").await
    }

    async fn clipboard_text(&self) -> Result<String> {
        lock(&self.clipboard_reads).push(tokio::time::Instant::now());
        let step = lock(&self.clipboard).next();
        resolve(step, "clipboard").await
    }

    async fn capture_screen(&self) -> Result<String> {
        let mut count = lock(&self.screenshots);
        *count += 1;
        Ok(format!("screenshot_{count}.png"))
    }

    async fn screen_size(&self) -> Result<ScreenSize> {
        self.screen.ok_or_else(|| anyhow!("no scripted screen size"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Actuation {
    Click(Point, MouseButton),
    Type(String),
    Key(String),
}

/// Records every actuation with the (tokio) instant it happened.
#[derive(Default)]
pub struct RecordingActuator {
    calls: Mutex<Vec<(tokio::time::Instant, Actuation)>>,
    fail_typing: bool,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_typing() -> Self {
        Self {
            fail_typing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(tokio::time::Instant, Actuation)> {
        lock(&self.calls).clone()
    }

    pub fn actions(&self) -> Vec<Actuation> {
        lock(&self.calls).iter().map(|(_, a)| a.clone()).collect()
    }

    fn record(&self, action: Actuation) {
        lock(&self.calls).push((tokio::time::Instant::now(), action));
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn click(&self, position: Point, button: MouseButton) -> Result<()> {
        self.record(Actuation::Click(position, button));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        if self.fail_typing {
            return Err(anyhow!("keyboard unavailable"));
        }
        self.record(Actuation::Type(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(Actuation::Key(key.to_string()));
        Ok(())
    }
}
