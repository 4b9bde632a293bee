//! Sampled desktop state and the events inferred from it.
//!
//! `Sample` values are transient; `Event` values are what a session records and what a
//! stopped record persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Description carried by every automatic screenshot event.
pub const SCREENSHOT_DESCRIPTION: &str = "automatic screenshot";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Foreground window descriptor as reported by the probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub title: String,
    pub process_id: u32,
    pub rect: WindowRect,
}

impl WindowInfo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// One point-in-time reading of the desktop.
#[derive(Debug, Clone)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub pointer_position: Point,
    pub active_window: Option<WindowInfo>,
    pub clipboard_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MouseClick,
    WindowChange,
    KeyboardInput,
    Screenshot,
    Annotation,
}

/// An inferred user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    MouseClick {
        timestamp: DateTime<Utc>,
        position: Point,
        description: String,
    },
    WindowChange {
        timestamp: DateTime<Utc>,
        window: WindowInfo,
        description: String,
    },
    KeyboardInput {
        timestamp: DateTime<Utc>,
        content: String,
        description: String,
    },
    Screenshot {
        timestamp: DateTime<Utc>,
        image_ref: String,
    },
    /// A step recorded by hand during a manual session.
    Annotation {
        timestamp: DateTime<Utc>,
        description: String,
        #[serde(default)]
        context: serde_json::Value,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MouseClick { .. } => EventKind::MouseClick,
            Event::WindowChange { .. } => EventKind::WindowChange,
            Event::KeyboardInput { .. } => EventKind::KeyboardInput,
            Event::Screenshot { .. } => EventKind::Screenshot,
            Event::Annotation { .. } => EventKind::Annotation,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::MouseClick { timestamp, .. }
            | Event::WindowChange { timestamp, .. }
            | Event::KeyboardInput { timestamp, .. }
            | Event::Screenshot { timestamp, .. }
            | Event::Annotation { timestamp, .. } => *timestamp,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Event::MouseClick { description, .. }
            | Event::WindowChange { description, .. }
            | Event::KeyboardInput { description, .. }
            | Event::Annotation { description, .. } => description,
            Event::Screenshot { .. } => SCREENSHOT_DESCRIPTION,
        }
    }

    /// Clicks and window changes mark the moments worth keeping a screenshot for.
    pub fn is_navigation(&self) -> bool {
        matches!(self.kind(), EventKind::MouseClick | EventKind::WindowChange)
    }

    pub fn type_tag(&self) -> &'static str {
        match self.kind() {
            EventKind::MouseClick => "mouse_click",
            EventKind::WindowChange => "window_change",
            EventKind::KeyboardInput => "keyboard_input",
            EventKind::Screenshot => "screenshot",
            EventKind::Annotation => "annotation",
        }
    }
}
