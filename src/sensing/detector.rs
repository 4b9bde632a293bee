//! Turns consecutive samples into classified events.

use chrono::{DateTime, Utc};

use crate::bridge::ScreenSize;
use crate::models::{Event, Point, WindowInfo};

use super::classifier::{describe_click, describe_window};
use super::config::SamplingConfig;

pub struct Detector {
    movement_threshold_px: f64,
    dwell_tolerance_px: i32,
    clipboard_max_chars: usize,
    description_max_chars: usize,
    screen: ScreenSize,
    last_position: Point,
    last_title: Option<String>,
    last_clipboard: String,
}

impl Detector {
    pub fn new(config: &SamplingConfig, screen: ScreenSize) -> Self {
        Self {
            movement_threshold_px: config.movement_threshold_px,
            dwell_tolerance_px: config.dwell_tolerance_px,
            clipboard_max_chars: config.clipboard_max_chars,
            description_max_chars: config.description_max_chars,
            screen,
            last_position: Point::default(),
            last_title: None,
            last_clipboard: String::new(),
        }
    }

    pub fn last_position(&self) -> Point {
        self.last_position
    }

    /// Returns the new position when the pointer moved far enough to warrant a dwell check.
    pub fn observe_position(&mut self, position: Point) -> Option<Point> {
        if position.distance_to(&self.last_position) <= self.movement_threshold_px {
            return None;
        }
        self.last_position = position;
        Some(position)
    }

    /// True when `current` lies strictly within the dwell tolerance of `origin` on both axes.
    pub fn has_settled(&self, origin: Point, current: Point) -> bool {
        (current.x - origin.x).abs() < self.dwell_tolerance_px
            && (current.y - origin.y).abs() < self.dwell_tolerance_px
    }

    pub fn click_event(
        &self,
        origin: Point,
        window: Option<&WindowInfo>,
        timestamp: DateTime<Utc>,
    ) -> Event {
        Event::MouseClick {
            timestamp,
            position: origin,
            description: describe_click(origin, self.screen, window),
        }
    }

    /// Titles are compared exactly against the previously recorded one only.
    pub fn observe_window(&mut self, window: &WindowInfo, timestamp: DateTime<Utc>) -> Option<Event> {
        if self.last_title.as_deref() == Some(window.title.as_str()) {
            return None;
        }
        self.last_title = Some(window.title.clone());

        Some(Event::WindowChange {
            timestamp,
            window: window.clone(),
            description: describe_window(window),
        })
    }

    pub fn observe_clipboard(&mut self, text: &str, timestamp: DateTime<Utc>) -> Option<Event> {
        if text == self.last_clipboard || text.chars().count() >= self.clipboard_max_chars {
            return None;
        }
        self.last_clipboard = text.to_string();

        Some(Event::KeyboardInput {
            timestamp,
            content: text.to_string(),
            description: format!(
                "detected text input: {}",
                truncate(text, self.description_max_chars)
            ),
        })
    }

    pub fn screenshot_event(&self, image_ref: String, timestamp: DateTime<Utc>) -> Event {
        Event::Screenshot {
            timestamp,
            image_ref,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}
