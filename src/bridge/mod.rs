//! Capability interface to the desktop: state queries for the sampler and actuation
//! primitives for the replayer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Point, WindowInfo};

pub mod x11;

#[cfg(test)]
pub mod testing;

pub use x11::X11Bridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }
}

/// Point-in-time queries of desktop state. Any call may fail or hang; callers bound them.
#[async_trait]
pub trait StateProbe: Send + Sync {
    async fn pointer_position(&self) -> Result<Point>;

    async fn active_window(&self) -> Result<WindowInfo>;

    async fn clipboard_text(&self) -> Result<String>;

    /// Captures the screen and returns a reference (usually a file path) to the image.
    async fn capture_screen(&self) -> Result<String>;

    async fn screen_size(&self) -> Result<ScreenSize> {
        bail!("screen size is not reported by this probe")
    }
}

/// Input primitives driven during replay.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn click(&self, position: Point, button: MouseButton) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;
}
