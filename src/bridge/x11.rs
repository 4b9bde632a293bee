//! Desktop bridge for X11 sessions backed by helper processes
//! (`xdotool`, `xclip` and ImageMagick's `import`).

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use uuid::Uuid;

use super::{Actuator, MouseButton, ScreenSize, StateProbe};
use crate::models::{Point, WindowInfo, WindowRect};

/// Screenshots smaller than this are most likely blank captures.
const SUSPICIOUS_SCREENSHOT_BYTES: u64 = 1000;

pub struct X11Bridge {
    screenshot_dir: PathBuf,
    type_delay_ms: u32,
}

impl X11Bridge {
    pub fn new(screenshot_dir: PathBuf) -> Self {
        Self {
            screenshot_dir,
            type_delay_ms: 12,
        }
    }

    fn button_code(button: MouseButton) -> &'static str {
        match button {
            MouseButton::Left => "1",
            MouseButton::Middle => "2",
            MouseButton::Right => "3",
        }
    }

    async fn verify_screenshot(path: PathBuf) -> Result<()> {
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("screenshot missing at {}", path.display()))?;
        if metadata.len() == 0 {
            bail!("screenshot file {} is empty", path.display());
        }
        if metadata.len() < SUSPICIOUS_SCREENSHOT_BYTES {
            log::warn!(
                "screenshot {} is only {} bytes, may be blank",
                path.display(),
                metadata.len()
            );
        }

        let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&path))
            .await
            .context("screenshot verification worker join failed")?
            .context("screenshot is not a readable image")?;
        debug!("screenshot verified: {width}x{height}");
        Ok(())
    }
}

async fn run_helper(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{program} {} exited with {}: {}", args.join(" "), output.status, stderr.trim());
    }

    String::from_utf8(output.stdout).with_context(|| format!("{program} produced non-UTF-8 output"))
}

/// Parses `KEY=VALUE` lines as printed by `xdotool ... --shell`.
fn shell_value<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (name, value) = line.split_once('=')?;
        (name.trim() == key).then_some(value.trim())
    })
}

fn shell_i32(output: &str, key: &str) -> Result<i32> {
    shell_value(output, key)
        .ok_or_else(|| anyhow!("missing {key} in xdotool output"))?
        .parse()
        .with_context(|| format!("invalid {key} in xdotool output"))
}

fn parse_pointer(output: &str) -> Result<Point> {
    Ok(Point::new(shell_i32(output, "X")?, shell_i32(output, "Y")?))
}

fn parse_geometry(output: &str) -> Result<WindowRect> {
    let left = shell_i32(output, "X")?;
    let top = shell_i32(output, "Y")?;
    let width = shell_i32(output, "WIDTH")?;
    let height = shell_i32(output, "HEIGHT")?;
    Ok(WindowRect {
        left,
        top,
        right: left + width,
        bottom: top + height,
    })
}

fn parse_display_geometry(output: &str) -> Result<ScreenSize> {
    let mut parts = output.split_whitespace();
    let width = parts
        .next()
        .ok_or_else(|| anyhow!("empty display geometry"))?
        .parse()
        .context("invalid display width")?;
    let height = parts
        .next()
        .ok_or_else(|| anyhow!("display geometry missing height"))?
        .parse()
        .context("invalid display height")?;
    Ok(ScreenSize { width, height })
}

#[async_trait]
impl StateProbe for X11Bridge {
    async fn pointer_position(&self) -> Result<Point> {
        let output = run_helper("xdotool", &["getmouselocation", "--shell"]).await?;
        parse_pointer(&output)
    }

    async fn active_window(&self) -> Result<WindowInfo> {
        let window_id = run_helper("xdotool", &["getactivewindow"]).await?;
        let window_id = window_id.trim();

        let title = run_helper("xdotool", &["getwindowname", window_id]).await?;
        // Not every window advertises _NET_WM_PID.
        let process_id = run_helper("xdotool", &["getwindowpid", window_id])
            .await
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
            .unwrap_or(0);
        let geometry = run_helper("xdotool", &["getwindowgeometry", "--shell", window_id]).await?;

        Ok(WindowInfo {
            title: title.trim_end_matches('\n').to_string(),
            process_id,
            rect: parse_geometry(&geometry)?,
        })
    }

    async fn clipboard_text(&self) -> Result<String> {
        let text = run_helper("xclip", &["-o", "-selection", "clipboard"]).await?;
        Ok(text.trim().to_string())
    }

    async fn capture_screen(&self) -> Result<String> {
        tokio::fs::create_dir_all(&self.screenshot_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create screenshot directory {}",
                    self.screenshot_dir.display()
                )
            })?;

        let path = self
            .screenshot_dir
            .join(format!("screenshot_{}.png", Uuid::new_v4()));
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("screenshot path is not valid UTF-8"))?
            .to_string();

        run_helper("import", &["-window", "root", &path_str]).await?;
        Self::verify_screenshot(path).await?;
        Ok(path_str)
    }

    async fn screen_size(&self) -> Result<ScreenSize> {
        let output = run_helper("xdotool", &["getdisplaygeometry"]).await?;
        parse_display_geometry(&output)
    }
}

#[async_trait]
impl Actuator for X11Bridge {
    async fn click(&self, position: Point, button: MouseButton) -> Result<()> {
        debug!("clicking at ({}, {}) with {} button", position.x, position.y, button.as_str());
        let x = position.x.to_string();
        let y = position.y.to_string();
        run_helper(
            "xdotool",
            &["mousemove", "--sync", &x, &y, "click", Self::button_code(button)],
        )
        .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let delay = self.type_delay_ms.to_string();
        run_helper("xdotool", &["type", "--delay", &delay, "--", text]).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        run_helper("xdotool", &["key", "--", key]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pointer_shell_output() {
        let output = "X=640\nY=388\nSCREEN=0\nWINDOW=65011718\n";
        assert_eq!(parse_pointer(output).unwrap(), Point::new(640, 388));
    }

    #[test]
    fn parses_window_geometry_into_rect() {
        let output = "WINDOW=65011718\nX=100\nY=50\nWIDTH=800\nHEIGHT=600\nSCREEN=0\n";
        assert_eq!(
            parse_geometry(output).unwrap(),
            WindowRect {
                left: 100,
                top: 50,
                right: 900,
                bottom: 650
            }
        );
    }

    #[test]
    fn rejects_incomplete_output() {
        assert!(parse_pointer("X=1\n").is_err());
        assert!(parse_display_geometry("").is_err());
        assert_eq!(
            parse_display_geometry("2560 1440\n").unwrap(),
            ScreenSize {
                width: 2560,
                height: 1440
            }
        );
    }
}
