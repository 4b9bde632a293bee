//! Handlers behind the `deskreplay` subcommands.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use log::warn;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::RecorderError;
use crate::bridge::MouseButton;
use crate::models::{Point, SessionKind, SessionRecord};
use crate::replay::ReplayReport;

use super::RecorderController;

/// Resolves after `duration`, or never when no limit was given.
async fn deadline(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}

pub async fn record(
    controller: &RecorderController,
    kind: SessionKind,
    duration_secs: Option<u64>,
) -> Result<()> {
    let limit = duration_secs.map(Duration::from_secs);
    let session_id = controller.start_recording(kind).await?;

    match kind {
        SessionKind::Intelligent => {
            println!("Recording {session_id}; press Ctrl-C to stop.");
            tokio::select! {
                _ = ctrl_c() => {}
                _ = deadline(limit) => {}
            }
        }
        SessionKind::Manual => {
            println!("Recording {session_id}; enter one step per line, end with Ctrl-D.");
            let stop = async {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = deadline(limit) => {}
                }
            };
            collect_manual_steps(controller, BufReader::new(tokio::io::stdin()), stop).await;
        }
    }

    match controller.stop(&session_id).await {
        Ok(record) => {
            print_summary(&record);
            Ok(())
        }
        Err(RecorderError::StoreFailure {
            reason,
            unsaved: Some(record),
        }) => {
            print_summary(&record);
            bail!("recording {} could not be saved: {reason}", record.id)
        }
        Err(err) => Err(err.into()),
    }
}

/// Records one step per line until `stop` resolves or the input ends.
async fn collect_manual_steps<R, S>(controller: &RecorderController, input: R, stop: S) -> usize
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut recorded = 0;
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => match controller.record_manual_action(&line, json!({})).await {
                    Ok(count) => {
                        recorded = count;
                        println!("  step {count} recorded");
                    }
                    Err(RecorderError::InvalidAction(reason)) => println!("  skipped: {reason}"),
                    Err(err) => {
                        warn!("Manual step rejected: {err}");
                        break;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    warn!("Failed to read stdin: {err}");
                    break;
                }
            },
        }
    }
    recorded
}

fn print_summary(record: &SessionRecord) {
    println!(
        "Stopped {} ({}): {} relevant of {} observed actions, {}s",
        record.id,
        record.kind.as_str(),
        record.relevant_action_count,
        record.total_events_observed,
        record.duration_secs
    );
    for line in &record.summary_lines {
        println!("{line}");
    }
}

pub async fn replay(controller: &RecorderController, id: &str, speed: Option<f64>) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            ctrl_c().await;
            cancel.cancel();
        })
    };

    let result = controller.replay(id, speed, &cancel).await;
    watcher.abort();

    let report = result?;
    print_report(&report);
    if !report.succeeded() {
        bail!("replay of {} was cancelled", report.session_id);
    }
    Ok(())
}

fn print_report(report: &ReplayReport) {
    println!(
        "Replayed {}: {} performed, {} logged only, {} skipped, {} failed of {} actions",
        report.session_id,
        report.performed,
        report.logged_only,
        report.skipped,
        report.failures.len(),
        report.total
    );
    for failure in &report.failures {
        println!(
            "  action {} ({}) failed: {}",
            failure.index, failure.description, failure.reason
        );
    }
}

pub async fn list(controller: &RecorderController) -> Result<()> {
    let recordings = controller.list().await?;
    if recordings.is_empty() {
        println!("No recordings found.");
        return Ok(());
    }

    for (i, meta) in recordings.iter().enumerate() {
        println!(
            "{}. {} ({}) - {} actions",
            i + 1,
            meta.id,
            meta.kind.as_str(),
            meta.action_count
        );
    }
    Ok(())
}

pub async fn click(controller: &RecorderController, x: i32, y: i32, button: MouseButton) -> Result<()> {
    controller.click_at(Point::new(x, y), button).await?;
    println!("Clicked {} at ({x}, {y})", button.as_str());
    Ok(())
}

pub async fn type_text(controller: &RecorderController, text: &str) -> Result<()> {
    controller.type_text(text).await?;
    println!("Typed {} characters", text.chars().count());
    Ok(())
}

pub async fn key(controller: &RecorderController, name: &str) -> Result<()> {
    controller.press_key(name).await?;
    println!("Pressed {}", name.trim());
    Ok(())
}

pub async fn screenshot(controller: &RecorderController) -> Result<()> {
    let image_ref = controller.take_screenshot().await?;
    println!("Screenshot saved to {image_ref}");
    Ok(())
}

pub async fn screen_info(controller: &RecorderController) -> Result<()> {
    let info = controller.screen_info().await;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{RecordingActuator, ScriptedProbe};
    use crate::settings::Settings;
    use crate::store::JsonDirStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn controller(dir: &TempDir) -> RecorderController {
        RecorderController::new(
            Arc::new(ScriptedProbe::new()),
            Arc::new(RecordingActuator::new()),
            Arc::new(JsonDirStore::new(dir.path().join("recordings"))),
            Settings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_ends_a_pending_read() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let id = controller.start_recording(SessionKind::Manual).await.unwrap();

        // The writer stays open, so the third read waits until the stop signal fires.
        let (mut writer, reader) = tokio::io::duplex(256);
        writer
            .write_all(b"open the report\n\nclick Next\n")
            .await
            .unwrap();
        let stop = tokio::time::sleep(Duration::from_secs(5));

        let recorded = collect_manual_steps(&controller, BufReader::new(reader), stop).await;
        assert_eq!(recorded, 2);

        let record = controller.stop(&id).await.unwrap();
        assert_eq!(
            record.summary_lines,
            vec!["1. open the report".to_string(), "2. click Next".to_string()]
        );
        drop(writer);
    }

    #[tokio::test]
    async fn end_of_input_ends_collection() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        controller.start_recording(SessionKind::Manual).await.unwrap();

        let input: &[u8] = b"only step";
        let recorded =
            collect_manual_steps(&controller, BufReader::new(input), std::future::pending()).await;
        assert_eq!(recorded, 1);
    }
}
