use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{ScreenSize, StateProbe};

use super::config::SamplingConfig;
use super::event_log::EventLog;
use super::loop_worker::{sampling_loop, Sampler};

/// Starts and stops the sampling task of the active session.
pub struct SensingController {
    handle: Option<JoinHandle<EventLog>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_sensing(
        &mut self,
        session_id: String,
        probe: Arc<dyn StateProbe>,
        config: SamplingConfig,
        screen: ScreenSize,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sensing already active");
        }

        info!("Starting sampling for session {session_id}");
        let cancel_token = CancellationToken::new();
        let sampler = Sampler::new(session_id, probe, config, screen, cancel_token.clone());
        let handle = tokio::spawn(sampling_loop(sampler));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for it; pending dwell checks are discarded.
    pub async fn stop_sensing(&mut self) -> Result<EventLog> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => handle.await.context("sampling loop task failed to join"),
            None => Ok(EventLog::new()),
        }
    }
}
