//! SQLite recording store.
//!
//! One worker thread owns the connection. Async callers hand it jobs through
//! [`Database::execute`] and await the reply; dropping the last handle closes the job
//! channel, which ends the worker.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

pub mod helpers;
mod migrations;
mod repositories;

use migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

const WORKER_THREAD_NAME: &str = "deskreplay-db";

/// Applied to every connection before migrations run. Failures are logged, not fatal.
const PRAGMAS: &[(&str, &str)] = &[("journal_mode", "WAL"), ("foreign_keys", "ON")];

struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued jobs and return.
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Recording store worker panicked");
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
    for (pragma, value) in PRAGMAS {
        if let Err(err) = conn.pragma_update(None, pragma, value) {
            warn!("Could not set {pragma}={value} on {}: {err}", path.display());
        }
    }
    run_migrations(&mut conn).context("failed to migrate recording schema")?;
    Ok(conn)
}

fn serve(path: PathBuf, jobs: mpsc::Receiver<Job>, ready: mpsc::Sender<Result<()>>) {
    let mut conn = match open_connection(&path) {
        Ok(conn) => conn,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    for job in jobs {
        job(&mut conn);
    }
    debug!("Recording store worker for {} stopped", path.display());
}

/// Cloneable handle on the recording database.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    /// Creates the parent directory, opens the file and brings the schema up to date.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let worker_path = path.clone();
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || serve(worker_path, jobs_rx, ready_tx))
            .context("failed to start recording store worker")?;

        let worker = Worker {
            jobs: Some(jobs_tx),
            thread: Some(thread),
        };
        ready_rx
            .recv()
            .map_err(|_| anyhow!("recording store worker exited during startup"))??;

        info!("Recording database ready at {}", path.display());
        Ok(Self {
            worker: Arc::new(worker),
        })
    }

    /// Runs `job` on the worker thread and waits for its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self
            .worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("recording store is closed"))?;
        let (reply_tx, reply_rx) = oneshot::channel();

        jobs.send(Box::new(move |conn: &mut Connection| {
            // The caller may have given up waiting.
            let _ = reply_tx.send(job(conn));
        }))
        .map_err(|_| anyhow!("recording store worker is gone"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("recording store worker stopped before replying"))?
    }
}
