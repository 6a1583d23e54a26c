//! Run orchestration
//!
//! [`Orchestrator::run`] names the discovered tree, persists it, and then
//! drives two worker pools joined by a bounded queue:
//!
//! - exporter workers claim downloadable nodes one at a time, create and
//!   poll export jobs, and push finished work to the queue (direct
//!   downloads skip straight to it)
//! - downloader workers take items off the queue and stream them to disk
//!
//! The progress program owns the UI. When it stops (every row finished and
//! `quit_automatically` is set, or the user quit) the shared cancellation
//! token is fired and the workers are joined.

mod workers;

use crate::cloud::CloudClient;
use crate::config::Config;
use crate::error::Result;
use crate::exporter::Exporter;
use crate::fs::{FileSystem, TokioFileSystem};
use crate::naming;
use crate::progress::{Frontend, ProgressProgram, Row, Stats, StatsFormatter};
use crate::types::{DocumentNode, ExportResult};
use crate::utils;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long workers get to notice cancellation before they are aborted
const WORKER_GRACE: Duration = Duration::from_secs(5);

/// State shared by the worker pools of one run
pub struct TaskState {
    items: Vec<DocumentNode>,
    cursor: AtomicUsize,
    countdown: AtomicI64,
    cancel: CancellationToken,
    queue_tx: mpsc::Sender<ExportResult>,
    queue_rx: Mutex<mpsc::Receiver<ExportResult>>,
}

impl TaskState {
    /// State over `items` with a queue holding at most `queue_capacity` entries
    pub fn new(items: Vec<DocumentNode>, queue_capacity: usize, cancel: CancellationToken) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));
        Self {
            countdown: AtomicI64::new(items.len() as i64),
            items,
            cursor: AtomicUsize::new(0),
            cancel,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    /// Number of downloadable items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there is nothing to download
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Claim the next unprocessed item; each item is handed out once
    pub fn claim(&self) -> Option<&DocumentNode> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.items.get(index)
    }

    /// Record one item reaching `Completed` or `Failed`; returns what is left
    pub fn finish_one(&self) -> i64 {
        self.countdown.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Items not yet finished
    pub fn remaining(&self) -> i64 {
        self.countdown.load(Ordering::SeqCst)
    }

    /// True once the run was cancelled
    pub fn is_completed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the run; never reset
    pub fn complete(&self) {
        self.cancel.cancel();
    }

    /// Push to the download queue, waiting for room
    ///
    /// Returns false when the run was cancelled first.
    pub async fn enqueue(&self, item: ExportResult) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.queue_tx.send(item) => sent.is_ok(),
        }
    }

    /// Next queued item, or `None` when nothing arrived within `wait`
    pub async fn dequeue(&self, wait: Duration) -> Option<ExportResult> {
        let mut rx = self.queue_rx.lock().await;
        tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
    }
}

/// Outcome of [`Orchestrator::run`]
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Where the tree JSON was written
    pub tree_path: PathBuf,
    /// Final aggregate counts
    pub stats: Stats,
    /// Rows that ended `Failed`
    pub failures: Vec<Row>,
    /// Time since the run started
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when every downloadable item was written
    pub fn is_success(&self) -> bool {
        self.stats.failed == 0 && self.stats.downloaded == self.stats.total
    }
}

/// Drives one export run
pub struct Orchestrator {
    client: Arc<dyn CloudClient>,
    config: Config,
    fs: Arc<dyn FileSystem>,
    frontend: Frontend,
}

impl Orchestrator {
    /// Orchestrator writing to the local filesystem with the terminal UI
    pub fn new(client: Arc<dyn CloudClient>, config: Config) -> Self {
        Self {
            client,
            config,
            fs: Arc::new(TokioFileSystem),
            frontend: Frontend::Terminal,
        }
    }

    /// Replace the filesystem
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Choose how progress is shown
    pub fn with_frontend(mut self, frontend: Frontend) -> Self {
        self.frontend = frontend;
        self
    }

    /// Name, persist and fetch the discovered `roots`
    ///
    /// Per-item failures are reported in the summary. Only naming/tree
    /// errors and UI failures abort the run.
    pub async fn run(&self, mut roots: Vec<DocumentNode>) -> Result<RunSummary> {
        let save_dir = &self.config.save_dir;
        naming::assign_paths(&mut roots, save_dir);
        let tree_path = naming::write_tree(self.fs.as_ref(), save_dir, &roots).await?;

        let items = naming::flatten(&roots);
        if self.config.list_only {
            info!(documents = items.len(), "List-only run, nothing downloaded");
            return Ok(self.summary(tree_path, Stats::default(), Vec::new()));
        }
        if items.is_empty() {
            info!("No downloadable documents found");
            return Ok(self.summary(tree_path, Stats::default(), Vec::new()));
        }

        info!(
            documents = items.len(),
            exporters = self.config.workers.exporters,
            downloaders = self.config.workers.downloaders,
            "Starting export"
        );

        let cancel = CancellationToken::new();
        let state = Arc::new(TaskState::new(
            items,
            self.config.workers.queue_capacity,
            cancel.clone(),
        ));
        let (program, handle) = ProgressProgram::new(state.len(), stats_formatter(Instant::now()));
        let exporter = Exporter::new(
            Arc::clone(&self.client),
            self.config.retry.clone(),
            self.config.pacing.clone(),
            cancel,
        );

        let quit_automatically =
            self.config.quit_automatically || self.frontend == Frontend::Headless;
        let mut handles = Vec::new();
        for id in 0..self.config.workers.exporters {
            handles.push(tokio::spawn(workers::export_worker(
                id,
                Arc::clone(&state),
                exporter.clone(),
                handle.clone(),
                self.config.pacing.clone(),
            )));
        }
        for id in 0..self.config.workers.downloaders {
            handles.push(tokio::spawn(workers::download_worker(
                workers::Downloader {
                    id,
                    state: Arc::clone(&state),
                    exporter: exporter.clone(),
                    handle: handle.clone(),
                    fs: Arc::clone(&self.fs),
                    pacing: self.config.pacing.clone(),
                    quit_automatically,
                },
            )));
        }
        // workers hold the only senders now; headless runs end once they all exit
        drop(handle);

        let model = program.run(self.frontend).await;
        state.complete();
        join_workers(handles).await;

        let model = model?;
        let stats = model.stats();
        let failures: Vec<Row> = model.failures().cloned().collect();
        info!(
            total = stats.total,
            downloaded = stats.downloaded,
            failed = stats.failed,
            "Export finished"
        );
        Ok(self.summary(tree_path, stats, failures))
    }

    fn summary(&self, tree_path: PathBuf, stats: Stats, failures: Vec<Row>) -> RunSummary {
        RunSummary {
            tree_path,
            stats,
            failures,
            elapsed: self.config.elapsed(),
        }
    }
}

/// Aggregate label shown under the file list
fn stats_formatter(started: Instant) -> StatsFormatter {
    Box::new(move |stats: &Stats| {
        format!(
            "total {} · downloaded {} · failed {} · remaining {} · {}",
            stats.total,
            stats.downloaded,
            stats.failed,
            stats.remaining,
            utils::format_duration(started.elapsed())
        )
    })
}

async fn join_workers(mut handles: Vec<JoinHandle<()>>) {
    let joined = tokio::time::timeout(
        WORKER_GRACE,
        futures::future::join_all(handles.iter_mut()),
    )
    .await;

    match joined {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(error = %e, "Worker panicked");
                    }
                }
            }
        }
        Err(_) => {
            warn!(
                grace_secs = WORKER_GRACE.as_secs(),
                "Workers still busy after cancellation, aborting"
            );
            for handle in &handles {
                handle.abort();
            }
        }
    }
}
