//! Exporter and downloader worker loops

use super::TaskState;
use crate::cloud::DownloadBody;
use crate::config::PacingConfig;
use crate::error::Result;
use crate::exporter::{CheckOutcome, Exporter};
use crate::fs::FileSystem;
use crate::progress::ProgressHandle;
use crate::types::{DocumentNode, ExportResult, Status};
use crate::utils;
use crate::writer::stream_to_file;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress landmarks reported before the byte stream starts
mod landmark {
    pub const EXPORTING: f64 = 0.05;
    pub const EXPORT_FAILED: f64 = 0.10;
    pub const EXPORTED: f64 = 0.15;
    pub const DOWNLOAD_FAILED: f64 = 0.18;
    pub const DOWNLOADING: f64 = 0.20;
}

fn row_key(node: &DocumentNode) -> String {
    node.file_path.display().to_string()
}

fn display_name(node: &DocumentNode) -> String {
    node.file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| node.name.clone())
}

/// Claim nodes until none are left or the run is cancelled
pub(super) async fn export_worker(
    id: usize,
    state: Arc<TaskState>,
    exporter: Exporter,
    handle: ProgressHandle,
    pacing: PacingConfig,
) {
    debug!(worker = id, "Exporter started");
    loop {
        if state.is_completed() {
            break;
        }
        let Some(node) = state.claim().cloned() else {
            break;
        };
        let key = row_key(&node);
        handle.add(&key, display_name(&node));

        if node.download_directly {
            let item = ExportResult {
                node,
                exported: None,
            };
            if !state.enqueue(item).await {
                break;
            }
            continue;
        }

        let ticket = match exporter.do_export(&node).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(token = %node.token, error = %e, "Could not create export task");
                handle.update_with_message(&key, landmark::EXPORTING, Status::Failed, e.single_line());
                state.finish_one();
                continue;
            }
        };
        handle.update(&key, landmark::EXPORTING, Status::Exporting);

        match exporter.check_export(&node, &ticket).await {
            CheckOutcome::Exported(result) => {
                handle.update(&key, landmark::EXPORTED, Status::Exported);
                tokio::select! {
                    _ = utils::pause(pacing.settle_pause) => {}
                    _ = state.cancel.cancelled() => break,
                }
                handle.update(&key, landmark::EXPORTED, Status::Waiting);
                if !state.enqueue(result).await {
                    break;
                }
            }
            CheckOutcome::Failed(e) => {
                warn!(token = %node.token, error = %e, "Export failed");
                handle.update_with_message(
                    &key,
                    landmark::EXPORT_FAILED,
                    Status::Failed,
                    e.single_line(),
                );
                state.finish_one();
            }
            CheckOutcome::Interrupted => break,
        }
    }
    debug!(worker = id, "Exporter stopped");
}

/// Everything a downloader worker needs
pub(super) struct Downloader {
    pub id: usize,
    pub state: Arc<TaskState>,
    pub exporter: Exporter,
    pub handle: ProgressHandle,
    pub fs: Arc<dyn FileSystem>,
    pub pacing: PacingConfig,
    pub quit_automatically: bool,
}

/// Drain the queue until every item finished or the run is cancelled
pub(super) async fn download_worker(worker: Downloader) {
    let Downloader {
        id,
        state,
        exporter,
        handle,
        fs,
        pacing,
        quit_automatically,
    } = worker;
    debug!(worker = id, "Downloader started");

    loop {
        if state.is_completed() {
            break;
        }
        match state.dequeue(pacing.idle_poll).await {
            Some(item) => {
                let saved = fetch(&item, &exporter, fs.as_ref(), &handle).await;
                if saved && !state.is_completed() {
                    utils::pause(pacing.settle_pause).await;
                }
                state.finish_one();
            }
            None if state.remaining() <= 0 => {
                if quit_automatically {
                    info!(worker = id, "All files finished, leaving progress display");
                    utils::pause(pacing.quit_pause).await;
                    handle.quit();
                }
                break;
            }
            None => {}
        }
    }
    debug!(worker = id, "Downloader stopped");
}

/// Download one queued item and report its terminal row status
///
/// Returns whether the file was saved.
async fn fetch(
    item: &ExportResult,
    exporter: &Exporter,
    fs: &dyn FileSystem,
    handle: &ProgressHandle,
) -> bool {
    let node = &item.node;
    let key = row_key(node);

    let (body, size) = match open_stream(item, exporter).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!(token = %node.token, error = %e, "Could not start download");
            handle.update_with_message(
                &key,
                landmark::DOWNLOAD_FAILED,
                Status::Failed,
                e.single_line(),
            );
            return false;
        }
    };
    handle.update(&key, landmark::DOWNLOADING, Status::Downloading);

    let mut reader = body.reader;
    let outcome = stream_to_file(
        fs,
        &node.file_path,
        &mut reader,
        size,
        landmark::DOWNLOADING,
        handle,
    )
    .await;

    match outcome.result {
        Ok(()) => {
            info!(
                path = %node.file_path.display(),
                size = %utils::format_bytes(outcome.wrote),
                "Saved"
            );
            handle.update(&key, 1.0, Status::Completed);
            true
        }
        Err(e) => {
            warn!(path = %node.file_path.display(), error = %e, "Download failed");
            handle.update_with_message(&key, outcome.progress, Status::Failed, e.single_line());
            false
        }
    }
}

/// Open the byte stream of an item together with its expected size
async fn open_stream(
    item: &ExportResult,
    exporter: &Exporter,
) -> Result<(DownloadBody, Option<u64>)> {
    match &item.exported {
        None => {
            let body = exporter.download_directly(&item.node.token).await?;
            let size = body.content_length;
            Ok((body, size))
        }
        Some(file) => {
            let body = exporter.download_exported(&file.file_token).await?;
            let size = Some(file.file_size)
                .filter(|s| *s > 0)
                .or(body.content_length);
            Ok((body, size))
        }
    }
}
