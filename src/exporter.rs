//! Export and download primitives used by the worker pools
//!
//! An [`Exporter`] turns a discovered node into a byte stream: structured
//! documents go through an asynchronous export job first (create, poll,
//! download the artifact), uploaded files are streamed directly. Every
//! remote call runs through the retry driver.

use crate::cloud::{CloudClient, CreateExportRequest, DownloadBody, fetch_data};
use crate::config::{PacingConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{DocumentNode, ExportResult, ExportedFile};
use crate::utils;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How an export job ended
#[derive(Debug)]
pub enum CheckOutcome {
    /// The artifact is ready for download
    Exported(ExportResult),
    /// The job failed, or polling gave up
    Failed(Error),
    /// The run was cancelled while polling
    Interrupted,
}

/// Export and download operations over a [`CloudClient`]
#[derive(Clone)]
pub struct Exporter {
    client: Arc<dyn CloudClient>,
    retry: RetryConfig,
    pacing: PacingConfig,
    cancel: CancellationToken,
}

impl Exporter {
    /// Exporter stopping its polls once `cancel` fires
    pub fn new(
        client: Arc<dyn CloudClient>,
        retry: RetryConfig,
        pacing: PacingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            retry,
            pacing,
            cancel,
        }
    }

    /// Start an export job for `node` and return its ticket
    pub async fn do_export(&self, node: &DocumentNode) -> Result<String> {
        let request = CreateExportRequest {
            file_extension: node.file_extension.clone(),
            token: node.token.clone(),
            doc_type: node.doc_type.as_str().to_string(),
        };
        let data = fetch_data(&self.retry, "create export task", |_| {
            self.client.export_create(request.clone())
        })
        .await?;

        if data.ticket.is_empty() {
            return Err(Error::remote(
                "create export task",
                0,
                "no ticket returned",
                None,
            ));
        }
        info!(token = %node.token, ticket = %data.ticket, "Export task created");
        Ok(data.ticket)
    }

    /// Poll the export job `ticket` until it finishes, fails or runs out of polls
    ///
    /// A random `poll_interval` pause precedes every poll; cancellation is
    /// checked after each pause.
    pub async fn check_export(&self, node: &DocumentNode, ticket: &str) -> CheckOutcome {
        for poll in 1..=self.pacing.max_export_polls {
            tokio::select! {
                _ = self.cancel.cancelled() => return CheckOutcome::Interrupted,
                _ = utils::pause(self.pacing.poll_interval) => {}
            }
            if self.cancel.is_cancelled() {
                return CheckOutcome::Interrupted;
            }

            let data = match fetch_data(&self.retry, "query export task", |_| {
                self.client.export_get(ticket, &node.token)
            })
            .await
            {
                Ok(data) => data,
                Err(e) => return CheckOutcome::Failed(e),
            };

            let task = data.result;
            match task.job_status {
                0 => {
                    info!(
                        token = %node.token,
                        file_token = %task.file_token,
                        size = task.file_size,
                        polls = poll,
                        "Export finished"
                    );
                    return CheckOutcome::Exported(ExportResult {
                        node: node.clone(),
                        exported: Some(ExportedFile {
                            file_token: task.file_token,
                            file_size: task.file_size,
                        }),
                    });
                }
                1 | 2 => {
                    debug!(token = %node.token, poll, status = task.job_status, "Export in progress");
                }
                status => {
                    return CheckOutcome::Failed(Error::remote(
                        "export document",
                        status,
                        task.job_error_msg,
                        None,
                    ));
                }
            }
        }

        CheckOutcome::Failed(Error::Timeout(format!(
            "export of {} did not finish: too many attempts",
            node.token
        )))
    }

    /// Stream an uploaded file; the size comes from `Content-Length`
    pub async fn download_directly(&self, token: &str) -> Result<DownloadBody> {
        with_retry(&self.retry, |_| self.client.drive_download(token))
            .await?
            .into_body("download file")
    }

    /// Stream the artifact of a finished export job
    pub async fn download_exported(&self, file_token: &str) -> Result<DownloadBody> {
        with_retry(&self.retry, |_| self.client.export_download(file_token))
            .await?
            .into_body("download exported file")
    }
}
