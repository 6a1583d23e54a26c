//! Streaming file writer with progress reporting
//!
//! [`ProgressWriter`] wraps any [`AsyncWrite`] and reports every chunk to the
//! progress program. Progress is mapped onto `[walked, 1)`: the first
//! `walked` share of the bar belongs to the phases that ran before the
//! download started.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::progress::ProgressHandle;
use crate::types::Status;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Highest fraction reported while bytes are still flowing
///
/// Reaching 1.0 would mark the row completed before the file is closed.
const IN_FLIGHT_CAP: f64 = 0.99;

/// [`AsyncWrite`] adapter that counts bytes and emits progress updates
pub struct ProgressWriter<W> {
    inner: W,
    key: String,
    total: Option<u64>,
    walked: f64,
    wrote: u64,
    handle: ProgressHandle,
}

impl<W> ProgressWriter<W> {
    /// Wrap `inner`; `total` is the expected size, if known
    pub fn new(
        inner: W,
        key: impl Into<String>,
        total: Option<u64>,
        walked: f64,
        handle: ProgressHandle,
    ) -> Self {
        Self {
            inner,
            key: key.into(),
            total: total.filter(|t| *t > 0),
            walked: walked.clamp(0.0, 1.0),
            wrote: 0,
            handle,
        }
    }

    /// Bytes written so far
    pub fn wrote(&self) -> u64 {
        self.wrote
    }

    /// Current fraction, `walked + wrote/total * (1 - walked)`
    ///
    /// Stays at `walked` when the size is unknown.
    pub fn progress(&self) -> f64 {
        match self.total {
            Some(total) => {
                let share = self.wrote as f64 / total as f64;
                (self.walked + share * (1.0 - self.walked)).clamp(self.walked, IN_FLIGHT_CAP)
            }
            None => self.walked,
        }
    }

    fn report(&self) {
        match self.total {
            Some(total) => self.handle.update_with_message(
                self.key.clone(),
                self.progress(),
                Status::Downloading,
                format!("total={}, wrote={}", total, self.wrote),
            ),
            None => self.handle.update_indeterminate(
                self.key.clone(),
                Status::Downloading,
                format!("wrote={}", self.wrote),
            ),
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            if n > 0 {
                self.wrote += n as u64;
                self.report();
            }
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Result of [`stream_to_file`]
#[derive(Debug)]
pub struct WriteOutcome {
    /// Bytes written before the stream ended or failed
    pub wrote: u64,
    /// Last reported fraction
    pub progress: f64,
    /// First of the copy error and the close error
    pub result: Result<()>,
}

/// Copy `reader` into a fresh file at `path`, reporting progress under `path`'s key
///
/// Parent directories are created first. The file is always closed; the
/// copy error wins over the close error.
pub async fn stream_to_file<R>(
    fs: &dyn FileSystem,
    path: &Path,
    reader: &mut R,
    total: Option<u64>,
    walked: f64,
    handle: &ProgressHandle,
) -> WriteOutcome
where
    R: AsyncRead + Unpin + ?Sized,
{
    let file = match open(fs, path).await {
        Ok(file) => file,
        Err(e) => {
            return WriteOutcome {
                wrote: 0,
                progress: walked,
                result: Err(e),
            };
        }
    };

    let key = path.display().to_string();
    let mut writer = ProgressWriter::new(file, key, total, walked, handle.clone());
    let copied = tokio::io::copy(reader, &mut writer).await;
    let closed = writer.shutdown().await;

    let result = match (copied, closed) {
        (Err(e), _) | (Ok(_), Err(e)) => Err(e.into()),
        (Ok(_), Ok(())) => Ok(()),
    };
    WriteOutcome {
        wrote: writer.wrote(),
        progress: writer.progress(),
        result,
    }
}

async fn open(fs: &dyn FileSystem, path: &Path) -> Result<crate::fs::FileWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.create_dir_all(parent).await?;
    }
    fs.create(path).await
}
