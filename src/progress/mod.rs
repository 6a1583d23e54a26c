//! Live multi-file progress
//!
//! Workers talk to the progress program through a [`ProgressHandle`]; every
//! call becomes a [`Message`] delivered to the single task that owns the
//! [`ProgressModel`], so UI mutations are serialized without locks.
//!
//! ```no_run
//! use feishu_export::progress::{Frontend, ProgressProgram};
//! use feishu_export::types::Status;
//!
//! # async fn example() -> feishu_export::Result<()> {
//! let (program, handle) = ProgressProgram::new(1, Box::new(|s| format!("{}/{}", s.downloaded, s.total)));
//!
//! handle.add("dist/a.docx", "a");
//! handle.update("dist/a.docx", 1.0, Status::Completed);
//! handle.quit();
//!
//! let model = program.run(Frontend::Headless).await?;
//! assert_eq!(model.stats().downloaded, 1);
//! # Ok(())
//! # }
//! ```

mod model;
mod program;
mod view;

pub use model::{ProgressModel, Row, Stats};
pub use program::{Frontend, ProgressProgram, StatsFormatter};

use crate::types::Status;
use tokio::sync::mpsc;

/// Instruction for the progress program
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Register a row
    Add {
        /// Row key
        key: String,
        /// Display name
        name: String,
    },
    /// Change a row
    Update {
        /// Row key
        key: String,
        /// New fraction, `None` for an indeterminate size
        progress: Option<f64>,
        /// New status
        status: Status,
        /// Optional detail
        message: Option<String>,
    },
    /// Leave the program
    Quit,
}

/// Cloneable sender half of the progress program
///
/// Sends never block; messages sent after the program stopped are dropped.
#[derive(Clone, Debug)]
pub struct ProgressHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ProgressHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            tracing::trace!("Progress program already stopped");
        }
    }

    /// Register a new row with status `Added` and progress 0
    pub fn add(&self, key: impl Into<String>, name: impl Into<String>) {
        self.send(Message::Add {
            key: key.into(),
            name: name.into(),
        });
    }

    /// Move a row to `status` at `progress`
    pub fn update(&self, key: impl Into<String>, progress: f64, status: Status) {
        self.send(Message::Update {
            key: key.into(),
            progress: Some(progress),
            status,
            message: None,
        });
    }

    /// [`ProgressHandle::update`] with a detail message
    pub fn update_with_message(
        &self,
        key: impl Into<String>,
        progress: f64,
        status: Status,
        message: impl Into<String>,
    ) {
        self.send(Message::Update {
            key: key.into(),
            progress: Some(progress),
            status,
            message: Some(message.into()),
        });
    }

    /// Update a row whose size is unknown
    pub fn update_indeterminate(
        &self,
        key: impl Into<String>,
        status: Status,
        message: impl Into<String>,
    ) {
        self.send(Message::Update {
            key: key.into(),
            progress: None,
            status,
            message: Some(message.into()),
        });
    }

    /// Ask the program to stop; returns immediately
    pub fn quit(&self) {
        self.send(Message::Quit);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_sends_messages_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ProgressHandle::new(tx);
        handle.add("k", "name");
        handle.update_with_message("k", 0.5, Status::Downloading, "total=2, wrote=1");
        handle.update_indeterminate("k", Status::Downloading, "wrote=7");
        handle.quit();

        assert_eq!(
            rx.try_recv().unwrap(),
            Message::Add {
                key: "k".into(),
                name: "name".into()
            }
        );
        match rx.try_recv().unwrap() {
            Message::Update {
                progress, message, ..
            } => {
                assert_eq!(progress, Some(0.5));
                assert_eq!(message.as_deref(), Some("total=2, wrote=1"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            Message::Update { progress: None, .. }
        ));
        assert_eq!(rx.try_recv().unwrap(), Message::Quit);
    }

    #[test]
    fn sending_after_close_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ProgressHandle::new(tx);
        handle.add("k", "n");
        handle.quit();
    }
}
