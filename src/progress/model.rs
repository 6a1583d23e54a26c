//! Pure progress state, independent of any terminal

use crate::types::Status;
use std::collections::HashMap;

/// One tracked file
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Unique key (the file's local path)
    pub key: String,
    /// Display name
    pub name: String,
    /// Fraction done, within `[0, 1]`
    pub progress: f64,
    /// Size unknown; render a spinner instead of a bar
    pub indeterminate: bool,
    /// Current status
    pub status: Status,
    /// Last detail message (error text for failed rows)
    pub message: Option<String>,
}

/// Aggregate counters shown under the file list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Files in this run
    pub total: usize,
    /// Files written successfully
    pub downloaded: usize,
    /// Files that failed
    pub failed: usize,
    /// Files not finished yet
    pub remaining: usize,
}

/// Rows, their order and the scroll position
#[derive(Clone, Debug, Default)]
pub struct ProgressModel {
    rows: Vec<Row>,
    index: HashMap<String, usize>,
    expected: usize,
    offset: usize,
    viewport: usize,
    tick: usize,
}

impl ProgressModel {
    /// Model for a run that will register `expected` rows
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            viewport: 1,
            ..Default::default()
        }
    }

    /// Register a row; a key that already exists is left untouched
    pub fn add(&mut self, key: impl Into<String>, name: impl Into<String>) {
        let key = key.into();
        if self.index.contains_key(&key) {
            return;
        }
        self.index.insert(key.clone(), self.rows.len());
        self.rows.push(Row {
            key,
            name: name.into(),
            progress: 0.0,
            indeterminate: false,
            status: Status::Added,
            message: None,
        });
    }

    /// Apply an update to the row under `key`
    ///
    /// `progress >= 1.0` forces [`Status::Completed`]. Rows that already
    /// reached a terminal status ignore further updates. Returns the row when
    /// this update made it terminal.
    pub fn update(
        &mut self,
        key: &str,
        progress: Option<f64>,
        status: Status,
        message: Option<String>,
    ) -> Option<&Row> {
        let idx = *self.index.get(key)?;
        let row = &mut self.rows[idx];
        if row.status.is_terminal() {
            return None;
        }

        match progress {
            Some(p) => {
                row.progress = if p.is_finite() { p.clamp(0.0, 1.0) } else { row.progress };
                row.indeterminate = false;
            }
            None => row.indeterminate = true,
        }
        row.status = if row.progress >= 1.0 {
            Status::Completed
        } else {
            status
        };
        if row.status == Status::Completed {
            row.progress = 1.0;
            row.indeterminate = false;
        }
        if message.is_some() || row.status.is_terminal() {
            row.message = message;
        }

        let row = &self.rows[idx];
        row.status.is_terminal().then_some(row)
    }

    /// Mark every unfinished row as interrupted
    pub fn interrupt_unfinished(&mut self) {
        for row in &mut self.rows {
            if !row.status.is_terminal() {
                row.status = Status::Interrupted;
                row.indeterminate = false;
            }
        }
    }

    /// Rows in registration order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row under `key`
    pub fn row(&self, key: &str) -> Option<&Row> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Failed rows in registration order
    pub fn failures(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.status == Status::Failed)
    }

    /// Aggregate counters
    pub fn stats(&self) -> Stats {
        let total = self.expected.max(self.rows.len());
        let downloaded = self.count(Status::Completed);
        let failed = self.count(Status::Failed);
        Stats {
            total,
            downloaded,
            failed,
            remaining: total.saturating_sub(downloaded + failed),
        }
    }

    fn count(&self, status: Status) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    /// Whole-batch fraction done, failed rows counting as done
    pub fn ratio(&self) -> f64 {
        let total = self.expected.max(self.rows.len());
        if total == 0 {
            return 1.0;
        }
        let done: f64 = self
            .rows
            .iter()
            .map(|r| match r.status {
                Status::Completed | Status::Failed => 1.0,
                _ => r.progress,
            })
            .sum();
        (done / total as f64).clamp(0.0, 1.0)
    }

    /// True once every expected row has a terminal status
    pub fn all_terminal(&self) -> bool {
        self.rows.len() >= self.expected && self.rows.iter().all(|r| r.status.is_terminal())
    }

    /// Advance the spinner animation
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    /// Current spinner frame counter
    pub fn spinner_frame(&self) -> usize {
        self.tick
    }

    /// Set the number of visible rows, keeping the offset in range
    pub fn set_viewport(&mut self, height: usize) {
        self.viewport = height.max(1);
        self.offset = self.offset.min(self.max_offset());
    }

    /// First visible row
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rows currently inside the viewport
    pub fn visible_rows(&self) -> &[Row] {
        let end = (self.offset + self.viewport).min(self.rows.len());
        &self.rows[self.offset.min(end)..end]
    }

    fn max_offset(&self) -> usize {
        self.rows.len().saturating_sub(self.viewport)
    }

    /// Scroll by `delta` rows (negative scrolls up)
    pub fn scroll_by(&mut self, delta: isize) {
        let target = self.offset.saturating_add_signed(delta);
        self.offset = target.min(self.max_offset());
    }

    /// Scroll one viewport up
    pub fn page_up(&mut self) {
        self.scroll_by(-(self.viewport as isize));
    }

    /// Scroll one viewport down
    pub fn page_down(&mut self) {
        self.scroll_by(self.viewport as isize);
    }

    /// Jump to the first row
    pub fn scroll_home(&mut self) {
        self.offset = 0;
    }

    /// Jump to the last page
    pub fn scroll_end(&mut self) {
        self.offset = self.max_offset();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_update_lifecycle() {
        let mut model = ProgressModel::new(1);
        model.add("dist/a.docx", "a");
        assert_eq!(model.row("dist/a.docx").unwrap().status, Status::Added);

        assert!(model.update("dist/a.docx", Some(0.05), Status::Exporting, None).is_none());
        model.update("dist/a.docx", Some(0.5), Status::Downloading, Some("total=10, wrote=5".into()));
        let row = model.row("dist/a.docx").unwrap();
        assert_eq!(row.progress, 0.5);
        assert_eq!(row.message.as_deref(), Some("total=10, wrote=5"));

        let finished = model
            .update("dist/a.docx", Some(1.0), Status::Downloading, None)
            .unwrap();
        assert_eq!(finished.status, Status::Completed);
        assert!(model.all_terminal());
    }

    #[test]
    fn terminal_status_is_sticky() {
        let mut model = ProgressModel::new(1);
        model.add("k", "n");
        model.update("k", Some(0.1), Status::Failed, Some("boom".into()));
        assert!(model.update("k", Some(1.0), Status::Completed, None).is_none());
        let row = model.row("k").unwrap();
        assert_eq!(row.status, Status::Failed);
        assert_eq!(row.message.as_deref(), Some("boom"));
    }

    #[test]
    fn progress_is_clamped_and_nan_ignored() {
        let mut model = ProgressModel::new(1);
        model.add("k", "n");
        model.update("k", Some(0.3), Status::Downloading, None);
        model.update("k", Some(f64::NAN), Status::Downloading, None);
        assert_eq!(model.row("k").unwrap().progress, 0.3);
        model.update("k", Some(-2.0), Status::Downloading, None);
        assert_eq!(model.row("k").unwrap().progress, 0.0);
    }

    #[test]
    fn indeterminate_rows() {
        let mut model = ProgressModel::new(1);
        model.add("k", "n");
        model.update("k", None, Status::Downloading, None);
        assert!(model.row("k").unwrap().indeterminate);
        model.update("k", Some(1.0), Status::Downloading, None);
        let row = model.row("k").unwrap();
        assert!(!row.indeterminate);
        assert_eq!(row.status, Status::Completed);
    }

    #[test]
    fn stats_and_ratio() {
        let mut model = ProgressModel::new(4);
        for k in ["a", "b", "c"] {
            model.add(k, k);
        }
        model.update("a", Some(1.0), Status::Completed, None);
        model.update("b", Some(0.1), Status::Failed, Some("x".into()));
        model.update("c", Some(0.5), Status::Downloading, None);

        assert_eq!(
            model.stats(),
            Stats {
                total: 4,
                downloaded: 1,
                failed: 1,
                remaining: 2
            }
        );
        assert!((model.ratio() - 2.5 / 4.0).abs() < 1e-9);
        assert!(!model.all_terminal());
        assert_eq!(model.failures().count(), 1);
    }

    #[test]
    fn interrupt_marks_unfinished_only() {
        let mut model = ProgressModel::new(2);
        model.add("a", "a");
        model.add("b", "b");
        model.update("a", Some(1.0), Status::Completed, None);
        model.interrupt_unfinished();
        assert_eq!(model.row("a").unwrap().status, Status::Completed);
        assert_eq!(model.row("b").unwrap().status, Status::Interrupted);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut model = ProgressModel::new(0);
        assert!(model.update("missing", Some(1.0), Status::Completed, None).is_none());
        assert!(model.rows().is_empty());
    }

    #[test]
    fn scrolling_stays_in_bounds() {
        let mut model = ProgressModel::new(10);
        for i in 0..10 {
            model.add(format!("k{i}"), format!("n{i}"));
        }
        model.set_viewport(4);
        model.scroll_by(-1);
        assert_eq!(model.offset(), 0);
        model.page_down();
        assert_eq!(model.offset(), 4);
        model.page_down();
        assert_eq!(model.offset(), 6);
        assert_eq!(model.visible_rows().len(), 4);
        model.scroll_home();
        assert_eq!(model.visible_rows()[0].key, "k0");
        model.scroll_end();
        assert_eq!(model.visible_rows()[3].key, "k9");
        model.page_up();
        assert_eq!(model.offset(), 2);
    }
}
