//! ratatui rendering of the progress model

use super::model::{ProgressModel, Row};
use super::program::StatsFormatter;
use crate::types::Status;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

const BAR_WIDTH: usize = 20;
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const HELP: &str = " q/Esc/Ctrl+C quit · ↑↓ j/k scroll · PgUp/PgDn page · Home/End jump";

pub(super) fn render(frame: &mut Frame, model: &mut ProgressModel, formatter: &StatsFormatter) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.size());

    // borders take two lines
    model.set_viewport(usize::from(chunks[0].height.saturating_sub(2)));
    let spinner = model.spinner_frame();
    let lines: Vec<Line> = model
        .visible_rows()
        .iter()
        .map(|row| row_line(row, spinner))
        .collect();

    let shown = lines.len();
    let total_rows = model.rows().len();
    let title = if shown == 0 {
        " Files ".to_string()
    } else {
        format!(
            " Files {}-{} of {} ",
            model.offset() + 1,
            model.offset() + shown,
            total_rows
        )
    };
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        chunks[0],
    );

    let stats = model.stats();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Total "))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(model.ratio())
        .label(formatter(&stats));
    frame.render_widget(gauge, chunks[1]);

    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn row_line(row: &Row, spinner: usize) -> Line<'static> {
    let (bar, percent) = if row.indeterminate {
        (
            format!("{:<width$}", SPINNER[spinner % SPINNER.len()], width = BAR_WIDTH),
            "   ?".to_string(),
        )
    } else {
        (
            progress_bar(row.progress),
            format!("{:>3}%", (row.progress * 100.0).round() as u32),
        )
    };

    let mut spans = vec![
        Span::styled(format!("{:<11} ", row.status.label()), status_style(row.status)),
        Span::raw(bar),
        Span::raw(format!(" {percent} ")),
        Span::raw(row.name.clone()),
    ];
    if let Some(message) = &row.message {
        let color = if row.status == Status::Failed {
            Color::Red
        } else {
            Color::DarkGray
        };
        spans.push(Span::styled(
            format!("  {message}"),
            Style::default().fg(color),
        ));
    }
    Line::from(spans)
}

fn progress_bar(ratio: f64) -> String {
    let filled = ((ratio * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn status_style(status: Status) -> Style {
    let color = match status {
        Status::Completed => Color::Green,
        Status::Failed => Color::Red,
        Status::Interrupted => Color::Yellow,
        Status::Downloading => Color::Cyan,
        Status::Exporting | Status::Exported | Status::Waiting => Color::Blue,
        Status::Added => Color::Gray,
    };
    let style = Style::default().fg(color);
    if status.is_terminal() {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn screen_text(model: &mut ProgressModel, width: u16, height: u16) -> String {
        let formatter: StatsFormatter = Box::new(|s| {
            format!(
                "total={} downloaded={} failed={}",
                s.total, s.downloaded, s.failed
            )
        });
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal
            .draw(|frame| render(frame, model, &formatter))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn renders_rows_and_aggregate_label() {
        let mut model = ProgressModel::new(2);
        model.add("dist/a.docx", "alpha");
        model.add("dist/b.xlsx", "beta");
        model.update("dist/a.docx", Some(1.0), Status::Downloading, None);
        model.update(
            "dist/b.xlsx",
            Some(0.1),
            Status::Failed,
            Some("export failed".into()),
        );

        let text = screen_text(&mut model, 100, 12);
        assert!(text.contains("alpha"));
        assert!(text.contains("completed"));
        assert!(text.contains("100%"));
        assert!(text.contains("export failed"));
        assert!(text.contains("total=2 downloaded=1 failed=1"));
    }

    #[test]
    fn viewport_follows_frame_height() {
        let mut model = ProgressModel::new(20);
        for i in 0..20 {
            model.add(format!("k{i}"), format!("file{i:02}"));
        }
        let text = screen_text(&mut model, 80, 10);
        // 10 lines minus gauge (3), help (1) and list borders (2)
        assert!(text.contains("file03"));
        assert!(!text.contains("file04"));
        assert!(text.contains("Files 1-4 of 20"));
    }

    #[test]
    fn bar_width_is_constant() {
        assert_eq!(progress_bar(0.0).chars().count(), BAR_WIDTH);
        assert_eq!(progress_bar(0.5).chars().filter(|c| *c == '█').count(), 10);
        assert_eq!(progress_bar(1.0).chars().count(), BAR_WIDTH);
    }
}
