use super::model::{ProgressModel, Row, Stats};
use super::{Message, ProgressHandle, view};
use crate::error::Result;
use crate::types::Status;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::{Stream, StreamExt};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Renders the aggregate label under the file list
pub type StatsFormatter = Box<dyn Fn(&Stats) -> String + Send>;

/// Redraw interval while nothing else happens (drives the spinner)
const TICK: Duration = Duration::from_millis(100);

/// Where the program renders
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frontend {
    /// Full-screen ratatui display reading keys from the terminal
    Terminal,
    /// No rendering; finished rows are logged
    Headless,
}

/// Owner of the progress model
pub struct ProgressProgram {
    rx: mpsc::UnboundedReceiver<Message>,
    model: ProgressModel,
    formatter: StatsFormatter,
}

impl ProgressProgram {
    /// Program expecting `expected` rows, plus the handle workers send through
    pub fn new(expected: usize, formatter: StatsFormatter) -> (Self, ProgressHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let program = Self {
            rx,
            model: ProgressModel::new(expected),
            formatter,
        };
        (program, ProgressHandle::new(tx))
    }

    /// Run until [`ProgressHandle::quit`] or a quit key
    ///
    /// The headless front-end also stops once every handle is dropped; the
    /// terminal front-end stays up until the user leaves. Rows still
    /// unfinished at that point are marked interrupted. The final model is
    /// returned for reporting.
    pub async fn run(mut self, frontend: Frontend) -> Result<ProgressModel> {
        match frontend {
            Frontend::Terminal => self.run_terminal().await?,
            Frontend::Headless => self.run_headless().await,
        }
        self.model.interrupt_unfinished();
        Ok(self.model)
    }

    async fn run_headless(&mut self) {
        while let Some(message) = self.rx.recv().await {
            if self.apply(message) {
                break;
            }
        }
    }

    async fn run_terminal(&mut self) -> Result<()> {
        let mut screen = TerminalGuard::enter()?;
        let terminal = &mut screen.terminal;
        self.drive(EventStream::new(), |model, formatter| {
            terminal.draw(|frame| view::render(frame, model, formatter))?;
            Ok(())
        })
        .await
    }

    /// Interactive loop: redraw, apply messages and keys until a quit
    ///
    /// Dropping every handle does not end the loop; only a quit message, a
    /// quit key or the end of `events` does.
    async fn drive<S, D>(&mut self, events: S, mut draw: D) -> Result<()>
    where
        S: Stream<Item = io::Result<Event>>,
        D: FnMut(&mut ProgressModel, &StatsFormatter) -> Result<()>,
    {
        let mut events = std::pin::pin!(events);
        let mut tick = tokio::time::interval(TICK);
        let mut senders_closed = false;

        loop {
            draw(&mut self.model, &self.formatter)?;

            tokio::select! {
                message = self.rx.recv(), if !senders_closed => match message {
                    Some(message) => {
                        if self.apply(message) || self.drain() {
                            break;
                        }
                    }
                    None => {
                        senders_closed = true;
                        info!("All workers stopped, press q to leave");
                    }
                },
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if handle_key(&mut self.model, key) {
                            info!("Quit requested from keyboard");
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },
                _ = tick.tick() => self.model.tick(),
            }
        }
        Ok(())
    }

    /// Apply everything already queued; true when a quit was among it
    fn drain(&mut self) -> bool {
        while let Ok(message) = self.rx.try_recv() {
            if self.apply(message) {
                return true;
            }
        }
        false
    }

    fn apply(&mut self, message: Message) -> bool {
        match message {
            Message::Add { key, name } => self.model.add(key, name),
            Message::Update {
                key,
                progress,
                status,
                message,
            } => {
                if let Some(row) = self.model.update(&key, progress, status, message) {
                    log_finished(row);
                }
            }
            Message::Quit => return true,
        }
        false
    }
}

fn log_finished(row: &Row) {
    match row.status {
        Status::Failed => warn!(
            file = %row.key,
            error = row.message.as_deref().unwrap_or_default(),
            "Failed"
        ),
        status => info!(file = %row.key, %status, "Finished"),
    }
}

/// Apply a key press; true when it asks to quit
fn handle_key(model: &mut ProgressModel, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Up | KeyCode::Char('k') => model.scroll_by(-1),
        KeyCode::Down | KeyCode::Char('j') => model.scroll_by(1),
        KeyCode::PageUp => model.page_up(),
        KeyCode::PageDown => model.page_down(),
        KeyCode::Home => model.scroll_home(),
        KeyCode::End => model.scroll_end(),
        _ => {}
    }
    false
}

/// Raw mode plus alternate screen, restored on drop
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}
