//! Chat page state and main event loop.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;

use super::compose::ComposeState;
use super::log_capture::LogTail;
use super::ui;
use crate::chat::{ChatSession, ChatView, SessionEvent, EMOJI_PALETTE};
use crate::platform::Platform;

/// How often captured log lines are picked up for the status bar.
const LOG_REFRESH: Duration = Duration::from_millis(250);

/// How long a log line stays in the status bar.
const LOG_LINGER: Duration = Duration::from_secs(5);

/// Palette index picked by digit key `c`, counting from 1.
fn palette_slot(c: char) -> Option<usize> {
    let slot = c.to_digit(10)? as usize;
    (1..=EMOJI_PALETTE.len()).contains(&slot).then(|| slot - 1)
}

pub struct App {
    pub should_exit: bool,
    session: ChatSession,
    pub compose: ComposeState,
    /// Id of the highlighted message, if any.
    selected: Option<String>,
    logs: LogTail,
    log_line: Option<(String, Instant)>,
}

impl App {
    pub fn new(session: ChatSession, logs: LogTail) -> Self {
        Self {
            should_exit: false,
            session,
            compose: ComposeState::default(),
            selected: None,
            logs,
            log_line: None,
        }
    }

    pub fn view(&self) -> ChatView {
        self.session.view()
    }

    pub fn selected_index(&self, view: &ChatView) -> Option<usize> {
        let id = self.selected.as_deref()?;
        view.rows.iter().position(|r| r.id == id)
    }

    pub fn last_log(&self) -> Option<&str> {
        self.log_line
            .as_ref()
            .filter(|(_, at)| at.elapsed() < LOG_LINGER)
            .map(|(line, _)| line.as_str())
    }

    fn refresh_log(&mut self) {
        let Some(latest) = self.logs.latest() else {
            return;
        };
        if self.log_line.as_ref().map(|(l, _)| l) != Some(&latest) {
            self.log_line = Some((latest, Instant::now()));
        }
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        if matches!(event, SessionEvent::Closed) {
            self.should_exit = true;
        }
        self.session.apply(event).await;

        if self.session.identity().is_none() {
            self.compose.clear();
            self.selected = None;
        }
    }

    async fn on_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => self.should_exit = true,
            _ if self.session.identity().is_none() => {}
            KeyCode::Char('l') if ctrl => {
                match self.session.sign_out().await {
                    Ok(()) => {
                        self.compose.clear();
                        self.selected = None;
                    }
                    Err(e) => tracing::error!("Sign out failed: {:#}", e),
                }
            }
            KeyCode::Char('e') if ctrl => self.session.toggle_emoji_picker(),
            KeyCode::Char('r') if ctrl => {
                if let Some(id) = self.selected.clone() {
                    self.session.stage_reply(&id);
                    self.selected = None;
                }
            }
            KeyCode::Char('u') if ctrl => {
                self.compose.clear();
                self.sync_draft();
            }
            KeyCode::Char(c)
                if self.session.view().emoji_picker_open && palette_slot(c).is_some() =>
            {
                if let Some(emoji) = palette_slot(c).and_then(|i| EMOJI_PALETTE.get(i)) {
                    self.compose.insert_str(emoji);
                    self.sync_draft();
                }
            }
            KeyCode::Char(c) if !ctrl => {
                self.compose.insert_char(c);
                self.sync_draft();
            }
            KeyCode::Backspace => {
                if self.compose.backspace() {
                    self.sync_draft();
                }
            }
            KeyCode::Delete => {
                if self.compose.delete() {
                    self.sync_draft();
                }
            }
            KeyCode::Left => self.compose.move_left(),
            KeyCode::Right => self.compose.move_right(),
            KeyCode::Home => self.compose.move_home(),
            KeyCode::End => self.compose.move_end(),
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Esc => self.escape(),
            KeyCode::Enter => self.submit().await,
            _ => {}
        }
    }

    fn sync_draft(&mut self) {
        self.session.update_draft(&self.compose.input);
    }

    fn move_selection(&mut self, step: isize) {
        let view = self.session.view();
        if view.rows.is_empty() {
            return;
        }
        let last = view.rows.len() - 1;
        let next = match (self.selected_index(&view), step < 0) {
            (None, true) => Some(last),
            (None, false) => None,
            (Some(0), true) => Some(0),
            (Some(i), true) => Some(i - 1),
            (Some(i), false) if i == last => None,
            (Some(i), false) => Some(i + 1),
        };
        self.selected = next.map(|i| view.rows[i].id.clone());
    }

    /// Close the picker, then drop the reply target, then the notice, then
    /// the selection.
    fn escape(&mut self) {
        let view = self.session.view();
        if view.emoji_picker_open {
            self.session.toggle_emoji_picker();
        } else if view.replying_to.is_some() {
            self.session.clear_reply();
        } else if view.notice.is_some() {
            self.session.dismiss_notice();
        } else {
            self.selected = None;
        }
    }

    async fn submit(&mut self) {
        if let Some(path) = self.compose.image_command().map(String::from) {
            self.send_image(&path).await;
            return;
        }

        // Failures are already on the notice line; the draft stays put.
        if let Ok(Some(_)) = self.session.send_message().await {
            self.compose.clear();
        }
    }

    async fn send_image(&mut self, path: &str) {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Cannot read {}: {}", path, e);
                return;
            }
        };
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        if self.session.send_image(bytes, &name).await.is_ok() {
            self.compose.clear();
            self.sync_draft();
        }
    }
}

/// Run the chat page until the user quits.
pub async fn run(platform: Platform, logs: LogTail) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, platform, logs).await;
    ratatui::restore();
    result
}

async fn run_app(terminal: &mut DefaultTerminal, platform: Platform, logs: LogTail) -> Result<()> {
    let mut app = App::new(ChatSession::new(platform), logs);
    let mut events = EventStream::new();
    let mut log_tick = tokio::time::interval(LOG_REFRESH);

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, &app))?;

        tokio::select! {
            event = app.session.next_event() => app.on_session_event(event).await,
            input = events.next() => match input {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => app.on_key(key).await,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => app.should_exit = true,
            },
            _ = log_tick.tick() => app.refresh_log(),
        }
    }

    app.session.close();
    Ok(())
}
