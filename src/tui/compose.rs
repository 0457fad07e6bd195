//! Compose box: single-line input with reply banner and emoji palette.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::chat::{ChatView, EMOJI_PALETTE};

/// Draft line editor. The session owns the authoritative draft; this only
/// tracks the cursor so edits land in the right place.
#[derive(Default)]
pub struct ComposeState {
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
}

impl ComposeState {
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Insert a string at the cursor, e.g. a picked emoji.
    pub fn insert_str(&mut self, s: &str) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert_str(byte_pos, s);
        self.cursor_pos += s.chars().count();
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor_pos == 0 {
            return false;
        }
        let byte_pos = self.char_to_byte(self.cursor_pos);
        let prev_byte_pos = self.char_to_byte(self.cursor_pos - 1);
        self.input.drain(prev_byte_pos..byte_pos);
        self.cursor_pos -= 1;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor_pos >= self.input.chars().count() {
            return false;
        }
        let byte_pos = self.char_to_byte(self.cursor_pos);
        let next_byte_pos = self.char_to_byte(self.cursor_pos + 1);
        self.input.drain(byte_pos..next_byte_pos);
        true
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.input.chars().count();
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Path argument of an `/image <path>` command, if the input is one.
    pub fn image_command(&self) -> Option<&str> {
        self.input
            .trim()
            .strip_prefix("/image ")
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

/// Rows the compose box needs for the current view.
pub fn height(view: &ChatView) -> u16 {
    3 + u16::from(view.replying_to.is_some()) + u16::from(view.emoji_picker_open)
}

pub fn render(area: Rect, frame: &mut Frame, state: &ComposeState, view: &ChatView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Message ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let mut y = inner.y;
    let line_area = |y: u16| Rect::new(inner.x, y, inner.width, 1);

    if let Some(quote) = &view.replying_to {
        let line = Line::from(vec![
            Span::styled(" Replying to: ", Style::default().fg(Color::Cyan)),
            Span::styled(
                quote.replace('\n', " "),
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::ITALIC),
            ),
            Span::styled("  (Esc to cancel)", Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), line_area(y));
        y += 1;
    }

    if view.emoji_picker_open && y < inner.y + inner.height {
        let mut spans = vec![Span::raw(" ")];
        for (i, emoji) in EMOJI_PALETTE.iter().enumerate() {
            spans.push(Span::styled(
                format!("{}", i + 1),
                Style::default().fg(Color::DarkGray),
            ));
            spans.push(Span::raw(format!(" {}  ", emoji)));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), line_area(y));
        y += 1;
    }

    if y >= inner.y + inner.height {
        return;
    }
    let input_area = line_area(y);
    let display = compose_display_text(&state.input, state.cursor_pos, input_area.width as usize);

    let line = if state.input.is_empty() {
        Line::from(Span::styled(
            " Type a message...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(Color::White),
        ))
    };
    frame.render_widget(Paragraph::new(line), input_area);
    frame.set_cursor_position((input_area.x + 1 + display.cursor_offset as u16, input_area.y));
}

struct DisplayText {
    visible: String,
    /// Cursor offset within `visible`, in columns.
    cursor_offset: usize,
}

/// Visible slice of the input, scrolled horizontally so the cursor stays
/// on screen.
fn compose_display_text(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    let avail = width.saturating_sub(2);
    let chars: Vec<char> = input.chars().collect();
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    let col = |range: &[char]| UnicodeWidthStr::width(range.iter().collect::<String>().as_str());

    let mut start = 0;
    while start < cursor_pos && col(&chars[start..cursor_pos]) >= avail {
        start += 1;
    }

    let mut end = start;
    while end < chars.len() && col(&chars[start..=end]) <= avail {
        end += 1;
    }

    DisplayText {
        visible: chars[start..end].iter().collect(),
        cursor_offset: col(&chars[start..cursor_pos.min(chars.len())]),
    }
}
