//! Messages pane: the conversation log, oldest first.

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::chat::{MessageRow, RowContent};

/// Render `rows` into `area`. Without a selection the pane sticks to the
/// newest message.
pub fn render(area: Rect, buf: &mut Buffer, rows: &[MessageRow], selected: Option<usize>) {
    let block = Block::default()
        .borders(Borders::LEFT | Borders::RIGHT)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    if rows.is_empty() {
        let line = Line::from(Span::styled(
            " No messages yet. Say hello!",
            Style::default().fg(Color::DarkGray),
        ));
        Paragraph::new(line).render(inner, buf);
        return;
    }

    let (all_lines, ranges) = build_message_lines(rows, selected, inner.width as usize);
    let total_lines = all_lines.len();
    let visible_height = inner.height as usize;

    let scroll = compute_scroll(selected, &ranges, visible_height, total_lines);

    for (row, line) in all_lines.into_iter().skip(scroll).take(visible_height).enumerate() {
        let line_area = Rect::new(inner.x, inner.y + row as u16, inner.width, 1);
        Paragraph::new(line).render(line_area, buf);
    }

    if scroll > 0 {
        let cell = &mut buf[(inner.x + inner.width.saturating_sub(1), inner.y)];
        cell.set_char('^');
        cell.set_style(Style::default().fg(Color::DarkGray));
    }
}

/// Flat line buffer plus the line range each row occupies.
fn build_message_lines(
    rows: &[MessageRow],
    selected: Option<usize>,
    width: usize,
) -> (Vec<Line<'static>>, Vec<(usize, usize)>) {
    let mut lines = Vec::new();
    let mut ranges = Vec::with_capacity(rows.len());
    let body_width = width.saturating_sub(4).max(10);

    for (idx, row) in rows.iter().enumerate() {
        let start = lines.len();
        let is_selected = selected == Some(idx);
        let gutter = if is_selected {
            Span::styled("> ", Style::default().fg(Color::Yellow))
        } else {
            Span::raw("  ")
        };

        let sender_style = if row.mine {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        };
        let time = row.created_at.with_timezone(&Local).format("%H:%M");
        lines.push(Line::from(vec![
            gutter,
            Span::styled(row.sender.clone(), sender_style),
            Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
        ]));

        if let Some(quote) = &row.reply_quote {
            for part in wrap_text(quote, body_width.saturating_sub(2)) {
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled("│ ", Style::default().fg(Color::DarkGray)),
                    Span::styled(
                        part,
                        Style::default()
                            .fg(Color::Gray)
                            .add_modifier(Modifier::ITALIC),
                    ),
                ]));
            }
        }

        match &row.content {
            RowContent::Text(text) => {
                for part in wrap_text(text, body_width) {
                    lines.push(Line::from(vec![Span::raw("  "), Span::raw(part)]));
                }
            }
            RowContent::Image { url } => {
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled("[image] ", Style::default().fg(Color::Magenta)),
                    Span::styled(
                        url.clone(),
                        Style::default()
                            .fg(Color::Blue)
                            .add_modifier(Modifier::UNDERLINED),
                    ),
                ]));
            }
        }

        if let Some(marker) = row.seen_marker() {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(marker, Style::default().fg(Color::DarkGray)),
            ]));
        }

        lines.push(Line::from(""));
        ranges.push((start, lines.len()));
    }

    (lines, ranges)
}

/// Word-wrap on display width, hard-splitting words longer than a line.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        for word in line.split_whitespace() {
            let needed = if current.is_empty() {
                word.width()
            } else {
                current.width() + 1 + word.width()
            };
            if needed <= max_width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                continue;
            }
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            for c in word.chars() {
                if current.width() + c.to_string().width() > max_width {
                    result.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
        }
        result.push(current);
    }
    result
}

/// Scroll offset: keep the selected row visible, or pin to the bottom.
fn compute_scroll(
    selected: Option<usize>,
    ranges: &[(usize, usize)],
    visible_height: usize,
    total_lines: usize,
) -> usize {
    let max_scroll = total_lines.saturating_sub(visible_height);
    let Some((start, end)) = selected.and_then(|i| ranges.get(i).copied()) else {
        return max_scroll;
    };

    let scroll = if end - start >= visible_height {
        start
    } else {
        end.saturating_sub(visible_height)
    };
    scroll.min(max_scroll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_breaks_on_words() {
        assert_eq!(wrap_text("hello big world", 9), vec!["hello big", "world"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn test_scroll_pins_to_bottom_without_selection() {
        let ranges = vec![(0, 5), (5, 10), (10, 15)];
        assert_eq!(compute_scroll(None, &ranges, 6, 15), 9);
        assert_eq!(compute_scroll(None, &ranges, 20, 15), 0);
    }

    #[test]
    fn test_scroll_keeps_selection_visible() {
        let ranges = vec![(0, 5), (5, 10), (10, 15)];
        assert_eq!(compute_scroll(Some(0), &ranges, 6, 15), 0);
        assert_eq!(compute_scroll(Some(1), &ranges, 6, 15), 4);
        assert_eq!(compute_scroll(Some(2), &ranges, 6, 15), 9);
    }
}
