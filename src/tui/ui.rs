//! Screen layout for the chat page.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::app::App;
use super::{compose, messages};
use crate::chat::ChatView;

const KEY_HINTS: &str =
    "Enter send | ^E emoji | Up/Down select | ^R reply | /image <path> | ^L sign out | ^Q quit";

pub fn render(frame: &mut Frame, app: &App) {
    let view = app.view();
    let area = frame.area();

    let [header_area, partner_area, main_area, compose_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(compose::height(&view)),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), &view);
    render_status(status_area, frame.buffer_mut(), app, &view);

    if view.loading {
        render_placeholder(main_area, frame.buffer_mut(), "Loading...");
        return;
    }
    if !view.signed_in {
        render_placeholder(
            main_area,
            frame.buffer_mut(),
            "Not signed in. Quit and run 'duochat login' first.",
        );
        return;
    }

    render_partner(partner_area, frame.buffer_mut(), &view);
    messages::render(
        main_area,
        frame.buffer_mut(),
        &view.rows,
        app.selected_index(&view),
    );
    compose::render(compose_area, frame, &app.compose, &view);
}

fn render_header(area: Rect, buf: &mut Buffer, view: &ChatView) {
    let title = " duochat";
    let me = view
        .me
        .as_deref()
        .map(|name| format!("{} ", name))
        .unwrap_or_default();
    let padding = (area.width as usize).saturating_sub(title.width() + me.width());

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(me, Style::default().fg(Color::Cyan)),
    ]);
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_partner(area: Rect, buf: &mut Buffer, view: &ChatView) {
    let line = match &view.partner {
        Some(partner) => {
            let mut spans = vec![
                Span::styled(
                    format!(" ({}) ", partner.initial),
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" {}", partner.title()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ];
            if partner.typing {
                spans.push(Span::styled(
                    "  Typing...",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::ITALIC),
                ));
            }
            Line::from(spans)
        }
        None => Line::from(Span::styled(
            " Waiting for someone else to sign in...",
            Style::default().fg(Color::DarkGray),
        )),
    };
    Paragraph::new(line).render(area, buf);
}

fn render_placeholder(area: Rect, buf: &mut Buffer, text: &str) {
    let [_, middle, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .areas(area);
    Paragraph::new(Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Gray),
    )))
    .centered()
    .render(middle, buf);
}

/// Notice first, then the newest log line, then key hints.
fn render_status(area: Rect, buf: &mut Buffer, app: &App, view: &ChatView) {
    let line = if let Some(notice) = &view.notice {
        Line::from(Span::styled(
            format!(" {} ", notice),
            Style::default().fg(Color::Red),
        ))
    } else if let Some(log) = app.last_log() {
        Line::from(Span::styled(
            format!(" {}", log),
            Style::default().fg(Color::Gray),
        ))
    } else {
        Line::from(Span::styled(
            format!(" {}", KEY_HINTS),
            Style::default().fg(Color::Gray),
        ))
    };
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
