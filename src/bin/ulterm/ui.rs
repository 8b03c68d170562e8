//! `ratatui` front-end: editor | device pane, command line, status line, usage bar.

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::SetTitle;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use ulterm::log_debug;
use ulterm::session::readout::{status_line, usage_line, UsageLevel};
use ulterm::terminal_restore::TerminalRestoreGuard;
use unicode_width::UnicodeWidthStr;

use crate::app::{App, Focus};

const FRAME_POLL: Duration = Duration::from_millis(50);
const COMMAND_PROMPT: &str = "cmd> ";

const BORDER_COLOR: Color = Color::Rgb(120, 170, 255);
const TITLE_COLOR: Color = Color::Rgb(150, 195, 255);
const DIM_BORDER: Color = Color::Rgb(70, 90, 130);
const OUTPUT_TEXT: Color = Color::Rgb(210, 205, 200);
const INPUT_TEXT: Color = Color::Rgb(255, 220, 100);
const STATUS_TEXT: Color = Color::Rgb(160, 160, 170);

/// Configure the terminal, run the drawing loop, and tear everything down.
pub(crate) fn run_app(app: &mut App) -> Result<()> {
    let terminal_guard = TerminalRestoreGuard::new();
    let mut stdout = io::stdout();
    terminal_guard.enter(&mut stdout, &format!("uLisp on {}", app.port()))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app_loop(&mut terminal, app);

    drop(terminal);
    terminal_guard.restore();
    result
}

fn app_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    terminal.draw(|frame| draw(frame, app))?;
    loop {
        let mut should_draw = app.drain_events();
        if let Some(title) = app.take_title() {
            execute!(terminal.backend_mut(), SetTitle(title))?;
        }

        if event::poll(FRAME_POLL)? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    app.handle_key(key);
                    should_draw = true;
                }
                Event::Resize(_, _) => should_draw = true,
                _ => {}
            }
        }

        if app.should_close() {
            log_debug("UI closing");
            return Ok(());
        }
        if should_draw {
            terminal.draw(|frame| draw(frame, app))?;
        }
    }
}

fn titled_block(title: &str, focused: bool) -> Block<'_> {
    let border = if focused { BORDER_COLOR } else { DIM_BORDER };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .title(Span::styled(
            title,
            Style::default()
                .fg(TITLE_COLOR)
                .add_modifier(Modifier::BOLD),
        ))
}

fn usage_color(level: UsageLevel) -> Color {
    match level {
        UsageLevel::Low => Color::Green,
        UsageLevel::Medium => Color::Yellow,
        UsageLevel::High => Color::Red,
    }
}

/// Render one frame from the current app state.
pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.size());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    draw_editor(frame, app, panes[0]);
    draw_output(frame, app, panes[1]);
    draw_command_line(frame, app, rows[1]);

    let session = app.session();
    let width = rows[2].width as usize;
    let left = app.notice().unwrap_or(&session.status_text);
    let status = status_line(left, &session.right_status_text, width);
    frame.render_widget(
        Paragraph::new(status).style(Style::default().fg(STATUS_TEXT)),
        rows[2],
    );

    let usage = usage_line(&session, rows[3].width as usize);
    let usage_style = Style::default().fg(usage_color(usage.level));
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(usage.prefix, Style::default().fg(STATUS_TEXT)),
            Span::styled(usage.bar, usage_style),
            Span::styled(usage.suffix, Style::default().fg(STATUS_TEXT)),
        ])),
        rows[3],
    );
}

fn draw_editor(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let focused = app.focus() == Focus::Editor;
    let composition = app.composition();
    let inner_height = area.height.saturating_sub(2) as usize;
    let lines: Vec<&str> = composition.split('\n').collect();
    let skip = lines.len().saturating_sub(inner_height);
    let text = Text::from(
        lines[skip..]
            .iter()
            .map(|line| Line::from(*line))
            .collect::<Vec<_>>(),
    );
    frame.render_widget(
        Paragraph::new(text)
            .block(titled_block(" Editor (Ctrl+R runs) ", focused))
            .style(Style::default().fg(INPUT_TEXT)),
        area,
    );
    if focused {
        let last = lines.last().copied().unwrap_or_default();
        let inner_width = area.width.saturating_sub(2);
        let col = (last.width().min(u16::MAX as usize) as u16).min(inner_width);
        let row = (lines.len() - skip).saturating_sub(1) as u16;
        frame.set_cursor(area.x + 1 + col, area.y + 1 + row);
    }
}

fn draw_output(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let pane = app.pane();
    let inner_height = area.height.saturating_sub(2) as usize;
    let text = Text::from(
        pane.visible(inner_height)
            .map(|line| Line::from(line.as_str()))
            .collect::<Vec<_>>(),
    );
    let title = if pane.scroll() > 0 {
        format!(" {} (scrolled {}) ", app.port(), pane.scroll())
    } else {
        format!(" {} ", app.port())
    };
    frame.render_widget(
        Paragraph::new(text)
            .block(titled_block(&title, false))
            .style(Style::default().fg(OUTPUT_TEXT)),
        area,
    );
}

fn draw_command_line(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let focused = app.focus() == Focus::CommandLine;
    let prompt_style = if focused {
        Style::default().fg(TITLE_COLOR).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DIM_BORDER)
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(COMMAND_PROMPT, prompt_style),
            Span::styled(app.input(), Style::default().fg(INPUT_TEXT)),
        ])),
        area,
    );
    if focused {
        let offset = (COMMAND_PROMPT.width() + app.input().width()).min(u16::MAX as usize) as u16;
        frame.set_cursor(area.x + offset.min(area.width.saturating_sub(1)), area.y);
    }
}
