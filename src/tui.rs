//! Terminal user interface for crash-monitor

use crate::app::{App, Mode};
use crate::record::Severity;
use crate::state::Message;
use crate::view::{self, RenderableRow, TableBody};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use tracing::info;

/// Run the TUI
pub async fn run(mut app: App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.start().await;

    // Main loop
    let result = run_loop(&mut terminal, &mut app).await;

    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    info!("Dashboard closed");
    result
}

/// Main event loop
async fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.pump();
        app.tick();

        terminal.draw(|f| draw(f, app))?;

        // Short poll keeps feed deliveries flowing between key presses
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.mode() {
                        Mode::Normal => handle_normal_mode(app, key),
                        Mode::EditMin | Mode::EditMax => handle_edit_mode(app, key),
                    }
                }
            }
        } else {
            tokio::task::yield_now().await;
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// Draw the UI
fn draw(f: &mut Frame, app: &App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(3), // Summary
            Constraint::Length(3), // Filters
            Constraint::Min(5),    // Table
            Constraint::Length(1), // Help
        ])
        .split(size);

    draw_header(f, app, chunks[0]);
    draw_summary(f, app, chunks[1]);
    draw_filters(f, app, chunks[2]);
    draw_table(f, app, chunks[3]);
    draw_help(f, app, chunks[4]);

    if let Some(toast) = app.state().toast() {
        draw_toast(f, &toast.text, size);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let header = Line::from(vec![
        Span::styled(
            " crash-monitor ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ Source: "),
        Span::styled(app.source_name(), Style::default().fg(Color::Yellow)),
    ]);

    f.render_widget(Paragraph::new(header), area);
}

fn draw_summary(f: &mut Frame, app: &App, area: Rect) {
    let s = view::summary(app.state());

    let status_style = if s.status.starts_with("Error") || s.status.starts_with("Real-time") {
        Style::default().fg(Color::Red)
    } else if s.status == "Connected" {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let mut spans = vec![
        Span::raw(" Records: "),
        Span::styled(
            s.total.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" / {}", s.buffered),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" │ Last update: "),
        Span::raw(s.last_update.unwrap_or_else(|| "--".to_string())),
        Span::raw(" │ Status: "),
        Span::styled(s.status, status_style),
    ];
    if let Some(feed) = s.feed {
        spans.push(Span::raw(" │ Feed: "));
        spans.push(Span::styled(feed, Style::default().fg(Color::Magenta)));
    }
    if s.paused {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(
            "PAUSED",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    }

    let summary = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(" Summary ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(summary, area);
}

fn draw_filters(f: &mut Frame, app: &App, area: Rect) {
    let inputs = app.state().inputs();

    let field = |label: &'static str, value: &str, editing: bool| -> Vec<Span<'static>> {
        let shown = if value.is_empty() && !editing {
            "any".to_string()
        } else if editing {
            format!("{}▌", value)
        } else {
            value.to_string()
        };
        let style = if editing {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::White)
        };
        vec![Span::raw(label), Span::styled(shown, style)]
    };

    let mut spans = vec![Span::raw(" ")];
    let editing_min = app.mode() == Mode::EditMin;
    let editing_max = app.mode() == Mode::EditMax;
    spans.extend(field(
        "Min: ",
        if editing_min { app.edit_buffer() } else { inputs.min_value.as_str() },
        editing_min,
    ));
    spans.push(Span::raw("  "));
    spans.extend(field(
        "Max: ",
        if editing_max { app.edit_buffer() } else { inputs.max_value.as_str() },
        editing_max,
    ));
    spans.push(Span::raw("  Range: "));
    spans.push(Span::styled(
        inputs.time_range.to_string(),
        Style::default().fg(Color::Cyan),
    ));
    if let Some(filter) = app.state().applied_filter() {
        spans.push(Span::styled(
            format!("   (applied: {})", filter),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let filters = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(" Filters ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(filters, area);
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Low => Style::default().fg(Color::Red),
        Severity::High => Style::default().fg(Color::Yellow),
        Severity::VeryHigh => Style::default().fg(Color::Green),
    }
}

fn table_row(row: RenderableRow) -> Row<'static> {
    let style = severity_style(row.severity);
    let row_style = if row.highlighted {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };

    Row::new(vec![
        Cell::from(row.time),
        Cell::from(row.crash_value).style(style.add_modifier(Modifier::BOLD)),
        Cell::from(row.numeric_value),
        Cell::from(row.severity.label()).style(style),
    ])
    .style(row_style)
}

fn draw_table(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = match view::table_for(app.state(), app.table_rows()) {
        TableBody::Placeholder(text) => vec![Row::new(vec![Cell::from(text)
            .style(Style::default().fg(Color::DarkGray))])],
        TableBody::Rows(rows) => rows.into_iter().map(table_row).collect(),
    };

    let widths = [
        Constraint::Length(20),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Min(10),
    ];

    let header = Row::new(vec!["Time", "Crash Value", "Numeric", "Status"])
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(" Recent Crashes ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(table, area);
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let (mode_str, mode_style, keys) = match app.mode() {
        Mode::Normal => (
            "NORMAL",
            Style::default().fg(Color::Black).bg(Color::Blue),
            if app.state().is_paused() {
                "[m]in [M]ax [t]ime [a]pply [c]lear [p] resume [e]xport [r]eload [q]uit"
            } else {
                "[m]in [M]ax [t]ime [a]pply [c]lear [p]ause [e]xport [r]eload [q]uit"
            },
        ),
        Mode::EditMin | Mode::EditMax => (
            "EDIT",
            Style::default().fg(Color::Black).bg(Color::Yellow),
            "[Enter] accept [Esc] cancel",
        ),
    };

    let help = Line::from(vec![
        Span::styled(format!(" {} ", mode_str), mode_style),
        Span::raw(" "),
        Span::styled(keys, Style::default().fg(Color::DarkGray)),
    ]);

    f.render_widget(Paragraph::new(help), area);
}

fn draw_toast(f: &mut Frame, text: &str, area: Rect) {
    let width = (text.chars().count() as u16 + 4).min(area.width);
    let rect = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + 1,
        width,
        height: 3.min(area.height),
    };

    let toast = Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        );

    f.render_widget(Clear, rect);
    f.render_widget(toast, rect);
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('m') => app.begin_edit(Mode::EditMin),
        KeyCode::Char('M') => app.begin_edit(Mode::EditMax),
        KeyCode::Char('t') => app.cycle_time_range(),
        KeyCode::Char('a') | KeyCode::Enter => app.dispatch(Message::ApplyFilters),
        KeyCode::Char('c') => app.dispatch(Message::ClearFilters),
        KeyCode::Char('p') | KeyCode::Char(' ') => app.dispatch(Message::TogglePause),
        KeyCode::Char('e') => app.dispatch(Message::Export),
        KeyCode::Char('r') => app.dispatch(Message::SnapshotRequested),
        _ => {}
    }
}

fn handle_edit_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_edit(),
        KeyCode::Enter => app.commit_edit(),
        KeyCode::Char(c) if c.is_ascii_digit() || c == '.' || c == '-' => {
            app.edit_buffer_mut().push(c);
        }
        KeyCode::Backspace => {
            app.edit_buffer_mut().pop();
        }
        _ => {}
    }
}
