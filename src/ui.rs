use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use import_reconcile::{ImportSession, ReviewItem};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;

const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Commit,
    Cancel,
}

pub struct App {
    pub session: ImportSession,
    pub source: String,
    pub state: TableState,
    pub show_detail: bool,
}

impl App {
    pub fn new(session: ImportSession, source: impl Into<String>) -> Self {
        let mut state = TableState::default();
        if !session.is_empty() {
            state.select(Some(0));
        }

        Self {
            session,
            source: source.into(),
            state,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_item(&self) -> Option<&ReviewItem> {
        self.state.selected().and_then(|i| self.session.get(i))
    }

    pub fn toggle_current(&mut self) {
        if let Some(i) = self.state.selected() {
            self.session.toggle(i);
        }
    }

    pub fn next(&mut self) {
        let len = self.session.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.session.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.session.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + PAGE_SIZE).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.session.is_empty() {
            return;
        }
        let i = self.state.selected().map_or(0, |i| i.saturating_sub(PAGE_SIZE));
        self.state.select(Some(i));
    }

    pub fn first(&mut self) {
        if !self.session.is_empty() {
            self.state.select(Some(0));
        }
    }

    pub fn last(&mut self) {
        if !self.session.is_empty() {
            self.state.select(Some(self.session.len() - 1));
        }
    }
}

/// Run the review screen until the user commits or cancels
pub fn run_review(app: &mut App) -> Result<ReviewOutcome> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(res?)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<ReviewOutcome> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(ReviewOutcome::Cancel),
                KeyCode::Char('c') => return Ok(ReviewOutcome::Commit),
                KeyCode::Char(' ') => app.toggle_current(),
                KeyCode::Char('a') => app.session.select_all(),
                KeyCode::Char('n') => app.session.deselect_all(),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.first(),
                KeyCode::End => app.last(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let spans = vec![
        Span::styled(
            format!("Import review: {}", app.source),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Incoming: {}", app.session.len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Flagged: {}", app.session.flagged_count()),
            Style::default().fg(Color::Red),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Selected: {}", app.session.selected_count()),
            Style::default().fg(Color::Green),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["", "Date", "Amount", "Type", "Description", "Duplicate?"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.session.items().iter().map(|item| {
        let tx = &item.transaction;
        let checkbox = if item.selected { "[x]" } else { "[ ]" };
        let color = if item.is_flagged() { Color::Red } else { Color::Green };

        let cells = vec![
            Cell::from(checkbox),
            Cell::from(tx.date.format("%Y-%m-%d").to_string()),
            Cell::from(format!("{:.2}", tx.amount)),
            Cell::from(tx.kind.clone()),
            Cell::from(truncate(tx.description_or_empty(), 34)),
            Cell::from(item.reason.clone().unwrap_or_default()).style(Style::default().fg(color)),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(11),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(36),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Incoming transactions "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let label = Style::default().fg(Color::Cyan);

    let lines = match app.selected_item() {
        Some(item) => {
            let tx = &item.transaction;
            let mut lines = vec![
                Line::from(vec![Span::styled("ID: ", label), Span::raw(tx.id.clone())]),
                Line::from(vec![Span::styled("Type: ", label), Span::raw(tx.kind.clone())]),
                Line::from(vec![
                    Span::styled("Amount: ", label),
                    Span::raw(format!("{:.2}", tx.amount)),
                ]),
                Line::from(vec![Span::styled("Category: ", label), Span::raw(tx.category.clone())]),
                Line::from(vec![
                    Span::styled("Payment: ", label),
                    Span::raw(tx.payment_method.clone()),
                ]),
                Line::from(vec![Span::styled("Date: ", label), Span::raw(tx.date.to_rfc3339())]),
                Line::from(vec![
                    Span::styled("Description: ", label),
                    Span::raw(tx.description_or_empty().to_string()),
                ]),
                Line::from(vec![Span::styled("Tags: ", label), Span::raw(tx.tags.join(", "))]),
                Line::from(""),
            ];

            match &item.duplicate {
                Some(m) => {
                    lines.push(Line::from(Span::styled(
                        item.reason.clone().unwrap_or_default(),
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(vec![
                        Span::styled("Matches existing: ", label),
                        Span::raw(m.existing_id.clone()),
                    ]));
                }
                None => lines.push(Line::from(Span::styled(
                    "New transaction",
                    Style::default().fg(Color::Green),
                ))),
            }
            lines
        }
        None => vec![Line::from("No transaction selected")],
    };

    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Details "),
        );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let key = Style::default().fg(Color::Yellow);

    let spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, app.session.len()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Space", key),
        Span::raw(" Toggle | "),
        Span::styled("a/n", key),
        Span::raw(" All/None | "),
        Span::styled("Enter", key),
        Span::raw(" Details | "),
        Span::styled("c", Style::default().fg(Color::Green)),
        Span::raw(" Commit | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Cancel"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
