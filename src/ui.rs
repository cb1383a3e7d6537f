use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use momo_ledger::stats::{top_counterparties, type_stats, CounterpartyStat};
use momo_ledger::{Transaction, TransactionCategory, TypeStat};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PAGE_JUMP: usize = 20;
const TOP_PEOPLE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Ledger,
    Summary,
    People,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Ledger => Page::Summary,
            Page::Summary => Page::People,
            Page::People => Page::Ledger,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Ledger => Page::People,
            Page::Summary => Page::Ledger,
            Page::People => Page::Summary,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::Ledger => "Ledger",
            Page::Summary => "Summary",
            Page::People => "People",
        }
    }
}

/// Key '1'..'6' selects the category at the same position in `TransactionCategory::ALL`
fn category_for_key(c: char) -> Option<TransactionCategory> {
    let index = c.to_digit(10)? as usize;
    index
        .checked_sub(1)
        .and_then(|i| TransactionCategory::ALL.get(i).copied())
}

fn category_color(category: TransactionCategory) -> Color {
    match category {
        TransactionCategory::Incoming => Color::Green,
        TransactionCategory::Payment => Color::Red,
        TransactionCategory::Transfer => Color::Magenta,
        TransactionCategory::BankDeposit => Color::Cyan,
        TransactionCategory::Withdrawal => Color::Yellow,
        TransactionCategory::Other => Color::White,
    }
}

pub struct App {
    pub transactions: Vec<Transaction>,
    /// Indices into `transactions` that pass the active filter
    pub visible: Vec<usize>,
    pub state: TableState,
    pub total_count: i64,
    pub current_page: Page,
    pub show_detail: bool,
    pub filter: Option<TransactionCategory>,
    summary: Vec<TypeStat>,
    people: Vec<CounterpartyStat>,
}

impl App {
    pub fn new(transactions: Vec<Transaction>, total_count: i64) -> Self {
        let summary = type_stats(transactions.iter().map(|t| &t.record));
        let people = top_counterparties(transactions.iter().map(|t| &t.record), TOP_PEOPLE);

        let mut app = Self {
            visible: Vec::new(),
            transactions,
            state: TableState::default(),
            total_count,
            current_page: Page::Ledger,
            show_detail: false,
            filter: None,
            summary,
            people,
        };
        app.refresh_visible();
        app
    }

    fn refresh_visible(&mut self) {
        self.visible = self
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| self.filter.map_or(true, |c| tx.record.category() == c))
            .map(|(i, _)| i)
            .collect();

        self.state
            .select(if self.visible.is_empty() { None } else { Some(0) });
    }

    pub fn apply_filter(&mut self, category: TransactionCategory) {
        self.filter = Some(category);
        self.refresh_visible();
        self.current_page = Page::Ledger;
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.refresh_visible();
        self.current_page = Page::Ledger;
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.state
            .selected()
            .and_then(|i| self.visible.get(i))
            .map(|&idx| &self.transactions[idx])
    }

    pub fn next(&mut self) {
        let len = self.visible.len();
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
        let len = self.visible.len();
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
        let len = self.visible.len();
        if len == 0 {
            return;
        }
        let i = self
            .state
            .selected()
            .map_or(0, |i| (i + PAGE_JUMP).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let i = self
            .state
            .selected()
            .map_or(0, |i| i.saturating_sub(PAGE_JUMP));
        self.state.select(Some(i));
    }

    pub fn last(&mut self) {
        if let Some(last) = self.visible.len().checked_sub(1) {
            self.state.select(Some(last));
        }
    }

    /// Money in vs money out across every loaded transaction
    pub fn flow_totals(&self) -> (f64, f64) {
        self.transactions
            .iter()
            .fold((0.0, 0.0), |(inflow, outflow), tx| match tx.record.category() {
                TransactionCategory::Incoming | TransactionCategory::BankDeposit => {
                    (inflow + tx.record.amount(), outflow)
                }
                TransactionCategory::Other => (inflow, outflow),
                _ => (inflow, outflow + tx.record.amount()),
            })
    }

    /// Returns false when the app should exit
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Enter => self.toggle_detail(),
            KeyCode::Tab if modifiers.contains(KeyModifiers::SHIFT) => {
                self.current_page = self.current_page.previous()
            }
            KeyCode::BackTab => self.current_page = self.current_page.previous(),
            KeyCode::Tab => self.current_page = self.current_page.next(),
            KeyCode::Char('c') => self.clear_filter(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::PageDown => self.page_down(),
            KeyCode::PageUp => self.page_up(),
            KeyCode::Home if !self.visible.is_empty() => self.state.select(Some(0)),
            KeyCode::End => self.last(),
            KeyCode::Char(c) => {
                if let Some(category) = category_for_key(c) {
                    self.apply_filter(category);
                }
            }
            _ => {}
        }
        true
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal before surfacing any error
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if !app.handle_key(key.code, key.modifiers) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Ledger {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_ledger(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Ledger => render_ledger(f, chunks[1], app),
            Page::Summary => render_summary(f, chunks[1], app),
            Page::People => render_people(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, page) in [Page::Ledger, Page::Summary, Page::People].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title(), style));
    }

    let (inflow, outflow) = app.flow_totals();
    spans.push(Span::raw("   "));
    spans.push(Span::styled(
        format!("{} txns", app.total_count),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("in {:.0} RWF", inflow),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("out {:.0} RWF", outflow),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" MoMo Ledger "),
    );
    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_ledger(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.visible.iter().map(|&idx| {
        let record = &app.transactions[idx].record;
        let color = category_color(record.category());
        Row::new(vec![
            Cell::from(record.date.clone()),
            Cell::from(truncate(record.name(), 28)),
            Cell::from(record.category().label()).style(Style::default().fg(color)),
            Cell::from(format!("{:>12.2}", record.amount())).style(Style::default().fg(color)),
            Cell::from(format!("{:>12.2}", record.fields.balance_after)),
        ])
    });

    let title = match app.filter {
        Some(category) => format!(" Ledger [{}] ({}) ", category.label(), app.visible.len()),
        None => format!(" Ledger ({}) ", app.visible.len()),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Min(20),
            Constraint::Length(13),
            Constraint::Length(13),
            Constraint::Length(13),
        ],
    )
    .header(header_row(&["Date", "Name", "Type", "Amount", "Balance"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = vec![Line::from("")];

    for (i, category) in TransactionCategory::ALL.iter().enumerate() {
        let stat = app.summary.iter().find(|s| s.category == *category);
        let (count, total) = stat.map_or((0, 0.0), |s| (s.count, s.total));
        let marker = if app.filter == Some(*category) { "→ " } else { "  " };

        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::styled(format!("{} ", i + 1), Style::default().fg(Color::Yellow)),
            Span::styled(
                format!("{:<14}", category.label()),
                Style::default().fg(category_color(*category)),
            ),
            Span::raw(format!("{:>7} txns {:>16.2} RWF", count, total)),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Press a number to filter the ledger, c to clear",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Totals by type "),
    );
    f.render_widget(paragraph, area);
}

fn render_people(f: &mut Frame, area: Rect, app: &App) {
    let rows = app.people.iter().map(|p| {
        Row::new(vec![
            Cell::from(truncate(&p.name, 40)),
            Cell::from(p.count.to_string()),
            Cell::from(format!("{:>14.2}", p.total)),
        ])
    });

    let table = Table::new(
        rows,
        [Constraint::Min(20), Constraint::Length(8), Constraint::Length(16)],
    )
    .header(header_row(&["Counterparty", "Count", "Total (RWF)"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Top {} counterparties ", app.people.len())),
    );

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let mut spans = vec![];

    if let Some(category) = app.filter {
        spans.push(Span::styled(
            format!("Filter: {} ", category.label()),
            Style::default().fg(Color::Green),
        ));
        spans.push(key("c"));
        spans.push(Span::raw(" clear │ "));
    }

    spans.extend([
        key("1-6"),
        Span::raw(" filter │ "),
        key("Enter"),
        Span::raw(" detail │ "),
        key("Tab"),
        Span::raw(" page │ "),
        key("↑/↓"),
        Span::raw(" move │ "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" quit"),
    ]);

    let status = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Transaction ");

    let Some(tx) = app.selected_transaction() else {
        f.render_widget(Paragraph::new("No transaction selected").block(block), area);
        return;
    };

    let record = &tx.record;
    let label = |name: &'static str| {
        Span::styled(name, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };
    let phone = if record.fields.phone_number.is_empty() {
        "-".to_string()
    } else {
        record.fields.phone_number.clone()
    };

    let content = vec![
        Line::from(""),
        Line::from(vec![label("  Id: "), Span::raw(tx.id.to_string())]),
        Line::from(vec![label("  Date: "), Span::raw(record.date.clone())]),
        Line::from(vec![label("  Name: "), Span::raw(record.name().to_string())]),
        Line::from(vec![label("  Phone: "), Span::raw(phone)]),
        Line::from(vec![
            label("  Type: "),
            Span::styled(
                record.category().label(),
                Style::default().fg(category_color(record.category())),
            ),
        ]),
        Line::from(vec![
            label("  Amount: "),
            Span::raw(format!("{:.2} RWF", record.amount())),
        ]),
        Line::from(vec![
            label("  Balance after: "),
            Span::raw(format!("{:.2} RWF", record.fields.balance_after)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momo_ledger::{ExtractedFields, TransactionRecord};

    fn tx(id: i64, name: &str, category: TransactionCategory, amount: f64) -> Transaction {
        Transaction {
            id,
            record: TransactionRecord {
                fields: ExtractedFields {
                    counterparty_name: name.to_string(),
                    amount,
                    category,
                    ..ExtractedFields::default()
                },
                date: format!("2024-05-{:02}", id),
            },
        }
    }

    fn app() -> App {
        let transactions = vec![
            tx(1, "Alice", TransactionCategory::Incoming, 5000.0),
            tx(2, "Shop", TransactionCategory::Payment, 1200.0),
            tx(3, "Alice", TransactionCategory::Payment, 300.0),
            tx(4, "Bank", TransactionCategory::BankDeposit, 10000.0),
        ];
        App::new(transactions, 4)
    }

    #[test]
    fn test_number_keys_filter_by_category() {
        let mut app = app();
        app.current_page = Page::Summary;

        assert!(app.handle_key(KeyCode::Char('2'), KeyModifiers::NONE));
        assert_eq!(app.filter, Some(TransactionCategory::Payment));
        assert_eq!(app.visible, vec![1, 2]);
        assert_eq!(app.current_page, Page::Ledger);

        app.handle_key(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(app.filter, None);
        assert_eq!(app.visible.len(), 4);
    }

    #[test]
    fn test_empty_filter_clears_selection() {
        let mut app = app();
        app.apply_filter(TransactionCategory::Withdrawal);

        assert!(app.visible.is_empty());
        assert!(app.selected_transaction().is_none());
        app.next();
        app.page_down();
        assert_eq!(app.state.selected(), None);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.previous();
        assert_eq!(app.selected_transaction().map(|t| t.id), Some(4));
        app.next();
        assert_eq!(app.selected_transaction().map(|t| t.id), Some(1));
    }

    #[test]
    fn test_flow_totals() {
        assert_eq!(app().flow_totals(), (15000.0, 1500.0));
    }

    #[test]
    fn test_quit_and_pages() {
        let mut app = app();
        app.handle_key(KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(app.current_page, Page::Summary);
        app.handle_key(KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(app.current_page, Page::Ledger);
        assert!(!app.handle_key(KeyCode::Char('q'), KeyModifiers::NONE));
    }

    #[test]
    fn test_category_keys() {
        assert_eq!(category_for_key('1'), Some(TransactionCategory::Incoming));
        assert_eq!(category_for_key('6'), Some(TransactionCategory::Other));
        assert_eq!(category_for_key('0'), None);
        assert_eq!(category_for_key('7'), None);
    }
}
