use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use cu_comp_analysis::{ComparisonMode, FinancialMetrics, Institution, StoredReport, YearRecord};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const CEO_CHANGE_COLOR: Color = Color::Green;
const EVENT_COLOR: Color = Color::Rgb(165, 42, 42);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Institutions,
    Compensation,
    Financials,
    Reports,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Institutions => Page::Compensation,
            Page::Compensation => Page::Financials,
            Page::Financials => Page::Reports,
            Page::Reports => Page::Institutions,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Institutions => Page::Reports,
            Page::Compensation => Page::Institutions,
            Page::Financials => Page::Compensation,
            Page::Reports => Page::Financials,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Institutions => "Institutions",
            Page::Compensation => "Compensation",
            Page::Financials => "Financials",
            Page::Reports => "Reports",
        }
    }
}

/// Financial performance series charted on the Financials page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialSeries {
    TotalRevenue,
    NetIncome,
    TotalAssets,
    InvestmentIncome,
}

impl FinancialSeries {
    pub fn next(&self) -> Self {
        match self {
            FinancialSeries::TotalRevenue => FinancialSeries::NetIncome,
            FinancialSeries::NetIncome => FinancialSeries::TotalAssets,
            FinancialSeries::TotalAssets => FinancialSeries::InvestmentIncome,
            FinancialSeries::InvestmentIncome => FinancialSeries::TotalRevenue,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            FinancialSeries::TotalRevenue => "Total Revenue",
            FinancialSeries::NetIncome => "Net Income",
            FinancialSeries::TotalAssets => "Total Assets",
            FinancialSeries::InvestmentIncome => "Investment Income",
        }
    }

    pub fn value(&self, metrics: &FinancialMetrics) -> Option<f64> {
        match self {
            FinancialSeries::TotalRevenue => metrics.total_revenue,
            FinancialSeries::NetIncome => metrics.net_income,
            FinancialSeries::TotalAssets => metrics.total_assets,
            FinancialSeries::InvestmentIncome => metrics.investment_income,
        }
    }
}

pub struct App {
    pub institutions: Vec<Institution>,
    pub reports: Vec<StoredReport>,
    pub institution_state: TableState,
    pub year_state: TableState,
    pub report_mode: ComparisonMode,
    pub financial_series: FinancialSeries,
    pub current_page: Page,
}

impl App {
    pub fn new(institutions: Vec<Institution>, reports: Vec<StoredReport>) -> Self {
        let mut institution_state = TableState::default();
        if !institutions.is_empty() {
            institution_state.select(Some(0));
        }

        let mut app = Self {
            institutions,
            reports,
            institution_state,
            year_state: TableState::default(),
            report_mode: ComparisonMode::FlagSplit,
            financial_series: FinancialSeries::TotalRevenue,
            current_page: Page::Institutions,
        };
        app.reset_year_selection();
        app
    }

    pub fn selected_institution(&self) -> Option<&Institution> {
        self.institution_state.selected().and_then(|i| self.institutions.get(i))
    }

    pub fn selected_report(&self) -> Option<&StoredReport> {
        self.reports.iter().find(|r| r.report.mode == self.report_mode)
    }

    pub fn toggle_report_mode(&mut self) {
        self.report_mode = match self.report_mode {
            ComparisonMode::FlagSplit => ComparisonMode::Windowed,
            ComparisonMode::Windowed => ComparisonMode::FlagSplit,
        };
    }

    pub fn cycle_financial_series(&mut self) {
        self.financial_series = self.financial_series.next();
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn reset_year_selection(&mut self) {
        let has_records = self.selected_institution().map(|i| !i.records.is_empty()).unwrap_or(false);
        self.year_state.select(if has_records { Some(0) } else { None });
    }

    /// (rows in the active list, its table state)
    fn active_list(&mut self) -> (usize, &mut TableState) {
        match self.current_page {
            Page::Compensation | Page::Financials => {
                let len = self.selected_institution().map(|i| i.records.len()).unwrap_or(0);
                (len, &mut self.year_state)
            }
            _ => (self.institutions.len(), &mut self.institution_state),
        }
    }

    pub fn next(&mut self) {
        let (len, state) = self.active_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
        if self.current_page == Page::Institutions {
            self.reset_year_selection();
        }
    }

    pub fn previous(&mut self) {
        let (len, state) = self.active_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
        if self.current_page == Page::Institutions {
            self.reset_year_selection();
        }
    }

    /// Total compensation bars (year label, whole dollars) for the selected institution
    pub fn compensation_bars(&self) -> Vec<(String, u64)> {
        self.selected_institution()
            .map(|inst| {
                inst.records
                    .iter()
                    .map(|r| (r.year.to_string(), r.total_compensation.max(0.0).round() as u64))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// (year, value) of the active financial series; None where no metrics were joined
    pub fn financial_points(&self) -> Vec<(i32, Option<f64>)> {
        self.selected_institution()
            .map(|inst| {
                inst.records
                    .iter()
                    .map(|r| (r.year, r.financials.as_ref().and_then(|m| self.financial_series.value(m))))
                    .collect()
            })
            .unwrap_or_default()
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

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter if app.current_page == Page::Institutions => {
                    app.reset_year_selection();
                    app.current_page = Page::Compensation;
                }
                KeyCode::Char('m') if app.current_page == Page::Reports => app.toggle_report_mode(),
                KeyCode::Char('f') if app.current_page == Page::Financials => app.cycle_financial_series(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
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

    match app.current_page {
        Page::Institutions => render_institutions(f, chunks[1], app),
        Page::Compensation => render_compensation(f, chunks[1], app),
        Page::Financials => render_financials(f, chunks[1], app),
        Page::Reports => render_reports(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Institutions, Page::Compensation, Page::Financials, Page::Reports].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Institutions: {}", app.institutions.len()),
        Style::default().fg(Color::White),
    ));
    if let Some(inst) = app.selected_institution() {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(truncate(&inst.name, 40), Style::default().fg(Color::Cyan)));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_institutions(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.institutions.iter().map(|inst| {
        let years = inst.years();
        let span = match (years.first(), years.last()) {
            (Some(first), Some(last)) => format!("{}-{}", first, last),
            _ => "-".to_string(),
        };

        Row::new(vec![
            Cell::from(truncate(&inst.name, 36)),
            Cell::from(inst.ein.clone()),
            Cell::from(span),
            Cell::from(join_years(&inst.ceo_change_years())).style(Style::default().fg(CEO_CHANGE_COLOR)),
            Cell::from(join_years(&inst.event_years())).style(Style::default().fg(EVENT_COLOR)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(38),
            Constraint::Length(12),
            Constraint::Length(11),
            Constraint::Length(24),
            Constraint::Min(16),
        ],
    )
    .header(header_row(&["Institution", "EIN", "Years", "CEO changes", "M&A years"]))
    .block(Block::default().borders(Borders::ALL).title(" Credit Unions "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.institution_state);
}

/// Flag text and colour for CEO-change / M&A years; M&A colour wins when both
fn markers(r: &YearRecord) -> (String, Option<Color>) {
    let mut text = String::new();
    if r.identity_changed {
        text.push_str("CEO ");
    }
    if r.is_event_year {
        text.push_str("M&A");
    }

    let color = match (r.identity_changed, r.is_event_year) {
        (_, true) => Some(EVENT_COLOR),
        (true, false) => Some(CEO_CHANGE_COLOR),
        _ => None,
    };
    (text, color)
}

fn record_row(r: &YearRecord) -> Row<'static> {
    let (markers, marker_color) = markers(r);
    let marker_color = marker_color.unwrap_or(Color::White);

    let pct = r.pct_increase.map(|p| format!("{:+.1}%", p)).unwrap_or_else(|| "-".to_string());
    let pct_color = match r.pct_increase {
        Some(p) if p < 0.0 => Color::Red,
        Some(_) => Color::Green,
        None => Color::DarkGray,
    };

    Row::new(vec![
        Cell::from(r.year.to_string()),
        Cell::from(truncate(&r.canonical_executive_name, 26)),
        Cell::from(format_money(r.compensation)),
        Cell::from(format_money(r.other_compensation)),
        Cell::from(format_money(r.total_compensation)),
        Cell::from(pct).style(Style::default().fg(pct_color)),
        Cell::from(markers).style(Style::default().fg(marker_color)),
    ])
    .height(1)
}

fn render_compensation(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let (title, rows): (String, Vec<Row>) = match app.selected_institution() {
        Some(inst) => (format!(" {} ({}) ", inst.name, inst.ein), inst.records.iter().map(record_row).collect()),
        None => (" No institution selected ".to_string(), Vec::new()),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(28),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Min(8),
        ],
    )
    .header(header_row(&["Year", "Executive", "Compensation", "Other", "Total", "Pct", "Flags"]))
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], &mut app.year_state);

    let bars = app.compensation_bars();
    let data: Vec<(&str, u64)> = bars.iter().map(|(year, value)| (year.as_str(), *value)).collect();

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(" Total compensation by year "))
        .data(data.as_slice())
        .bar_width(6)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, chunks[1]);
}

fn financial_row(r: &YearRecord) -> Row<'static> {
    let (markers, marker_color) = markers(r);
    let metrics = r.financials.clone().unwrap_or_default();
    let money = |value: Option<f64>| value.map(format_money).unwrap_or_else(|| "-".to_string());

    let net_color = match metrics.net_income {
        Some(v) if v < 0.0 => Color::Red,
        Some(_) => Color::White,
        None => Color::DarkGray,
    };

    Row::new(vec![
        Cell::from(r.year.to_string()),
        Cell::from(money(metrics.total_revenue)),
        Cell::from(money(metrics.net_income)).style(Style::default().fg(net_color)),
        Cell::from(money(metrics.total_assets)),
        Cell::from(money(metrics.investment_income)),
        Cell::from(markers).style(Style::default().fg(marker_color.unwrap_or(Color::White))),
    ])
    .height(1)
}

fn render_financials(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let (title, rows): (String, Vec<Row>) = match app.selected_institution() {
        Some(inst) => (
            format!(" {} - Financial performance ", inst.name),
            inst.records.iter().map(financial_row).collect(),
        ),
        None => (" No institution selected ".to_string(), Vec::new()),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(18),
            Constraint::Length(16),
            Constraint::Length(18),
            Constraint::Length(18),
            Constraint::Min(8),
        ],
    )
    .header(header_row(&["Year", "Total Revenue", "Net Income", "Total Assets", "Investment Income", "Flags"]))
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], &mut app.year_state);

    // Bars in $K, coloured by CEO-change / M&A year; negative values draw empty
    let series = app.financial_series;
    let bars: Vec<Bar> = app
        .selected_institution()
        .map(|inst| {
            inst.records
                .iter()
                .filter_map(|r| {
                    let value = r.financials.as_ref().and_then(|m| series.value(m))?;
                    let color = markers(r).1.unwrap_or(Color::Cyan);
                    Some(
                        Bar::default()
                            .value((value / 1000.0).max(0.0).round() as u64)
                            .label(Line::from(r.year.to_string()))
                            .style(Style::default().fg(color)),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} by year ($K) ", series.title())),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(8)
        .bar_gap(1)
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, chunks[1]);
}

fn render_reports(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);

    let Some(stored) = app.selected_report() else {
        let empty = Paragraph::new(format!("No {} report yet. Run `cu-comp analyze` first.", app.report_mode.as_str()))
            .block(Block::default().borders(Borders::ALL).title(" Reports "));
        f.render_widget(empty, area);
        return;
    };

    let report = &stored.report;
    let summary = vec![
        Line::from(vec![
            Span::styled(report.mode.as_str(), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(format!("  metric: {}  run: {}", report.metric.as_str(), stored.run_id)),
        ]),
        Line::from(Span::styled(report.outcome.summary(), Style::default().fg(Color::Cyan))),
    ];
    f.render_widget(
        Paragraph::new(summary).block(Block::default().borders(Borders::ALL).title(" Significance ")),
        chunks[0],
    );

    let (treatment, baseline) = report.mode.labels();
    let rows = report.rows.iter().map(|r| {
        let style = if r.is_included() {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Row::new(vec![
            Cell::from(truncate(&r.institution_name, 32)),
            Cell::from(r.event_year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::from(format_pct(r.treatment_mean)),
            Cell::from(format_pct(r.baseline_mean)),
            Cell::from(format_pct(r.difference)),
            Cell::from(r.exclusion.clone().unwrap_or_default()),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(34),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Institution", "Event", treatment, baseline, "Diff", "Excluded because"]))
    .block(Block::default().borders(Borders::ALL).title(" Per-institution comparison "));

    f.render_widget(table, chunks[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if app.current_page == Page::Financials {
        status_spans.push(Span::styled("f", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(format!(" Metric ({}) | ", app.financial_series.title())));
    }
    if matches!(app.current_page, Page::Compensation | Page::Financials) {
        status_spans.push(Span::styled("CEO", Style::default().fg(CEO_CHANGE_COLOR)));
        status_spans.push(Span::raw(" change | "));
        status_spans.push(Span::styled("M&A", Style::default().fg(EVENT_COLOR)));
        status_spans.push(Span::raw(" event year | "));
    }
    if app.current_page == Page::Reports {
        status_spans.push(Span::styled("m", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Toggle mode | "));
    }
    if app.current_page == Page::Institutions {
        status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Open | "));
    }

    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn join_years(years: &[i32]) -> String {
    years.iter().map(|y| y.to_string()).collect::<Vec<_>>().join(", ")
}

fn format_money(value: f64) -> String {
    let whole = value.abs().round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

fn format_pct(value: Option<f64>) -> String {
    value.map(|v| format!("{:+.2}", v)).unwrap_or_else(|| "-".to_string())
}
