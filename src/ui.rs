use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Margin, Rect},
    style::{Color, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{
        Bar, BarChart, BarGroup, Block, Borders, Cell, Clear, List, ListItem, ListState,
        Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState, Table, TableState, Wrap,
    },
};

use crate::model::{Pane, SelectView, Status, UIData};

pub const HEADER_HEIGHT: usize = 3;
pub const CHART_HEIGHT: usize = 14;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 3; // Two borders and the column names
pub const SIDEBAR_WIDTH: usize = 32;
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

const MIN_WIDTH: usize = SIDEBAR_WIDTH + 30;
const MIN_HEIGHT: usize = HEADER_HEIGHT + CHART_HEIGHT + STATUSLINE_HEIGHT + TABLE_HEADER_HEIGHT + 2;
const BAR_WIDTH: u16 = 9;
const BAR_GAP: u16 = 1;
const BAR_COLOR: Color = Color::Rgb(0xFF, 0x57, 0x33);
const FOCUS_COLOR: Color = Color::Yellow;

/// Uppercase the first character and lowercase the rest.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Rows given to the region list (borders included) when the comuna list
/// shares the sidebar with it.
pub fn region_list_height(options: usize, sidebar_height: usize) -> usize {
    std::cmp::min(options + 2, sidebar_height / 2)
}

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    area
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let block = Block::bordered().title(Line::from(title));
    if focused {
        block
            .border_set(border::THICK)
            .border_style(Style::new().fg(FOCUS_COLOR))
    } else {
        block.border_set(border::PLAIN)
    }
}

#[derive(Debug, Default)]
pub struct TableUI;

impl TableUI {
    pub fn new() -> Self {
        Self
    }

    pub fn draw(&self, uidata: &UIData, frame: &mut Frame) {
        let area = frame.area();
        if uidata.layout.width < MIN_WIDTH || uidata.layout.height < MIN_HEIGHT {
            let text = format!(
                "Terminal too small ({}x{}), need at least {MIN_WIDTH}x{MIN_HEIGHT}",
                uidata.layout.width, uidata.layout.height
            );
            frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), area);
            return;
        }

        let [header, content, statusline] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(area);

        self.render_header(uidata, frame, header);
        match uidata.status {
            Status::LOADING => self.render_loading(frame, content),
            Status::FAILED => self.render_errors(uidata, frame, content),
            Status::READY | Status::QUITTING => self.render_dashboard(uidata, frame, content),
        }
        self.render_statusline(uidata, frame, statusline);

        if uidata.show_help {
            self.render_help(uidata, frame, area);
        }
    }

    fn render_header(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let text = Text::from(vec![
            Line::from(Span::from(uidata.title.clone()).bold()),
            Line::from(vec![
                Span::from(uidata.subtitle.clone()),
                Span::from("  "),
                Span::from(uidata.source.clone()).dark_gray(),
            ]),
        ]);
        frame.render_widget(
            Paragraph::new(text).block(Block::default().borders(Borders::BOTTOM)),
            area,
        );
    }

    fn render_loading(&self, frame: &mut Frame, area: Rect) {
        let popup = popup_area(area, 40, 3);
        frame.render_widget(
            Paragraph::new("Loading data from the API ...")
                .centered()
                .block(Block::bordered()),
            popup,
        );
    }

    fn render_errors(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = uidata
            .errors
            .iter()
            .map(|e| Line::from(Span::from(e.clone()).red()))
            .collect();
        lines.push(Line::default());
        lines.push(Line::from(vec![
            "Press ".into(),
            "<r>".blue().bold(),
            " to retry or ".into(),
            "<q>".blue().bold(),
            " to quit.".into(),
        ]));
        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title(" Error ").border_style(Style::new().red())),
            area,
        );
    }

    fn render_dashboard(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [body, chart] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(CHART_HEIGHT as u16)])
                .areas(area);
        let [sidebar, table] = Layout::horizontal([
            Constraint::Length(SIDEBAR_WIDTH as u16),
            Constraint::Min(0),
        ])
        .areas(body);
        let [selector, bars] = Layout::horizontal([
            Constraint::Length(SIDEBAR_WIDTH as u16),
            Constraint::Min(0),
        ])
        .areas(chart);

        self.render_sidebar(uidata, frame, sidebar);
        self.render_table(uidata, frame, table);
        self.render_column_selector(uidata, frame, selector);
        self.render_chart(uidata, frame, bars);
    }

    fn render_sidebar(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().title(" Data filters ".bold());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        match (&uidata.region, &uidata.comuna) {
            (Some(region), Some(comuna)) => {
                let region_height = region_list_height(region.options.len(), inner.height as usize);
                let [top, bottom] = Layout::vertical([
                    Constraint::Length(region_height as u16),
                    Constraint::Min(0),
                ])
                .areas(inner);
                self.render_select(frame, top, region, true, uidata.focus == Pane::REGION);
                self.render_select(frame, bottom, comuna, false, uidata.focus == Pane::COMUNA);
            }
            (Some(region), None) => {
                self.render_select(frame, inner, region, true, uidata.focus == Pane::REGION)
            }
            (None, Some(comuna)) => {
                self.render_select(frame, inner, comuna, false, uidata.focus == Pane::COMUNA)
            }
            (None, None) => frame.render_widget(
                Paragraph::new("No region or comuna column in this dataset.")
                    .wrap(Wrap { trim: true })
                    .dark_gray(),
                inner,
            ),
        }
    }

    fn render_select(
        &self,
        frame: &mut Frame,
        area: Rect,
        view: &SelectView,
        single: bool,
        focused: bool,
    ) {
        let items: Vec<ListItem> = view
            .options
            .iter()
            .zip(view.marked.iter())
            .map(|(option, &marked)| {
                let mark = match (single, marked) {
                    (true, true) => "(•) ",
                    (true, false) => "( ) ",
                    (false, true) => "[x] ",
                    (false, false) => "[ ] ",
                };
                ListItem::new(format!("{mark}{option}"))
            })
            .collect();
        let list = List::new(items)
            .block(pane_block(format!(" {} ", view.title), focused))
            .highlight_style(Style::new().reversed())
            .highlight_symbol("> ");
        let mut state = ListState::default().with_selected(focused.then_some(view.cursor));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let header = Row::new(
            uidata
                .table
                .iter()
                .map(|c| Cell::from(truncate(&c.name, c.width))),
        )
        .style(Style::new().bold().underlined());

        let visible_rows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);
        let rows = (0..visible_rows).map(|ridx| {
            Row::new(
                uidata
                    .table
                    .iter()
                    .map(|c| Cell::from(truncate(&c.data[ridx], c.width))),
            )
        });
        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let focused = uidata.focus == Pane::TABLE;
        let title = format!(
            " Showing {} records for the current selection ",
            uidata.nrows
        );
        let position = if uidata.nrows == 0 {
            " 0/0 ".to_string()
        } else {
            format!(" {}/{} ", uidata.abs_selected_row + 1, uidata.nrows)
        };
        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .block(pane_block(title, focused).title_bottom(Line::from(position).right_aligned()))
            .row_highlight_style(Style::new().reversed());
        let mut state = TableState::default().with_selected(Some(uidata.selected_row));
        frame.render_stateful_widget(table, area, &mut state);

        let mut scrollbar_state =
            ScrollbarState::new(uidata.nrows).position(uidata.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }

    fn render_column_selector(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let view = SelectView {
            title: "Chart column".to_string(),
            options: uidata.chart_columns.clone(),
            cursor: uidata.chart_column,
            marked: (0..uidata.chart_columns.len())
                .map(|i| i == uidata.chart_column)
                .collect(),
        };
        self.render_select(frame, area, &view, true, uidata.focus == Pane::COLUMN);
    }

    fn render_chart(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let column = uidata
            .chart_columns
            .get(uidata.chart_column)
            .map(|c| capitalize(c))
            .unwrap_or_default();

        let max_bars = (area.width.saturating_sub(2) / (BAR_WIDTH + BAR_GAP)) as usize;
        let bars: Vec<Bar> = uidata
            .histogram
            .iter()
            .take(max_bars)
            .map(|(value, count)| {
                Bar::default()
                    .value(*count as u64)
                    .label(Line::from(truncate(value, BAR_WIDTH as usize)))
                    .text_value(count.to_string())
            })
            .collect();

        let mut title = format!(" Frequency of {column} ");
        if uidata.histogram.len() > bars.len() {
            title = format!(
                " Frequency of {column} (top {} of {}) ",
                bars.len(),
                uidata.histogram.len()
            );
        }
        let block = Block::bordered()
            .title(Line::from(title).bold())
            .title_bottom(Line::from(format!(" {column} / Number of records ")).centered());

        let chart = BarChart::default()
            .block(block)
            .bar_width(BAR_WIDTH)
            .bar_gap(BAR_GAP)
            .bar_style(Style::new().fg(BAR_COLOR))
            .value_style(Style::new().fg(Color::Black).bg(BAR_COLOR))
            .data(BarGroup::default().bars(&bars));
        frame.render_widget(chart, area);
    }

    fn render_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let line = Line::from(vec![
            " Quit ".into(),
            "<q>".blue().bold(),
            " Help ".into(),
            "<?>".blue().bold(),
            " Pane ".into(),
            "<Tab>".blue().bold(),
            " Reload ".into(),
            "<r>".blue().bold(),
            " | ".dark_gray(),
            Span::from(uidata.status_message.clone()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_help(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let height = uidata.help_text.lines().count() as u16 + 2;
        let popup = popup_area(area, 60, height);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(uidata.help_text.clone()).block(
                Block::bordered()
                    .title(" Help ".bold())
                    .title_bottom(Line::from(" <Esc> close ").centered())
                    .border_set(border::THICK),
            ),
            popup,
        );
    }
}
