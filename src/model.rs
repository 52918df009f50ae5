use polars::prelude::DataFrame;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::cache::DatasetCache;
use crate::domain::{COMUNA_COLUMN, DashConfig, DashError, HELP_TEXT, Message, REGION_COLUMN};
use crate::fetcher::Source;
use crate::records::{self, Column};
use crate::ui::{
    CHART_HEIGHT, COLUMN_WIDTH_MARGIN, HEADER_HEIGHT, SCROLLBAR_WIDTH, SIDEBAR_WIDTH,
    STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT, region_list_height,
};

pub const TITLE: &str = "Emergencies and public data in Chile";
pub const SUBTITLE: &str = "Interactive analysis of a public dataset from the datos.gob.cl REST API";
pub const NO_DATA_MESSAGE: &str =
    "Could not load data from the REST API. Check your connection or the dataset.";

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    LOADING,
    READY,
    FAILED,
    QUITTING,
}

/// Focusable panes, in tab order.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Pane {
    REGION,
    COMUNA,
    TABLE,
    COLUMN,
}

#[derive(Clone, Debug, Default)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// Single choice list. Once it has options one of them is always selected.
struct SingleSelect {
    options: Vec<String>,
    cursor: usize,
    selected: usize,
}

impl SingleSelect {
    fn new(options: Vec<String>) -> Self {
        Self {
            options,
            cursor: 0,
            selected: 0,
        }
    }

    fn selected_value(&self) -> Option<&str> {
        self.options.get(self.selected).map(String::as_str)
    }

    /// Returns true if the selection changed.
    fn select_cursor(&mut self) -> bool {
        let changed = self.cursor != self.selected;
        self.selected = self.cursor;
        changed
    }
}

struct MultiSelect {
    options: Vec<String>,
    cursor: usize,
    selected: Vec<String>,
}

impl MultiSelect {
    fn new(options: Vec<String>) -> Self {
        Self {
            options,
            cursor: 0,
            selected: Vec::new(),
        }
    }

    fn toggle_cursor(&mut self) {
        if let Some(value) = self.options.get(self.cursor) {
            match self.selected.iter().position(|s| s == value) {
                Some(pos) => {
                    self.selected.remove(pos);
                }
                None => self.selected.push(value.clone()),
            }
        }
    }

    /// Replace the options, dropping selected values that are no longer offered.
    fn set_options(&mut self, options: Vec<String>) {
        self.selected.retain(|s| options.contains(s));
        self.cursor = std::cmp::min(self.cursor, options.len().saturating_sub(1));
        self.options = options;
    }
}

#[derive(Default)]
struct TableView {
    offset_row: usize,
    cursor_row: usize,
    offset_column: usize,
    height: usize,
    width: usize,
    data: Vec<ColumnView>,
}

#[derive(Default)]
struct ChartView {
    columns: Vec<String>,
    selected: usize,
    counts: Vec<(String, usize)>,
}

impl ChartView {
    /// Keep the charted column if it still exists, otherwise fall back to the default.
    fn set_columns(&mut self, columns: Vec<String>) {
        let current = self.columns.get(self.selected).cloned();
        self.selected = current
            .and_then(|name| columns.iter().position(|c| *c == name))
            .unwrap_or_else(|| records::default_chart_column(&columns));
        self.columns = columns;
    }

    fn selected_name(&self) -> Option<&str> {
        self.columns.get(self.selected).map(String::as_str)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SelectView {
    pub title: String,
    pub options: Vec<String>,
    pub cursor: usize,
    pub marked: Vec<bool>,
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    /// Rows inside the bordered filter sidebar.
    pub sidebar_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let table_width = ui_width.saturating_sub(SIDEBAR_WIDTH + SCROLLBAR_WIDTH + 2);
        let table_height = ui_height
            .saturating_sub(HEADER_HEIGHT + CHART_HEIGHT + STATUSLINE_HEIGHT + TABLE_HEADER_HEIGHT);
        let sidebar_height =
            ui_height.saturating_sub(HEADER_HEIGHT + CHART_HEIGHT + STATUSLINE_HEIGHT + 2);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
            sidebar_height,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct UIData {
    pub title: String,
    pub subtitle: String,
    pub source: String,
    pub status: Status,
    pub errors: Vec<String>,
    pub region: Option<SelectView>,
    pub comuna: Option<SelectView>,
    pub table: Vec<ColumnView>,
    pub nrows: usize,
    pub selected_row: usize,
    pub abs_selected_row: usize,
    pub chart_columns: Vec<String>,
    pub chart_column: usize,
    pub histogram: Vec<(String, usize)>,
    pub focus: Pane,
    pub show_help: bool,
    pub help_text: String,
    pub status_message: String,
    pub layout: UILayout,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            title: TITLE.to_string(),
            subtitle: SUBTITLE.to_string(),
            source: String::new(),
            status: Status::LOADING,
            errors: Vec::new(),
            region: None,
            comuna: None,
            table: Vec::new(),
            nrows: 0,
            selected_row: 0,
            abs_selected_row: 0,
            chart_columns: Vec::new(),
            chart_column: 0,
            histogram: Vec::new(),
            focus: Pane::TABLE,
            show_help: false,
            help_text: HELP_TEXT.to_string(),
            status_message: String::new(),
            layout: UILayout::default(),
        }
    }
}

pub struct Model {
    config: DashConfig,
    pub status: Status,
    source: Source,
    cache: DatasetCache,
    fetch_error: Option<String>,
    data: DataFrame,
    filtered: DataFrame,
    columns: Vec<Column>,
    region: Option<SingleSelect>,
    comuna: Option<MultiSelect>,
    table: TableView,
    chart: ChartView,
    focus: Pane,
    show_help: bool,
    uilayout: UILayout,
    uidata: UIData,
    status_message: String,
}

impl Model {
    pub fn init(config: &DashConfig, ui_width: usize, ui_height: usize) -> Self {
        let uilayout = UILayout::from_values(ui_width, ui_height);
        let mut model = Self {
            config: config.clone(),
            status: Status::LOADING,
            source: Source::from_config(config),
            cache: DatasetCache::default(),
            fetch_error: None,
            data: DataFrame::empty(),
            filtered: DataFrame::empty(),
            columns: Vec::new(),
            region: None,
            comuna: None,
            table: TableView {
                height: uilayout.table_height,
                width: uilayout.table_width,
                ..TableView::default()
            },
            chart: ChartView::default(),
            focus: Pane::TABLE,
            show_help: false,
            uilayout,
            uidata: UIData::empty(),
            status_message: "Loading data from the API ...".to_string(),
        };
        model.update_uidata();
        model
    }

    /// Load the record collection (from cache if possible) and run the pipeline.
    pub fn load_data(&mut self) -> Result<(), DashError> {
        let start_time = Instant::now();
        let key = self.source.key();
        let source = &self.source;
        let outcome = self.cache.get_or_fetch(&key, || source.load());

        self.fetch_error = outcome.error;
        self.region = None;
        self.comuna = None;
        self.chart = ChartView::default();
        self.table.offset_row = 0;
        self.table.cursor_row = 0;
        self.table.offset_column = 0;

        if outcome.frame.height() == 0 {
            info!("No records loaded from {key}");
            self.data = DataFrame::empty();
            self.filtered = DataFrame::empty();
            self.columns.clear();
            self.table.data.clear();
            self.status = Status::FAILED;
            self.set_status_message("No data");
            self.update_uidata();
            return Ok(());
        }

        self.data = records::normalize_columns(&outcome.frame)?;
        if records::has_column(&self.data, REGION_COLUMN) {
            let regions = records::distinct_values(&self.data, REGION_COLUMN)?;
            self.region = Some(SingleSelect::new(regions));
        }
        self.refresh()?;

        self.status = Status::READY;
        self.focus = self.panes()[0];
        self.set_status_message(format!(
            "Loaded {} records in {}ms",
            self.data.height(),
            start_time.elapsed().as_millis()
        ));
        self.update_uidata();
        Ok(())
    }

    /// Re-run the filter stage, the presenter and the aggregator for the current selections.
    fn refresh(&mut self) -> Result<(), DashError> {
        let start_time = Instant::now();
        let region = self.region.as_ref().and_then(|r| r.selected_value());
        let by_region = records::filter_region(&self.data, region)?;

        if records::has_column(&by_region, COMUNA_COLUMN) {
            let options = records::distinct_values(&by_region, COMUNA_COLUMN)?;
            match self.comuna.as_mut() {
                Some(comuna) => comuna.set_options(options),
                None => self.comuna = Some(MultiSelect::new(options)),
            }
        } else {
            self.comuna = None;
        }
        let comunas = self
            .comuna
            .as_ref()
            .map(|c| c.selected.as_slice())
            .unwrap_or_default();
        self.filtered = records::filter_comunas(&by_region, comunas)?;

        self.columns = records::load_columns(&self.filtered)?;
        for c in self.columns.iter() {
            trace!("Column: {}", c.as_string());
        }
        self.chart.set_columns(records::column_names(&self.filtered));
        self.update_histogram()?;

        self.table.offset_row = 0;
        self.table.cursor_row = 0;
        self.table.offset_column = std::cmp::min(
            self.table.offset_column,
            self.columns.len().saturating_sub(1),
        );
        self.update_table_data();
        debug!(
            "Pipeline produced {} of {} rows in {}ms",
            self.filtered.height(),
            self.data.height(),
            start_time.elapsed().as_millis()
        );
        Ok(())
    }

    fn update_histogram(&mut self) -> Result<(), DashError> {
        self.chart.counts = match self.chart.selected_name() {
            Some(name) => records::value_counts(&self.filtered, name)?,
            None => Vec::new(),
        };
        trace!(
            "Histogram for {:?} has {} values",
            self.chart.selected_name(),
            self.chart.counts.len()
        );
        Ok(())
    }

    fn calculate_column_width(column: &Column, max_column_width: usize) -> usize {
        let width = std::cmp::max(column.name.chars().count(), column.max_width) + COLUMN_WIDTH_MARGIN;
        std::cmp::min(width, max_column_width)
    }

    fn update_table_data(&mut self) {
        let table = &mut self.table;
        table.data.clear();
        if self.columns.is_empty() {
            return;
        }

        let nrows = self.filtered.height();
        let rbegin = std::cmp::min(table.offset_row, nrows);
        let rend = std::cmp::min(rbegin + table.height, nrows);

        trace!(
            "Table: Cr {}, Or {}, Oc {}, Rb {}, Re {}, tw: {}, th: {}",
            table.cursor_row,
            table.offset_row,
            table.offset_column,
            rbegin,
            rend,
            table.width,
            table.height
        );

        // Collect the columns that fit, the last one may be partially visible
        let mut visible_width = 0;
        for column in self.columns[table.offset_column..].iter() {
            let mut width = Self::calculate_column_width(column, self.config.max_column_width);
            if visible_width + width + 1 > table.width {
                if visible_width >= table.width {
                    break;
                }
                width = table.width - visible_width;
            }
            visible_width += width + 1;
            table.data.push(ColumnView {
                name: column.name.clone(),
                width,
                data: column.data[rbegin..rend].to_vec(),
            });
        }
    }

    fn panes(&self) -> Vec<Pane> {
        let mut panes = Vec::with_capacity(4);
        if self.region.is_some() {
            panes.push(Pane::REGION);
        }
        if self.comuna.is_some() {
            panes.push(Pane::COMUNA);
        }
        panes.push(Pane::TABLE);
        panes.push(Pane::COLUMN);
        panes
    }

    fn cycle_focus(&mut self, forward: bool) {
        let panes = self.panes();
        let current = panes.iter().position(|&p| p == self.focus).unwrap_or(0);
        let next = if forward {
            (current + 1) % panes.len()
        } else {
            (current + panes.len() - 1) % panes.len()
        };
        self.focus = panes[next];
        trace!("Focus {:?}", self.focus);
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        self.uilayout = UILayout::from_values(width, height);
        self.table.height = self.uilayout.table_height;
        self.table.width = self.uilayout.table_width;
        // keep the cursor inside the new page
        let abs = self.table.offset_row + self.table.cursor_row;
        self.select_row(abs);
    }

    fn reload(&mut self) {
        self.cache.invalidate();
        self.status = Status::LOADING;
        self.set_status_message("Reloading data from the API ...");
        self.update_uidata();
    }

    pub fn update(&mut self, message: Message) -> Result<(), DashError> {
        trace!("Update: {:?} in {:?}/{:?}", message, self.status, self.focus);
        match message {
            Message::Quit => self.quit(),
            Message::Resize(width, height) => self.ui_resize(width, height),
            Message::Help => self.show_help = !self.show_help,
            Message::Exit => self.show_help = false,
            Message::Reload => {
                if self.status != Status::LOADING {
                    self.reload();
                }
            }
            _ if self.show_help || self.status != Status::READY => {}
            Message::NextPane => self.cycle_focus(true),
            Message::PreviousPane => self.cycle_focus(false),
            Message::MoveUp => self.move_selection_up(1)?,
            Message::MoveDown => self.move_selection_down(1)?,
            Message::MovePageUp => self.move_selection_up(self.page_size())?,
            Message::MovePageDown => self.move_selection_down(self.page_size())?,
            Message::MoveBeginning => self.move_selection_up(usize::MAX)?,
            Message::MoveEnd => self.move_selection_down(usize::MAX)?,
            Message::MoveLeft => self.move_table_column(false),
            Message::MoveRight => self.move_table_column(true),
            Message::Select | Message::Toggle => self.select()?,
            Message::ClearSelection => self.clear_comunas()?,
        }
        self.update_uidata();
        Ok(())
    }

    /// Visible rows of the focused pane, the step for page up/down.
    fn page_size(&self) -> usize {
        let sidebar = self.uilayout.sidebar_height;
        let region_height = self
            .region
            .as_ref()
            .map_or(0, |r| region_list_height(r.options.len(), sidebar));
        let rows = match self.focus {
            Pane::TABLE => self.table.height,
            Pane::REGION if self.comuna.is_none() => sidebar.saturating_sub(2),
            Pane::REGION => region_height.saturating_sub(2),
            Pane::COMUNA => sidebar.saturating_sub(region_height + 2),
            Pane::COLUMN => CHART_HEIGHT.saturating_sub(2),
        };
        std::cmp::max(rows, 1)
    }

    fn move_selection_up(&mut self, size: usize) -> Result<(), DashError> {
        match self.focus {
            Pane::REGION => {
                if let Some(region) = self.region.as_mut() {
                    region.cursor = region.cursor.saturating_sub(size);
                }
            }
            Pane::COMUNA => {
                if let Some(comuna) = self.comuna.as_mut() {
                    comuna.cursor = comuna.cursor.saturating_sub(size);
                }
            }
            Pane::TABLE => {
                let abs = self.table.offset_row + self.table.cursor_row;
                self.select_row(abs.saturating_sub(size));
            }
            Pane::COLUMN => {
                let selected = self.chart.selected.saturating_sub(size);
                self.select_chart_column(selected)?;
            }
        }
        Ok(())
    }

    fn move_selection_down(&mut self, size: usize) -> Result<(), DashError> {
        fn step(cursor: usize, size: usize, len: usize) -> usize {
            std::cmp::min(cursor.saturating_add(size), len.saturating_sub(1))
        }
        match self.focus {
            Pane::REGION => {
                if let Some(region) = self.region.as_mut() {
                    region.cursor = step(region.cursor, size, region.options.len());
                }
            }
            Pane::COMUNA => {
                if let Some(comuna) = self.comuna.as_mut() {
                    comuna.cursor = step(comuna.cursor, size, comuna.options.len());
                }
            }
            Pane::TABLE => {
                let abs = self.table.offset_row + self.table.cursor_row;
                self.select_row(step(abs, size, self.filtered.height()));
            }
            Pane::COLUMN => {
                let selected = step(self.chart.selected, size, self.chart.columns.len());
                self.select_chart_column(selected)?;
            }
        }
        Ok(())
    }

    /// Move the table cursor to an absolute row, scrolling the page if needed.
    fn select_row(&mut self, row: usize) {
        let nrows = self.filtered.height();
        let table = &mut self.table;
        let row = std::cmp::min(row, nrows.saturating_sub(1));
        let height = std::cmp::max(table.height, 1);
        if row < table.offset_row {
            table.offset_row = row;
        } else if row >= table.offset_row + height {
            table.offset_row = row + 1 - height;
        }
        table.cursor_row = row - table.offset_row;
        self.update_table_data();
    }

    fn move_table_column(&mut self, right: bool) {
        if self.focus != Pane::TABLE {
            return;
        }
        let table = &mut self.table;
        if right {
            if table.offset_column + 1 < self.columns.len() {
                table.offset_column += 1;
            }
        } else {
            table.offset_column = table.offset_column.saturating_sub(1);
        }
        self.update_table_data();
    }

    fn select_chart_column(&mut self, selected: usize) -> Result<(), DashError> {
        if selected != self.chart.selected {
            self.chart.selected = selected;
            self.update_histogram()?;
        }
        Ok(())
    }

    fn select(&mut self) -> Result<(), DashError> {
        match self.focus {
            Pane::REGION => {
                let changed = self.region.as_mut().is_some_and(|r| r.select_cursor());
                if changed {
                    let region = self.region.as_ref().and_then(|r| r.selected_value());
                    info!("Selected region {:?}", region);
                    self.refresh()?;
                }
            }
            Pane::COMUNA => {
                if let Some(comuna) = self.comuna.as_mut() {
                    comuna.toggle_cursor();
                    info!("Selected comunas {:?}", comuna.selected);
                    self.refresh()?;
                }
            }
            Pane::TABLE | Pane::COLUMN => {}
        }
        Ok(())
    }

    fn clear_comunas(&mut self) -> Result<(), DashError> {
        let cleared = self.comuna.as_mut().is_some_and(|c| {
            let had_selection = !c.selected.is_empty();
            c.selected.clear();
            had_selection
        });
        if cleared {
            self.refresh()?;
            self.set_status_message("Cleared comuna selection");
        }
        Ok(())
    }

    fn update_uidata(&mut self) {
        let mut errors = Vec::new();
        if self.status == Status::FAILED {
            errors.extend(self.fetch_error.clone());
            errors.push(NO_DATA_MESSAGE.to_string());
        }

        let region = self.region.as_ref().map(|r| SelectView {
            title: "Select a region".to_string(),
            options: r.options.clone(),
            cursor: r.cursor,
            marked: (0..r.options.len()).map(|i| i == r.selected).collect(),
        });
        let comuna = self.comuna.as_ref().map(|c| SelectView {
            title: format!("Filter by comuna ({})", c.selected.len()),
            options: c.options.clone(),
            cursor: c.cursor,
            marked: c.options.iter().map(|o| c.selected.contains(o)).collect(),
        });

        self.uidata = UIData {
            title: TITLE.to_string(),
            subtitle: SUBTITLE.to_string(),
            source: self.source.key(),
            status: self.status,
            errors,
            region,
            comuna,
            table: self.table.data.clone(),
            nrows: self.filtered.height(),
            selected_row: self.table.cursor_row,
            abs_selected_row: self.table.offset_row + self.table.cursor_row,
            chart_columns: self.chart.columns.clone(),
            chart_column: self.chart.selected,
            histogram: self.chart.counts.clone(),
            focus: self.focus,
            show_help: self.show_help,
            help_text: HELP_TEXT.to_string(),
            status_message: self.status_message.clone(),
            layout: self.uilayout.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    fn fixture_model() -> Model {
        let config = DashConfig::default()
            .source_file(Some(PathBuf::from("tests/fixtures/datastore_response.json")));
        let mut model = Model::init(&config, 160, 48);
        model.load_data().unwrap();
        model
    }

    fn send(model: &mut Model, messages: &[Message]) {
        for m in messages {
            model.update(m.clone()).unwrap();
        }
    }

    #[test]
    fn loading_selects_first_region_and_comuna_chart() {
        let model = fixture_model();
        let ui = model.get_uidata();
        assert_eq!(model.status, Status::READY);
        assert_eq!(ui.focus, Pane::REGION);

        let region = ui.region.as_ref().unwrap();
        assert_eq!(region.options, vec!["Biobío", "Metropolitana", "Valparaíso"]);
        assert_eq!(region.marked, vec![true, false, false]);
        assert_eq!(ui.nrows, 1);

        assert_eq!(ui.chart_columns, vec!["_id", "region", "comuna", "tipo", "afectados"]);
        assert_eq!(ui.chart_column, 2);
        assert_eq!(ui.histogram, vec![("Concepción".to_string(), 1)]);
    }

    #[test]
    fn region_then_comuna_selection_narrows_rows() {
        let mut model = fixture_model();
        send(&mut model, &[Message::MoveDown, Message::Select]);
        let ui = model.get_uidata();
        assert_eq!(ui.nrows, 3);
        let comuna = ui.comuna.as_ref().unwrap();
        assert_eq!(comuna.options, vec!["Maipú", "Santiago"]);
        assert_eq!(
            ui.histogram,
            vec![("Santiago".to_string(), 2), ("Maipú".to_string(), 1)]
        );

        send(
            &mut model,
            &[Message::NextPane, Message::MoveDown, Message::Toggle],
        );
        let ui = model.get_uidata();
        assert_eq!(ui.focus, Pane::COMUNA);
        assert_eq!(ui.nrows, 2);
        assert_eq!(ui.comuna.as_ref().unwrap().marked, vec![false, true]);

        send(&mut model, &[Message::ClearSelection]);
        assert_eq!(model.get_uidata().nrows, 3);
    }

    #[test]
    fn comuna_selection_is_pruned_when_region_changes() {
        let mut model = fixture_model();
        // Metropolitana, then pick Santiago
        send(
            &mut model,
            &[
                Message::MoveDown,
                Message::Select,
                Message::NextPane,
                Message::MoveDown,
                Message::Toggle,
            ],
        );
        assert_eq!(model.get_uidata().nrows, 2);
        // back to the region list and switch to Valparaíso
        send(
            &mut model,
            &[Message::PreviousPane, Message::MoveDown, Message::Select],
        );
        let ui = model.get_uidata();
        assert_eq!(ui.nrows, 2);
        assert!(ui.comuna.as_ref().unwrap().marked.iter().all(|m| !m));
    }

    #[test]
    fn chart_column_follows_column_pane_cursor() {
        let mut model = fixture_model();
        send(
            &mut model,
            &[
                Message::MoveDown,
                Message::Select,
                Message::PreviousPane,
                Message::MoveDown,
            ],
        );
        let ui = model.get_uidata();
        assert_eq!(ui.focus, Pane::COLUMN);
        assert_eq!(ui.chart_column, 3);
        assert_eq!(
            ui.histogram,
            vec![
                ("Inundación".to_string(), 2),
                ("Incendio forestal".to_string(), 1)
            ]
        );

        // afectados has one missing value among the Metropolitana rows
        send(&mut model, &[Message::MoveEnd]);
        let ui = model.get_uidata();
        assert_eq!(ui.chart_column, 4);
        let total: usize = ui.histogram.iter().map(|(_, c)| c).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn table_cursor_scrolls_with_small_pages() {
        let mut model = fixture_model();
        // Metropolitana has 3 rows, leave room for only 2
        let height = HEADER_HEIGHT + CHART_HEIGHT + STATUSLINE_HEIGHT + TABLE_HEADER_HEIGHT + 2;
        send(
            &mut model,
            &[
                Message::MoveDown,
                Message::Select,
                Message::Resize(160, height),
                Message::NextPane,
                Message::NextPane,
            ],
        );
        assert_eq!(model.get_uidata().focus, Pane::TABLE);
        send(&mut model, &[Message::MoveDown, Message::MoveDown]);
        let ui = model.get_uidata();
        assert_eq!(ui.abs_selected_row, 2);
        assert_eq!(ui.selected_row, 1);
        assert_eq!(ui.table[0].data.len(), 2);

        send(&mut model, &[Message::MoveBeginning]);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
    }

    #[test]
    fn help_blocks_navigation_until_closed() {
        let mut model = fixture_model();
        send(&mut model, &[Message::Help, Message::MoveDown, Message::Select]);
        assert!(model.get_uidata().show_help);
        assert_eq!(model.get_uidata().nrows, 1);
        send(&mut model, &[Message::Exit]);
        assert!(!model.get_uidata().show_help);
    }

    #[test]
    fn reload_drops_cache_and_requests_loading() {
        let mut model = fixture_model();
        send(&mut model, &[Message::Reload]);
        assert_eq!(model.status, Status::LOADING);
        assert!(!model.cache.is_cached(&model.source.key()));
        model.load_data().unwrap();
        assert_eq!(model.status, Status::READY);
        send(&mut model, &[Message::Quit]);
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn timed_out_fetch_shows_errors_and_no_table_or_chart() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_secs(3));
                drop(stream);
            }
        });
        let config = DashConfig::default()
            .endpoint(format!("http://{addr}/api/3/action/datastore_search"))
            .timeout(Duration::from_millis(200));
        let mut model = Model::init(&config, 160, 48);
        model.load_data().unwrap();

        let ui = model.get_uidata();
        assert_eq!(model.status, Status::FAILED);
        assert_eq!(ui.errors.len(), 2);
        assert!(ui.errors[0].starts_with("Error connecting to the API"));
        assert_eq!(ui.errors[1], NO_DATA_MESSAGE);
        assert!(ui.table.is_empty());
        assert!(ui.histogram.is_empty());
        assert!(ui.region.is_none() && ui.comuna.is_none());

        // navigation is ignored while there is no data
        send(&mut model, &[Message::MoveDown, Message::Select]);
        assert_eq!(model.status, Status::FAILED);
    }

    fn snapshot_model(body: &str) -> Model {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        let config = DashConfig::default().source_file(Some(file.path().to_path_buf()));
        let mut model = Model::init(&config, 160, 48);
        model.load_data().unwrap();
        model
    }

    #[test]
    fn frame_without_filter_columns_charts_first_column() {
        let model = snapshot_model(
            r#"{"result": {"records": [{"Tipo": "a", "N": 1}, {"Tipo": "a", "N": 2}]}}"#,
        );
        let ui = model.get_uidata();
        assert!(ui.region.is_none() && ui.comuna.is_none());
        assert_eq!(ui.focus, Pane::TABLE);
        assert_eq!(ui.nrows, 2);
        assert_eq!(ui.chart_column, 0);
        assert_eq!(ui.histogram, vec![("a".to_string(), 2)]);
    }

    #[test]
    fn region_column_without_values_filters_every_row() {
        let mut model = snapshot_model(
            r#"{"result": {"records": [{"Region": null, "Comuna": "A"}, {"Region": null, "Comuna": "B"}]}}"#,
        );
        assert_eq!(model.status, Status::READY);
        let ui = model.get_uidata();
        let region = ui.region.as_ref().unwrap();
        assert!(region.options.is_empty());
        assert!(ui.comuna.as_ref().unwrap().options.is_empty());
        assert_eq!(ui.nrows, 0);
        assert!(ui.histogram.is_empty());

        // an empty list takes navigation without moving anything
        send(&mut model, &[Message::MoveDown, Message::Select, Message::MovePageDown]);
        assert_eq!(model.get_uidata().nrows, 0);
    }

    #[test]
    fn page_moves_by_the_focused_pane_height() {
        let mut model = fixture_model();
        // 48 rows: sidebar 28 inside its border, region list 3 options + border
        model.focus = Pane::REGION;
        assert_eq!(model.page_size(), 3);
        model.focus = Pane::COMUNA;
        assert_eq!(model.page_size(), 21);
        model.focus = Pane::COLUMN;
        assert_eq!(model.page_size(), CHART_HEIGHT - 2);
        model.focus = Pane::TABLE;
        assert_eq!(model.page_size(), model.table.height);
        assert_ne!(model.page_size(), CHART_HEIGHT - 2);
    }
}
