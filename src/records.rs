use polars::prelude::*;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::domain::{COMUNA_COLUMN, REGION_COLUMN};

/// Marker rendered for null cells.
pub const NULL_CELL: &str = "∅";

/// A column of the record collection, pre-rendered as display strings.
#[derive(Debug, Clone)]
pub struct Column {
    pub idx: usize,
    pub name: String,
    pub max_width: usize,
    pub data: Vec<String>,
}

impl Column {
    pub fn as_string(&self) -> String {
        format!(
            "{} \"{}\", width_max: {}, # rows {}",
            self.idx,
            self.name,
            self.max_width,
            self.data.len(),
        )
    }
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn string_column(df: &DataFrame, name: &str) -> PolarsResult<polars::prelude::Column> {
    df.column(name)?.cast(&DataType::String)
}

/// Cast every column to `String` so filters and counts see one cell type.
pub fn stringify_columns(df: &DataFrame) -> PolarsResult<DataFrame> {
    let columns: PolarsResult<Vec<polars::prelude::Column>> = df
        .get_columns()
        .par_iter()
        .map(|c| c.cast(&DataType::String))
        .collect();
    DataFrame::new(columns?)
}

/// Lowercase all column labels. When two labels collide after lowercasing the
/// first column keeps the name and the later ones are dropped.
pub fn normalize_columns(df: &DataFrame) -> PolarsResult<DataFrame> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = column.name().as_str().to_lowercase();
        if !seen.insert(name.clone()) {
            debug!("Dropping column \"{}\", it collides with \"{name}\"", column.name());
            continue;
        }
        let mut column = column.clone();
        column.rename(name.into());
        columns.push(column);
    }
    DataFrame::new(columns)
}

/// Distinct non-null values of a column in sorted order. Empty if the column is absent.
pub fn distinct_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<String>> {
    if !has_column(df, name) {
        return Ok(Vec::new());
    }
    let column = string_column(df, name)?;
    let mut values: Vec<String> = column
        .str()?
        .into_iter()
        .flatten()
        .collect::<HashSet<&str>>()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    values.sort_unstable();
    Ok(values)
}

fn filter_by(df: &DataFrame, name: &str, keep: impl Fn(&str) -> bool) -> PolarsResult<DataFrame> {
    let column = string_column(df, name)?;
    let mask: Vec<bool> = column
        .str()?
        .into_iter()
        .map(|v| v.is_some_and(&keep))
        .collect();
    df.filter(&BooleanChunked::from_slice("mask".into(), &mask))
}

/// Keep rows whose `region` equals the selected value.
/// Pass-through when the column is missing. With the column present but
/// nothing selected no row matches.
pub fn filter_region(df: &DataFrame, region: Option<&str>) -> PolarsResult<DataFrame> {
    if !has_column(df, REGION_COLUMN) {
        return Ok(df.clone());
    }
    let filtered = filter_by(df, REGION_COLUMN, |v| Some(v) == region)?;
    trace!("Region filter {:?}: {} -> {} rows", region, df.height(), filtered.height());
    Ok(filtered)
}

/// Keep rows whose `comuna` is one of the selected values.
/// Pass-through when the selection is empty or the column is missing.
pub fn filter_comunas(df: &DataFrame, comunas: &[String]) -> PolarsResult<DataFrame> {
    if comunas.is_empty() || !has_column(df, COMUNA_COLUMN) {
        return Ok(df.clone());
    }
    let selected: HashSet<&str> = comunas.iter().map(|s| s.as_str()).collect();
    let filtered = filter_by(df, COMUNA_COLUMN, |v| selected.contains(v))?;
    trace!(
        "Comuna filter {:?}: {} -> {} rows",
        comunas,
        df.height(),
        filtered.height()
    );
    Ok(filtered)
}

/// Count occurrences of every non-null value, most frequent first.
/// Ties are ordered by value.
pub fn value_counts(df: &DataFrame, name: &str) -> PolarsResult<Vec<(String, usize)>> {
    if !has_column(df, name) {
        return Ok(Vec::new());
    }
    let column = string_column(df, name)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in column.str()?.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(v, c)| (v.to_string(), c))
        .collect();
    sorted.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(sorted)
}

/// Index of the column the chart starts with: `comuna` when present, else the first one.
pub fn default_chart_column(columns: &[String]) -> usize {
    columns
        .iter()
        .position(|c| c == COMUNA_COLUMN)
        .unwrap_or(0)
}

fn load_column(df: &DataFrame, idx: usize, name: &str) -> PolarsResult<Column> {
    let column = string_column(df, name)?;
    let series = column.str()?;
    let mut data = Vec::with_capacity(series.len());

    let mut max_width = 0;
    for value in series.into_iter() {
        let ss = match value {
            Some(s) => s.replace("\r\n", " ↵ ").replace('\n', " ↵ "),
            None => String::from(NULL_CELL),
        };
        max_width = std::cmp::max(max_width, ss.chars().count());
        data.push(ss);
    }

    Ok(Column {
        idx,
        name: name.to_string(),
        max_width,
        data,
    })
}

/// Render every column of the collection into display strings.
/// Each column is converted on its own rayon task.
pub fn load_columns(df: &DataFrame) -> PolarsResult<Vec<Column>> {
    let names = column_names(df);
    names
        .par_iter()
        .enumerate()
        .map(|(idx, name)| load_column(df, idx, name))
        .collect()
}
