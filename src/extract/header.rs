// src/extract/header.rs
//
// Column → (year, metric) maps, resolved once per sheet from its header rows.
// Columns whose header yields nothing usable are left out, never defaulted.

use crate::config::{Block, MetricAliases};
use crate::sheet::{cell_at, text::year_of, Cell};

/// A column whose year header parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearColumn {
    pub col: usize,
    pub year: i32,
}

/// The year columns found inside one block, reported under its metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockColumns {
    pub metric: String,
    pub columns: Vec<YearColumn>,
}

/// A column whose metric header resolved to a canonical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricColumn {
    pub col: usize,
    pub metric: String,
}

/// A column of a year × metric matrix header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixColumn {
    pub col: usize,
    pub year: i32,
    pub metric: String,
}

/// Year columns of `year_row` within the block's range (whole row when the
/// block is unbounded), left to right.
pub fn year_columns(year_row: &[Cell], block: &Block) -> BlockColumns {
    let start = block.start_col.unwrap_or(0);
    let end = block
        .end_col
        .map_or(year_row.len(), |end| (end + 1).min(year_row.len()));
    let columns = (start..end)
        .filter_map(|col| year_of(cell_at(year_row, col)).map(|year| YearColumn { col, year }))
        .collect();
    BlockColumns {
        metric: block.metric.clone(),
        columns,
    }
}

/// Columns of `metric_row` that carry a metric label, skipping `excluded`.
pub fn metric_columns(
    metric_row: &[Cell],
    excluded: &[usize],
    aliases: &MetricAliases,
) -> Vec<MetricColumn> {
    (0..metric_row.len())
        .filter(|col| !excluded.contains(col))
        .filter_map(|col| {
            let metric = aliases.resolve(&cell_at(metric_row, col).text());
            (!metric.is_empty()).then_some(MetricColumn { col, metric })
        })
        .collect()
}

/// Pair a sparse year row with a metric row.
///
/// Year cells are only filled where the year changes, so the last year seen
/// carries forward across blank cells. A blank metric cell falls back to the
/// same column of `fallback_row`. A column is mapped only once both a year
/// and a metric label are known for it.
pub fn year_metric_map(
    year_row: &[Cell],
    metric_row: &[Cell],
    fallback_row: Option<&[Cell]>,
    aliases: &MetricAliases,
) -> Vec<MatrixColumn> {
    let width = year_row
        .len()
        .max(metric_row.len())
        .max(fallback_row.map_or(0, <[Cell]>::len));
    let mut current_year = None;
    let mut mapped = Vec::new();
    for col in 0..width {
        if let Some(year) = year_of(cell_at(year_row, col)) {
            current_year = Some(year);
        }
        let mut label = cell_at(metric_row, col).text();
        if label.is_empty() {
            if let Some(fallback) = fallback_row {
                label = cell_at(fallback, col).text();
            }
        }
        if let (Some(year), false) = (current_year, label.is_empty()) {
            mapped.push(MatrixColumn {
                col,
                year,
                metric: aliases.resolve(&label),
            });
        }
    }
    mapped
}
