// src/extract/layout.rs

use super::header::{
    metric_columns, year_columns, year_metric_map, BlockColumns, MatrixColumn, MetricColumn,
};
use crate::config::{Layout, SheetConfig};
use crate::sheet::{cell_at, text::year_of, Cell, Sheet};

/// One numeric cell paired with the year and metric it reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub metric: String,
    pub year: i32,
    pub value: f64,
}

/// A layout with its header maps resolved against one sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    YearSeries(Vec<BlockColumns>),
    FixedYearSingle {
        year: i32,
        metric: String,
        value_col: usize,
    },
    FixedYearMetrics {
        year: i32,
        columns: Vec<MetricColumn>,
        candidates: Vec<usize>,
    },
    RowYearMetrics {
        year_col: usize,
        columns: Vec<MetricColumn>,
        candidates: Vec<usize>,
    },
    YearMetricMatrix(Vec<MatrixColumn>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub strategy: Strategy,
    /// Columns the layout expected to read but whose headers did not resolve.
    pub unresolved: Vec<usize>,
}

impl ResolvedLayout {
    pub fn resolve(config: &SheetConfig, sheet: &Sheet) -> Self {
        let labels = &config.label_cols;
        match &config.layout {
            Layout::YearSeries { year_row, blocks } => {
                let header = year_row.map_or(&[][..], |r| sheet.row(r));
                let resolved: Vec<BlockColumns> =
                    blocks.iter().map(|b| year_columns(header, b)).collect();
                let unresolved = blocks
                    .iter()
                    .zip(&resolved)
                    .filter(|(block, _)| block.start_col.is_some() || block.end_col.is_some())
                    .flat_map(|(block, found)| {
                        let end = block.end_col.map_or(header.len(), |e| (e + 1).min(header.len()));
                        (block.start_col.unwrap_or(0)..end)
                            .filter(move |col| !found.columns.iter().any(|c| c.col == *col))
                    })
                    .collect();
                Self {
                    strategy: Strategy::YearSeries(resolved),
                    unresolved,
                }
            }
            Layout::FixedYearSingle {
                year,
                metric,
                value_col,
            } => Self {
                strategy: Strategy::FixedYearSingle {
                    year: *year,
                    metric: metric.clone(),
                    value_col: *value_col,
                },
                unresolved: Vec::new(),
            },
            Layout::FixedYearMetrics { year, metric_row } => {
                let header = sheet.row(*metric_row);
                let candidates: Vec<usize> =
                    (0..header.len()).filter(|c| !labels.contains(c)).collect();
                let columns = metric_columns(header, labels, &config.metric_aliases);
                Self {
                    unresolved: unlabeled(&candidates, &columns),
                    strategy: Strategy::FixedYearMetrics {
                        year: *year,
                        columns,
                        candidates,
                    },
                }
            }
            Layout::RowYearMetrics {
                year_col,
                metric_row,
            } => {
                let header = sheet.row(*metric_row);
                let mut excluded = labels.clone();
                excluded.push(*year_col);
                let candidates: Vec<usize> =
                    (0..header.len()).filter(|c| !excluded.contains(c)).collect();
                let columns = metric_columns(header, &excluded, &config.metric_aliases);
                Self {
                    unresolved: unlabeled(&candidates, &columns),
                    strategy: Strategy::RowYearMetrics {
                        year_col: *year_col,
                        columns,
                        candidates,
                    },
                }
            }
            Layout::YearMetricMatrix {
                year_row,
                metric_row,
                metric_row_fallback,
            } => {
                let years = sheet.row(*year_row);
                let mapped = year_metric_map(
                    years,
                    sheet.row(*metric_row),
                    metric_row_fallback.map(|r| sheet.row(r)),
                    &config.metric_aliases,
                );
                // everything right of the first year header is expected to map
                let first_year = (0..years.len()).find(|c| year_of(cell_at(years, *c)).is_some());
                let unresolved = first_year
                    .map(|start| {
                        (start..sheet.width())
                            .filter(|c| !labels.contains(c) && Some(*c) != config.parent_label_col)
                            .filter(|c| !mapped.iter().any(|m| m.col == *c))
                            .collect()
                    })
                    .unwrap_or_default();
                Self {
                    strategy: Strategy::YearMetricMatrix(mapped),
                    unresolved,
                }
            }
        }
    }

    /// Row labels may be inherited from the previous data row (visually
    /// merged label cells) only in the per-row-year layout.
    pub fn inherits_labels(&self) -> bool {
        matches!(self.strategy, Strategy::RowYearMetrics { .. })
    }

    /// Whether `row` holds a number in a column this layout reads; rows
    /// without one are structural markers, not data.
    pub fn has_numeric(&self, row: &[Cell]) -> bool {
        let numeric = |col: usize| cell_at(row, col).is_number();
        match &self.strategy {
            Strategy::YearSeries(blocks) => blocks
                .iter()
                .flat_map(|b| &b.columns)
                .any(|c| numeric(c.col)),
            Strategy::FixedYearSingle { value_col, .. } => numeric(*value_col),
            Strategy::FixedYearMetrics { candidates, .. }
            | Strategy::RowYearMetrics { candidates, .. } => {
                candidates.iter().any(|c| numeric(*c))
            }
            Strategy::YearMetricMatrix(columns) => columns.iter().any(|c| numeric(c.col)),
        }
    }

    /// Columns whose cells turn into observations.
    pub fn mapped_columns(&self) -> Vec<usize> {
        match &self.strategy {
            Strategy::YearSeries(blocks) => blocks
                .iter()
                .flat_map(|b| b.columns.iter().map(|c| c.col))
                .collect(),
            Strategy::FixedYearSingle { value_col, .. } => vec![*value_col],
            Strategy::FixedYearMetrics { columns, .. }
            | Strategy::RowYearMetrics { columns, .. } => columns.iter().map(|c| c.col).collect(),
            Strategy::YearMetricMatrix(columns) => columns.iter().map(|c| c.col).collect(),
        }
    }

    /// Observations carried by a data row. `None` means the row names its
    /// own year and that year cell does not parse, so the row is skipped.
    pub fn observe(&self, row: &[Cell]) -> Option<Vec<Observation>> {
        match &self.strategy {
            Strategy::YearSeries(blocks) => Some(year_series(blocks, row)),
            Strategy::FixedYearSingle {
                year,
                metric,
                value_col,
            } => Some(fixed_year_single(*year, metric, *value_col, row)),
            Strategy::FixedYearMetrics { year, columns, .. } => {
                Some(fixed_year_metrics(*year, columns, row))
            }
            Strategy::RowYearMetrics {
                year_col, columns, ..
            } => row_year_metrics(*year_col, columns, row),
            Strategy::YearMetricMatrix(columns) => Some(year_metric_matrix(columns, row)),
        }
    }
}

fn unlabeled(candidates: &[usize], columns: &[MetricColumn]) -> Vec<usize> {
    candidates
        .iter()
        .copied()
        .filter(|c| !columns.iter().any(|m| m.col == *c))
        .collect()
}

/// One observation per year column holding a number, block by block.
pub fn year_series(blocks: &[BlockColumns], row: &[Cell]) -> Vec<Observation> {
    blocks
        .iter()
        .flat_map(|block| {
            block.columns.iter().filter_map(move |c| {
                cell_at(row, c.col).as_number().map(|value| Observation {
                    metric: block.metric.clone(),
                    year: c.year,
                    value,
                })
            })
        })
        .collect()
}

/// At most one observation, from the configured value column.
pub fn fixed_year_single(
    year: i32,
    metric: &str,
    value_col: usize,
    row: &[Cell],
) -> Vec<Observation> {
    cell_at(row, value_col)
        .as_number()
        .map(|value| Observation {
            metric: metric.to_owned(),
            year,
            value,
        })
        .into_iter()
        .collect()
}

/// One observation per labeled metric column, all under the constant year.
pub fn fixed_year_metrics(year: i32, columns: &[MetricColumn], row: &[Cell]) -> Vec<Observation> {
    metric_fan_out(columns, year, row)
}

/// Like [`fixed_year_metrics`] but the year comes from the row itself.
pub fn row_year_metrics(
    year_col: usize,
    columns: &[MetricColumn],
    row: &[Cell],
) -> Option<Vec<Observation>> {
    let year = year_of(cell_at(row, year_col))?;
    Some(metric_fan_out(columns, year, row))
}

/// One observation per mapped (year, metric) column holding a number.
pub fn year_metric_matrix(columns: &[MatrixColumn], row: &[Cell]) -> Vec<Observation> {
    columns
        .iter()
        .filter_map(|c| {
            cell_at(row, c.col).as_number().map(|value| Observation {
                metric: c.metric.clone(),
                year: c.year,
                value,
            })
        })
        .collect()
}

fn metric_fan_out(columns: &[MetricColumn], year: i32, row: &[Cell]) -> Vec<Observation> {
    columns
        .iter()
        .filter_map(|c| {
            cell_at(row, c.col).as_number().map(|value| Observation {
                metric: c.metric.clone(),
                year,
                value,
            })
        })
        .collect()
}
