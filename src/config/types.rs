// src/config/types.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::sheet::text::{fold_key, normalize_text};

const DEFAULT_METRIC: &str = "value";

/// The whole configuration document for one workbook.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkbookConfig {
    /// Default destination of the parser-stage table.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub section_headers: SectionHeaders,
    #[serde(default)]
    pub geography: GeoNaming,
    pub sheets: Vec<SheetConfig>,
}

/// Closed vocabulary of row labels that open a new section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct SectionHeaders(HashSet<String>);

impl SectionHeaders {
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(&fold_key(label))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for SectionHeaders {
    fn from(labels: Vec<String>) -> Self {
        Self(labels.iter().map(|l| fold_key(l)).collect())
    }
}

/// How a sheet name maps to a geography version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoNaming {
    pub default_version: String,
    pub alternate_version: String,
    /// Sheet-name suffix marking the alternate boundary set.
    pub alternate_suffix: String,
}

impl Default for GeoNaming {
    fn default() -> Self {
        Self {
            default_version: "old_63".to_owned(),
            alternate_version: "new_34".to_owned(),
            alternate_suffix: ".M".to_owned(),
        }
    }
}

impl GeoNaming {
    pub fn version_for(&self, sheet_name: &str) -> &str {
        if !self.alternate_suffix.is_empty() && sheet_name.ends_with(&self.alternate_suffix) {
            &self.alternate_version
        } else {
            &self.default_version
        }
    }
}

/// Raw header text → canonical metric name, matched on [`fold_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricAliases(BTreeMap<String, String>);

impl MetricAliases {
    /// Canonical name for a header label: its alias if one matches, the
    /// normalized label otherwise. Empty labels stay empty.
    pub fn resolve(&self, label: &str) -> String {
        let label = normalize_text(label);
        if label.is_empty() {
            return label;
        }
        self.0.get(&fold_key(&label)).cloned().unwrap_or(label)
    }
}

impl From<BTreeMap<String, String>> for MetricAliases {
    fn from(raw: BTreeMap<String, String>) -> Self {
        Self(raw.into_iter().map(|(k, v)| (fold_key(&k), v)).collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    #[default]
    YearSeries,
    FixedYearSingle,
    FixedYearMetrics,
    RowYearMetrics,
    YearMetricMatrix,
}

/// A contiguous column range reported under one metric. Columns are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub metric: String,
    pub start_col: Option<usize>,
    pub end_col: Option<usize>,
}

/// Per-layout parameters. All row/column indices are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    YearSeries {
        year_row: Option<usize>,
        blocks: Vec<Block>,
    },
    FixedYearSingle {
        year: i32,
        metric: String,
        value_col: usize,
    },
    FixedYearMetrics {
        year: i32,
        metric_row: usize,
    },
    RowYearMetrics {
        year_col: usize,
        metric_row: usize,
    },
    YearMetricMatrix {
        year_row: usize,
        metric_row: usize,
        metric_row_fallback: Option<usize>,
    },
}

impl Layout {
    pub fn kind(&self) -> LayoutKind {
        match self {
            Layout::YearSeries { .. } => LayoutKind::YearSeries,
            Layout::FixedYearSingle { .. } => LayoutKind::FixedYearSingle,
            Layout::FixedYearMetrics { .. } => LayoutKind::FixedYearMetrics,
            Layout::RowYearMetrics { .. } => LayoutKind::RowYearMetrics,
            Layout::YearMetricMatrix { .. } => LayoutKind::YearMetricMatrix,
        }
    }
}

/// One sheet's extraction settings, validated and converted to 0-based
/// indices. Deserializes from the flat, 1-based form analysts write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSheetConfig")]
pub struct SheetConfig {
    pub name: String,
    pub indicator_code: String,
    /// Checked in order; the first non-empty one labels the row.
    pub label_cols: Vec<usize>,
    pub data_start_row: usize,
    pub parent_label_col: Option<usize>,
    pub metric_aliases: MetricAliases,
    pub layout: Layout,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBlock {
    metric: String,
    #[serde(default)]
    start_col: Option<usize>,
    #[serde(default)]
    end_col: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSheetConfig {
    name: String,
    #[serde(default)]
    layout: LayoutKind,
    label_cols: Vec<usize>,
    data_start_row: usize,
    #[serde(default)]
    year_row: Option<usize>,
    #[serde(default)]
    metric_row: Option<usize>,
    #[serde(default)]
    metric_row_fallback: Option<usize>,
    #[serde(default)]
    blocks: Vec<RawBlock>,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    parent_label_col: Option<usize>,
    #[serde(default)]
    fixed_year: Option<i32>,
    #[serde(default)]
    year_col: Option<usize>,
    #[serde(default)]
    value_col: Option<usize>,
    #[serde(default)]
    metric_aliases: BTreeMap<String, String>,
    #[serde(default)]
    indicator_code: Option<String>,
}

impl RawSheetConfig {
    fn invalid(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::InvalidSheetConfig {
            sheet: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn index(&self, field: &str, one_based: usize) -> Result<usize, PipelineError> {
        one_based
            .checked_sub(1)
            .ok_or_else(|| self.invalid(format!("`{field}` is 1-based and must be at least 1")))
    }

    fn optional_index(
        &self,
        field: &str,
        one_based: Option<usize>,
    ) -> Result<Option<usize>, PipelineError> {
        one_based.map(|v| self.index(field, v)).transpose()
    }

    fn required<T: Copy>(&self, field: &str, value: Option<T>) -> Result<T, PipelineError> {
        value.ok_or_else(|| {
            self.invalid(format!(
                "layout `{}` requires `{field}`",
                layout_name(self.layout)
            ))
        })
    }

    fn layout(&self) -> Result<Layout, PipelineError> {
        let metric = self
            .metric
            .clone()
            .unwrap_or_else(|| DEFAULT_METRIC.to_owned());
        let layout = match self.layout {
            LayoutKind::YearSeries => {
                let blocks = if self.blocks.is_empty() {
                    vec![Block {
                        metric,
                        start_col: None,
                        end_col: None,
                    }]
                } else {
                    self.blocks
                        .iter()
                        .map(|b| {
                            Ok(Block {
                                metric: b.metric.clone(),
                                start_col: self.optional_index("blocks.start_col", b.start_col)?,
                                end_col: self.optional_index("blocks.end_col", b.end_col)?,
                            })
                        })
                        .collect::<Result<Vec<_>, PipelineError>>()?
                };
                Layout::YearSeries {
                    year_row: self.optional_index("year_row", self.year_row)?,
                    blocks,
                }
            }
            LayoutKind::FixedYearSingle => Layout::FixedYearSingle {
                year: self.required("fixed_year", self.fixed_year)?,
                metric,
                value_col: self.index("value_col", self.required("value_col", self.value_col)?)?,
            },
            LayoutKind::FixedYearMetrics => Layout::FixedYearMetrics {
                year: self.required("fixed_year", self.fixed_year)?,
                metric_row: self
                    .index("metric_row", self.required("metric_row", self.metric_row)?)?,
            },
            LayoutKind::RowYearMetrics => Layout::RowYearMetrics {
                year_col: self.index("year_col", self.required("year_col", self.year_col)?)?,
                metric_row: self
                    .index("metric_row", self.required("metric_row", self.metric_row)?)?,
            },
            LayoutKind::YearMetricMatrix => Layout::YearMetricMatrix {
                year_row: self.index("year_row", self.required("year_row", self.year_row)?)?,
                metric_row: self
                    .index("metric_row", self.required("metric_row", self.metric_row)?)?,
                metric_row_fallback: self
                    .optional_index("metric_row_fallback", self.metric_row_fallback)?,
            },
        };
        Ok(layout)
    }
}

fn layout_name(kind: LayoutKind) -> &'static str {
    match kind {
        LayoutKind::YearSeries => "year_series",
        LayoutKind::FixedYearSingle => "fixed_year_single",
        LayoutKind::FixedYearMetrics => "fixed_year_metrics",
        LayoutKind::RowYearMetrics => "row_year_metrics",
        LayoutKind::YearMetricMatrix => "year_metric_matrix",
    }
}

impl TryFrom<RawSheetConfig> for SheetConfig {
    type Error = PipelineError;

    fn try_from(raw: RawSheetConfig) -> Result<Self, Self::Error> {
        if raw.label_cols.is_empty() {
            return Err(raw.invalid("`label_cols` must name at least one column"));
        }
        let label_cols = raw
            .label_cols
            .iter()
            .map(|c| raw.index("label_cols", *c))
            .collect::<Result<Vec<_>, _>>()?;
        let layout = raw.layout()?;
        Ok(SheetConfig {
            indicator_code: raw.indicator_code.clone().unwrap_or_else(|| raw.name.clone()),
            label_cols,
            data_start_row: raw.index("data_start_row", raw.data_start_row)?,
            parent_label_col: raw.optional_index("parent_label_col", raw.parent_label_col)?,
            metric_aliases: MetricAliases::from(raw.metric_aliases.clone()),
            layout,
            name: raw.name,
        })
    }
}
