// src/sheet/mod.rs

pub mod text;
pub mod workbook;

use anyhow::Result;
use std::collections::BTreeMap;

use crate::error::PipelineError;
use crate::table::format_value;

pub use workbook::Workbook;

/// A single cell value as the parser sees it. Only [`Cell::Number`] counts
/// as numeric content; text, booleans and formula errors never do.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn is_number(&self) -> bool {
        matches!(self, Cell::Number(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Normalized display text (see [`text::normalize_text`]); empty for blanks.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => format_value(*n),
            Cell::Text(s) => text::normalize_text(s),
            Cell::Bool(b) => b.to_string(),
            Cell::Error(e) => text::normalize_text(e),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Number(f64::from(value))
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_owned())
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Empty, Into::into)
    }
}

/// A worksheet as a dense grid addressed by absolute 0-based (row, column).
/// Every row is padded to the sheet width, so a header row spans all columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl Sheet {
    pub fn new(name: impl Into<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, Cell::Empty);
        }
        Self {
            name: name.into(),
            rows,
            width,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Row `idx`, or an empty slice past the last row.
    pub fn row(&self, idx: usize) -> &[Cell] {
        self.rows.get(idx).map_or(&[], Vec::as_slice)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        cell_at(self.row(row), col)
    }
}

/// Cell `col` of `row`, treating anything past the end as empty.
pub fn cell_at(row: &[Cell], col: usize) -> &Cell {
    row.get(col).unwrap_or(&EMPTY)
}

/// Anything that can hand out worksheets by name.
pub trait SheetSource {
    fn load_sheet(&mut self, name: &str) -> Result<Sheet>;
}

impl SheetSource for BTreeMap<String, Sheet> {
    fn load_sheet(&mut self, name: &str) -> Result<Sheet> {
        self.get(name)
            .cloned()
            .ok_or_else(|| PipelineError::MissingSheet(name.to_owned()).into())
    }
}
