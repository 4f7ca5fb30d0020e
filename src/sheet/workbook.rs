// src/sheet/workbook.rs

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::NaiveDateTime;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

use super::{Cell, Sheet, SheetSource};
use crate::error::PipelineError;

/// A workbook on disk (xlsx, xlsm, xlsb, xls or ods), read with cached
/// formula results rather than formulas.
pub struct Workbook {
    path: PathBuf,
    inner: Sheets<BufReader<File>>,
}

impl Workbook {
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = open_workbook_auto(&path)
            .with_context(|| format!("opening workbook {}", path.display()))?;
        debug!(sheets = inner.sheet_names().len(), "workbook opened");
        Ok(Self { path, inner })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names()
    }
}

impl SheetSource for Workbook {
    fn load_sheet(&mut self, name: &str) -> Result<Sheet> {
        if !self.inner.sheet_names().iter().any(|n| n == name) {
            return Err(PipelineError::MissingSheet(name.to_owned()).into());
        }
        let range = self
            .inner
            .worksheet_range(name)
            .with_context(|| format!("reading sheet `{}` of {}", name, self.path.display()))?;
        Ok(sheet_from_range(name, &range))
    }
}

/// Lay a calamine range out on absolute coordinates. A range that starts at
/// C4 still yields a sheet whose row 0 is the workbook's row 1.
pub fn sheet_from_range(name: &str, range: &Range<Data>) -> Sheet {
    let (Some(start), Some(end)) = (range.start(), range.end()) else {
        return Sheet::new(name, Vec::new());
    };
    let height = end.0 as usize + 1;
    let width = end.1 as usize + 1;
    let mut rows = vec![vec![Cell::Empty; width]; height];
    for (r, c, value) in range.cells() {
        let (row, col) = (start.0 as usize + r, start.1 as usize + c);
        if let Some(slot) = rows.get_mut(row).and_then(|cells| cells.get_mut(col)) {
            *slot = cell_from_data(value);
        }
    }
    Sheet::new(name, rows)
}

fn cell_from_data(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Bool(*b),
        // dates render as text so a date-typed year header still carries its year
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Cell::Text(render_datetime(ts)),
            None => Cell::Text(dt.as_f64().to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Error(e.to_string()),
    }
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn render_datetime(ts: NaiveDateTime) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}
