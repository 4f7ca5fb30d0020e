// src/table/csv.rs

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{debug, instrument};

use super::{stage_file, PendingFile, TableRow, UTF8_BOM};
use crate::extract::IndicatorRecord;

/// Write `rows` as a BOM-prefixed UTF-8 CSV with a header row, replacing
/// `path` atomically.
pub fn write_table<R: TableRow>(path: &Path, rows: &[R]) -> Result<()> {
    stage_table(path, rows)?.persist()
}

/// [`write_table`] without the final rename.
#[instrument(level = "debug", skip(rows), fields(path = %path.display(), rows = rows.len()))]
pub fn stage_table<R: TableRow>(path: &Path, rows: &[R]) -> Result<PendingFile> {
    stage_file(path, |file| {
        file.write_all(UTF8_BOM)?;
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer.write_record(R::COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })
    .with_context(|| format!("writing table {}", path.display()))
}

/// Read every row of a CSV written by [`write_table`] (or by hand), matching
/// columns by header name. A leading BOM is ignored.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
    let mut reader = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(body);
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("parsing {}", path.display()))?;
    debug!(rows = rows.len(), path = %path.display(), "read table");
    Ok(rows)
}

/// A parser-stage row as read back from disk. Everything but the year and
/// value may be missing; those two decide whether the row survives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StagedRow {
    pub sheet: String,
    pub indicator_code: String,
    pub indicator_title: String,
    pub geo_name: String,
    pub geo_parent: String,
    pub section: String,
    pub metric: String,
    #[serde(deserialize_with = "::csv::invalid_option")]
    pub year: Option<i32>,
    #[serde(deserialize_with = "::csv::invalid_option")]
    pub value: Option<f64>,
    pub geo_version: Option<String>,
}

impl StagedRow {
    /// `None` when the year or value is empty or does not parse.
    /// A missing geography version falls back to `default_version`.
    pub fn into_record(self, default_version: &str) -> Option<IndicatorRecord> {
        let (Some(year), Some(value)) = (self.year, self.value) else {
            return None;
        };
        Some(IndicatorRecord {
            sheet: self.sheet,
            indicator_code: self.indicator_code,
            indicator_title: self.indicator_title,
            geo_name: self.geo_name,
            geo_parent: self.geo_parent,
            section: self.section,
            metric: self.metric,
            year,
            value,
            geo_version: self
                .geo_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default_version.to_owned()),
        })
    }
}

/// Staged rows from `path`, split into usable records and a count of rows
/// dropped for a missing year or value.
pub fn read_staged(path: &Path, default_version: &str) -> Result<(Vec<IndicatorRecord>, usize)> {
    let rows: Vec<StagedRow> = read_rows(path)?;
    let total = rows.len();
    let records: Vec<IndicatorRecord> = rows
        .into_iter()
        .filter_map(|row| row.into_record(default_version))
        .collect();
    let missing = total - records.len();
    Ok((records, missing))
}
