// src/report.rs
//
// Counts of everything the pipeline drops or cannot resolve. Reporting never
// changes the produced table; it only makes the drops observable.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use crate::table::{stage_file, PendingFile};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    pub geo_version: String,
    pub rows_scanned: usize,
    pub records: usize,
    pub section_rows: usize,
    pub parent_rows: usize,
    pub skipped_rows: usize,
    /// Rows with numbers but no label to attribute them to.
    pub unlabeled_numeric_rows: usize,
    /// Rows whose own year cell did not parse (per-row-year layout).
    pub unparseable_year_rows: usize,
    /// 1-based columns holding numbers that no header mapped.
    pub unresolved_columns: BTreeSet<usize>,
    /// Non-blank, non-numeric cells in mapped columns of data rows.
    pub non_numeric_cells: usize,
    /// 1-based row at which three blank rows in a row ended the scan.
    pub stopped_at_row: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub input_records: usize,
    pub joined: usize,
    /// Staged rows whose value or year was empty or unparseable.
    pub missing_values: usize,
    /// Records whose geography version has no boundary index.
    pub unknown_version: usize,
    /// version → geography name as written (whitespace-normalized) → records dropped.
    pub unmatched: BTreeMap<String, BTreeMap<String, usize>>,
}

impl JoinReport {
    pub fn record_unmatched(&mut self, version: &str, key: &str) {
        *self
            .unmatched
            .entry(version.to_owned())
            .or_default()
            .entry(key.to_owned())
            .or_insert(0) += 1;
    }

    pub fn unmatched_records(&self) -> usize {
        self.unmatched.values().flat_map(BTreeMap::values).sum()
    }

    pub fn dropped(&self) -> usize {
        self.unmatched_records() + self.unknown_version + self.missing_values
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub sheets: Vec<SheetReport>,
    pub join: Option<JoinReport>,
}

impl RunReport {
    /// Write as pretty JSON, replacing `path` only once fully written.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.stage(path)?.persist()
    }

    /// [`RunReport::write`] without the final rename.
    pub fn stage<P: AsRef<Path>>(&self, path: P) -> Result<PendingFile> {
        let path = path.as_ref();
        stage_file(path, |file| {
            serde_json::to_writer_pretty(&mut *file, self).context("serializing run report")?;
            file.write_all(b"\n")?;
            Ok(())
        })
        .with_context(|| format!("writing report {}", path.display()))
    }
}
