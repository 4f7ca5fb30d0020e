// src/table/mod.rs
//
// Tabular outputs. Every file is written to a sibling temp file first and
// renamed into place, so a failed run never leaves a partial table behind.
// Jobs with several outputs stage all of them before renaming any.

pub mod csv;
pub mod parquet;

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::geo::NormalizedRow;

/// Written ahead of every CSV so spreadsheet tools pick UTF-8 for the
/// Vietnamese text.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A row type with a fixed column order.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableFormat {
    #[default]
    Csv,
    Parquet,
}

impl TableFormat {
    /// `.parquet` paths are Parquet, anything else CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => TableFormat::Parquet,
            _ => TableFormat::Csv,
        }
    }
}

/// Text form of a value: integral values without a fractional part
/// (`10`, not `10.0`), everything else in shortest round-trip form.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// `serialize_with` hook applying [`format_value`].
pub fn serialize_value<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_value(*value))
}

/// A fully written temp file next to its destination. Dropping it without
/// [`PendingFile::persist`] deletes the temp file.
#[derive(Debug)]
pub struct PendingFile {
    tmp: NamedTempFile,
    path: PathBuf,
}

impl PendingFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temp file over the destination.
    pub fn persist(self) -> Result<()> {
        let PendingFile { tmp, path } = self;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("renaming into {}", path.display()))?;
        debug!(path = %path.display(), "persisted");
        Ok(())
    }
}

/// Run `write` against a temp file next to `path` and sync it, leaving
/// `path` untouched. Parent directories are created as needed.
pub fn stage_file<F>(path: &Path, write: F) -> Result<PendingFile>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating directory {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut()
        .sync_all()
        .with_context(|| format!("syncing {}", tmp.path().display()))?;
    Ok(PendingFile {
        tmp,
        path: path.to_path_buf(),
    })
}

/// Rename every staged output into place, in order.
pub fn persist_all(pending: Vec<PendingFile>) -> Result<()> {
    for file in pending {
        file.persist()?;
    }
    Ok(())
}

/// Stage the joined table in `format`.
pub fn stage_normalized(
    path: &Path,
    rows: &[NormalizedRow],
    format: TableFormat,
) -> Result<PendingFile> {
    let pending = match format {
        TableFormat::Csv => csv::stage_table(path, rows)?,
        TableFormat::Parquet => parquet::stage_normalized(path, rows)?,
    };
    debug!(rows = rows.len(), path = %path.display(), ?format, "staged normalized table");
    Ok(pending)
}
