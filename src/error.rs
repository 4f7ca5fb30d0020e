// src/error.rs

use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Which input a [`PipelineError::MissingInput`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Workbook,
    Config,
    Boundary,
    StagedTable,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::Workbook => "workbook",
            InputKind::Config => "config",
            InputKind::Boundary => "boundary",
            InputKind::StagedTable => "staged table",
        };
        f.write_str(name)
    }
}

/// Fatal conditions. Anything recoverable (unmapped columns, text in a
/// numeric cell, unknown geography) is counted in the run report instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{kind} input not found: {}", path.display())]
    MissingInput { kind: InputKind, path: PathBuf },

    #[error("sheet `{0}` is not present in the workbook")]
    MissingSheet(String),

    #[error("sheet `{sheet}`: {reason}")]
    InvalidSheetConfig { sheet: String, reason: String },

    #[error("boundary `{0}` must be given as VERSION=PATH")]
    InvalidBoundaryArg(String),
}

/// Fail with [`PipelineError::MissingInput`] unless `path` is an existing file.
pub fn require_input(kind: InputKind, path: impl Into<PathBuf>) -> Result<(), PipelineError> {
    let path = path.into();
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput { kind, path })
    }
}
