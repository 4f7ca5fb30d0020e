// src/pipeline.rs
//
// End-to-end jobs behind the CLI subcommands. Every input is checked before
// anything is written. A job's outputs are all fully written to temp files
// before any of them is renamed into place.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument};

use crate::config::{load_config, SheetConfig, WorkbookConfig};
use crate::error::{require_input, InputKind, PipelineError};
use crate::extract::{parse_sheet, IndicatorRecord};
use crate::geo::{join_records, BoundaryFields, BoundarySpec, GeoIndexSet, Joiner, NormalizedRow};
use crate::report::{JoinReport, RunReport, SheetReport};
use crate::sheet::{Sheet, SheetSource, Workbook};
use crate::table::{self, PendingFile, TableFormat};

/// Records of every configured sheet, in configuration order.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<IndicatorRecord>,
    pub reports: Vec<SheetReport>,
}

/// Load each configured sheet from `source`, then parse them. With
/// `threads > 1` sheets are parsed on a dedicated rayon pool; output order
/// is the configuration order either way.
pub fn extract_from_source<S: SheetSource>(
    source: &mut S,
    config: &WorkbookConfig,
    threads: usize,
) -> Result<Extraction> {
    // 1) read every sheet up front; a missing sheet aborts the run
    let sheets = config
        .sheets
        .iter()
        .map(|c| {
            source
                .load_sheet(&c.name)
                .with_context(|| format!("loading sheet `{}`", c.name))
        })
        .collect::<Result<Vec<_>>>()?;

    // 2) parse
    let parse = |(sheet, cfg): (&Sheet, &SheetConfig)| {
        parse_sheet(sheet, cfg, &config.section_headers, &config.geography)
    };
    let parsed: Vec<(Vec<IndicatorRecord>, SheetReport)> = if threads <= 1 {
        sheets.iter().zip(&config.sheets).map(parse).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("building sheet parser pool")?;
        pool.install(|| {
            sheets
                .par_iter()
                .zip(config.sheets.par_iter())
                .map(parse)
                .collect()
        })
    };

    // 3) concatenate
    let mut extraction = Extraction::default();
    for (records, report) in parsed {
        extraction.records.extend(records);
        extraction.reports.push(report);
    }
    Ok(extraction)
}

/// Parse `workbook` as described by the config at `config_path`.
#[instrument(level = "info", skip_all, fields(workbook = %workbook.display()))]
pub fn extract(
    workbook: &Path,
    config_path: &Path,
    threads: usize,
) -> Result<(WorkbookConfig, Extraction)> {
    require_input(InputKind::Workbook, workbook)?;
    require_input(InputKind::Config, config_path)?;
    let config = load_config(config_path)?;
    let mut book = Workbook::open(workbook)?;
    let extraction = extract_from_source(&mut book, &config, threads)?;
    Ok((config, extraction))
}

/// Expand staged-table arguments. Existing files are taken as-is, anything
/// else is treated as a glob pattern whose matches are taken in sorted
/// order. An argument matching nothing is a missing input.
pub fn resolve_staged_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let direct = Path::new(pattern);
        if direct.is_file() {
            paths.push(direct.to_path_buf());
            continue;
        }
        let mut matched: Vec<PathBuf> = glob::glob(pattern)
            .with_context(|| format!("bad staged table pattern `{pattern}`"))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        if matched.is_empty() {
            return Err(PipelineError::MissingInput {
                kind: InputKind::StagedTable,
                path: direct.to_path_buf(),
            }
            .into());
        }
        matched.sort();
        paths.extend(matched);
    }
    Ok(paths)
}

/// Check every boundary file exists, then build the per-version indexes.
pub fn load_indexes(specs: &[BoundarySpec], fields: &BoundaryFields) -> Result<GeoIndexSet> {
    for spec in specs {
        require_input(InputKind::Boundary, &spec.path)?;
    }
    GeoIndexSet::load(specs, fields)
}

/// Join staged tables, in order, against `indexes`. Staged rows without a
/// `geo_version` are taken to belong to `default_version`.
pub fn join_staged(
    paths: &[PathBuf],
    indexes: &GeoIndexSet,
    default_version: &str,
) -> Result<(Vec<NormalizedRow>, JoinReport)> {
    let mut joiner = Joiner::new(indexes);
    for path in paths {
        let (records, missing) = table::csv::read_staged(path, default_version)?;
        info!(path = %path.display(), records = records.len(), missing, "staged table read");
        joiner.note_missing_values(missing);
        for record in &records {
            joiner.push(record);
        }
    }
    Ok(joiner.finish())
}

/// What a job wrote.
#[derive(Debug)]
pub struct Outcome {
    pub rows: usize,
    pub output: PathBuf,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub workbook: PathBuf,
    pub config: PathBuf,
    /// Overrides the config's `output`.
    pub output: Option<PathBuf>,
    pub threads: usize,
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct JoinJob {
    pub values: Vec<String>,
    pub boundaries: Vec<BoundarySpec>,
    pub fields: BoundaryFields,
    pub default_version: String,
    pub output: PathBuf,
    pub format: TableFormat,
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunJob {
    pub workbook: PathBuf,
    pub config: PathBuf,
    pub boundaries: Vec<BoundarySpec>,
    pub fields: BoundaryFields,
    /// Also write the parser-stage table here.
    pub staging: Option<PathBuf>,
    pub output: PathBuf,
    pub format: TableFormat,
    pub threads: usize,
    pub report: Option<PathBuf>,
}

/// Parser stage only: workbook → staged table.
pub fn run_extract(job: &ExtractJob) -> Result<Outcome> {
    let start = Instant::now();
    let (config, extraction) = extract(&job.workbook, &job.config, job.threads)?;
    let output = job
        .output
        .clone()
        .or_else(|| config.output.clone())
        .ok_or_else(|| anyhow!("no output path: pass --output or set `output` in the config"))?;
    let mut pending = vec![table::csv::stage_table(&output, &extraction.records)?];
    let report = RunReport {
        sheets: extraction.reports,
        join: None,
    };
    if let Some(path) = &job.report {
        pending.push(report.stage(path)?);
    }
    commit(pending, start)?;
    Ok(Outcome {
        rows: extraction.records.len(),
        output,
        report,
    })
}

/// Joiner only: staged tables → final table.
pub fn run_join(job: &JoinJob) -> Result<Outcome> {
    let start = Instant::now();
    let paths = resolve_staged_inputs(&job.values)?;
    let indexes = load_indexes(&job.boundaries, &job.fields)?;
    let (rows, join) = join_staged(&paths, &indexes, &job.default_version)?;
    let mut pending = vec![table::stage_normalized(&job.output, &rows, job.format)?];
    let report = RunReport {
        sheets: Vec::new(),
        join: Some(join),
    };
    if let Some(path) = &job.report {
        pending.push(report.stage(path)?);
    }
    commit(pending, start)?;
    Ok(Outcome {
        rows: rows.len(),
        output: job.output.clone(),
        report,
    })
}

/// Whole pipeline in memory: workbook → final table.
pub fn run_all(job: &RunJob) -> Result<Outcome> {
    let start = Instant::now();
    for spec in &job.boundaries {
        require_input(InputKind::Boundary, &spec.path)?;
    }
    let (_, extraction) = extract(&job.workbook, &job.config, job.threads)?;
    let indexes = load_indexes(&job.boundaries, &job.fields)?;
    let (rows, join) = join_records(&extraction.records, &indexes);
    let mut pending = vec![table::stage_normalized(&job.output, &rows, job.format)?];
    if let Some(staging) = &job.staging {
        pending.push(table::csv::stage_table(staging, &extraction.records)?);
    }
    let report = RunReport {
        sheets: extraction.reports,
        join: Some(join),
    };
    if let Some(path) = &job.report {
        pending.push(report.stage(path)?);
    }
    commit(pending, start)?;
    Ok(Outcome {
        rows: rows.len(),
        output: job.output.clone(),
        report,
    })
}

/// Rename every staged output into place once all of them are written.
fn commit(pending: Vec<PendingFile>, start: Instant) -> Result<()> {
    let paths: Vec<PathBuf> = pending.iter().map(|p| p.path().to_path_buf()).collect();
    table::persist_all(pending)?;
    for path in &paths {
        info!(path = %path.display(), "wrote output");
    }
    info!(elapsed = ?start.elapsed(), "done");
    Ok(())
}
