// src/main.rs

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use geostat::{
    geo::{BoundaryFields, BoundarySpec},
    pipeline::{self, ExtractJob, JoinJob, Outcome, RunJob},
    table::TableFormat,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Extract indicator values from statistical workbooks and attach province
/// geo codes.
#[derive(Debug, Parser)]
#[command(name = "geostat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a workbook into the staged table.
    Extract(ExtractArgs),
    /// Join staged tables against boundary files.
    Join(JoinArgs),
    /// Extract and join in one pass.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[arg(long)]
    workbook: PathBuf,
    /// Workbook configuration (.json, .yml or .yaml).
    #[arg(long)]
    config: PathBuf,
    /// Defaults to the config's `output`.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    threads: usize,
    /// Write drop counts and per-sheet diagnostics as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct BoundaryArgs {
    /// VERSION=PATH of a GeoJSON boundary file; repeat per version.
    #[arg(long = "boundary", required = true)]
    boundaries: Vec<BoundarySpec>,
    /// Feature property holding the region name.
    #[arg(long, default_value = geostat::geo::boundary::DEFAULT_NAME_FIELD)]
    name_field: String,
    /// Feature property holding the region code.
    #[arg(long, default_value = geostat::geo::boundary::DEFAULT_CODE_FIELD)]
    code_field: String,
}

impl BoundaryArgs {
    fn fields(&self) -> BoundaryFields {
        BoundaryFields {
            name: self.name_field.clone(),
            code: self.code_field.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Parquet,
}

impl From<OutputFormat> for TableFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => TableFormat::Csv,
            OutputFormat::Parquet => TableFormat::Parquet,
        }
    }
}

fn table_format(format: Option<OutputFormat>, output: &std::path::Path) -> TableFormat {
    format.map_or_else(|| TableFormat::from_path(output), Into::into)
}

#[derive(Debug, Args)]
struct JoinArgs {
    /// Staged table path or glob; repeatable, read in order.
    #[arg(long = "values", required = true, num_args = 1..)]
    values: Vec<String>,
    #[command(flatten)]
    boundary: BoundaryArgs,
    /// Version assumed for staged rows without a `geo_version`.
    #[arg(long, default_value = "old_63")]
    default_version: String,
    #[arg(long)]
    output: PathBuf,
    /// Defaults to parquet for `.parquet` outputs, csv otherwise.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    workbook: PathBuf,
    #[arg(long)]
    config: PathBuf,
    #[command(flatten)]
    boundary: BoundaryArgs,
    /// Also write the parser-stage table here.
    #[arg(long)]
    staging: Option<PathBuf>,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    #[arg(long, default_value_t = 1)]
    threads: usize,
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) dispatch ────────────────────────────────────────────────
    let cli = Cli::parse();
    info!(command = ?cli.command, "startup");
    let outcome = match cli.command {
        Command::Extract(args) => pipeline::run_extract(&ExtractJob {
            workbook: args.workbook,
            config: args.config,
            output: args.output,
            threads: args.threads,
            report: args.report,
        })?,
        Command::Join(args) => pipeline::run_join(&JoinJob {
            values: args.values,
            fields: args.boundary.fields(),
            boundaries: args.boundary.boundaries,
            default_version: args.default_version,
            format: table_format(args.format, &args.output),
            output: args.output,
            report: args.report,
        })?,
        Command::Run(args) => pipeline::run_all(&RunJob {
            workbook: args.workbook,
            config: args.config,
            fields: args.boundary.fields(),
            boundaries: args.boundary.boundaries,
            staging: args.staging,
            format: table_format(args.format, &args.output),
            output: args.output,
            threads: args.threads,
            report: args.report,
        })?,
    };

    // ─── 3) summary ─────────────────────────────────────────────────
    summarize(&outcome);
    Ok(())
}

fn summarize(outcome: &Outcome) {
    println!("Wrote {} rows to {}", outcome.rows, outcome.output.display());
}
