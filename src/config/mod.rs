// src/config/mod.rs

pub mod types;

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::{debug, instrument};

pub use types::{
    Block, GeoNaming, Layout, LayoutKind, MetricAliases, SectionHeaders, SheetConfig,
    WorkbookConfig,
};

/// Load a workbook configuration. `.yml`/`.yaml` files are read as YAML,
/// everything else as JSON.
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WorkbookConfig> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"));
    let config = if is_yaml {
        parse_yaml(&contents)
    } else {
        parse_json(&contents)
    }
    .with_context(|| format!("parsing config {}", path.display()))?;
    debug!(
        sheets = config.sheets.len(),
        section_headers = config.section_headers.len(),
        "config loaded"
    );
    Ok(config)
}

pub fn parse_json(contents: &str) -> Result<WorkbookConfig> {
    Ok(serde_json::from_str(contents)?)
}

pub fn parse_yaml(contents: &str) -> Result<WorkbookConfig> {
    Ok(serde_yaml::from_str(contents)?)
}
