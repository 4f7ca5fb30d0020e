// src/geo/mod.rs

pub mod boundary;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    str::FromStr,
};
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;
use crate::extract::IndicatorRecord;
use crate::report::JoinReport;
use crate::sheet::text::{fold_key, normalize_text};
use crate::table::{serialize_value, TableRow};

pub use boundary::{load_boundaries, Boundary, BoundaryFields};

/// Canonical display name and code of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoEntry {
    pub name: String,
    pub code: String,
}

/// Folded region name → entry, for one geography version. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    entries: HashMap<String, GeoEntry>,
}

impl GeoIndex {
    /// When two regions fold to the same key the later one wins.
    pub fn from_boundaries<I>(boundaries: I) -> Self
    where
        I: IntoIterator<Item = Boundary>,
    {
        let mut entries = HashMap::new();
        for b in boundaries {
            let key = fold_key(&b.name);
            if let Some(prev) = entries.insert(key, GeoEntry { name: b.name, code: b.code }) {
                debug!(
                    name = %prev.name,
                    code = %prev.code,
                    "boundary name shadowed by later feature"
                );
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, geo_name: &str) -> Option<&GeoEntry> {
        self.entries.get(&fold_key(geo_name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A `VERSION=PATH` boundary argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundarySpec {
    pub version: String,
    pub path: PathBuf,
}

impl FromStr for BoundarySpec {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((version, path)) if !version.trim().is_empty() && !path.trim().is_empty() => {
                Ok(Self {
                    version: version.trim().to_owned(),
                    path: PathBuf::from(path.trim()),
                })
            }
            _ => Err(PipelineError::InvalidBoundaryArg(s.to_owned())),
        }
    }
}

/// One [`GeoIndex`] per geography version.
#[derive(Debug, Clone, Default)]
pub struct GeoIndexSet {
    indexes: BTreeMap<String, GeoIndex>,
}

impl GeoIndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version: impl Into<String>, index: GeoIndex) {
        self.indexes.insert(version.into(), index);
    }

    pub fn get(&self, version: &str) -> Option<&GeoIndex> {
        self.indexes.get(version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Build every index from its boundary file.
    #[instrument(level = "info", skip_all, fields(versions = specs.len()))]
    pub fn load(specs: &[BoundarySpec], fields: &BoundaryFields) -> Result<Self> {
        let mut set = Self::new();
        for spec in specs {
            let index = GeoIndex::from_boundaries(load_boundaries(&spec.path, fields)?);
            info!(version = %spec.version, regions = index.len(), "geo index built");
            if index.is_empty() {
                warn!(
                    version = %spec.version,
                    name_field = %fields.name,
                    code_field = %fields.code,
                    "boundary file has no named, coded features"
                );
            }
            set.insert(spec.version.clone(), index);
        }
        Ok(set)
    }
}

/// A record with its geography resolved; the final table's row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub indicator_code: String,
    pub indicator_title: String,
    pub metric: String,
    pub year: i32,
    #[serde(serialize_with = "serialize_value")]
    pub value: f64,
    pub geo_version: String,
    pub geo_code: String,
    pub geo_name: String,
}

impl TableRow for NormalizedRow {
    const COLUMNS: &'static [&'static str] = &[
        "indicator_code",
        "indicator_title",
        "metric",
        "year",
        "value",
        "geo_version",
        "geo_code",
        "geo_name",
    ];
}

/// Attaches geo codes to records in arrival order, counting what it drops.
pub struct Joiner<'a> {
    indexes: &'a GeoIndexSet,
    rows: Vec<NormalizedRow>,
    report: JoinReport,
}

impl<'a> Joiner<'a> {
    pub fn new(indexes: &'a GeoIndexSet) -> Self {
        Self {
            indexes,
            rows: Vec::new(),
            report: JoinReport::default(),
        }
    }

    /// Join one record. Returns whether a row was emitted.
    pub fn push(&mut self, record: &IndicatorRecord) -> bool {
        self.report.input_records += 1;
        let Some(index) = self.indexes.get(&record.geo_version) else {
            self.report.unknown_version += 1;
            return false;
        };
        let Some(entry) = index.lookup(&record.geo_name) else {
            self.report
                .record_unmatched(&record.geo_version, &normalize_text(&record.geo_name));
            return false;
        };
        self.rows.push(NormalizedRow {
            indicator_code: record.indicator_code.clone(),
            indicator_title: record.indicator_title.clone(),
            metric: record.metric.clone(),
            year: record.year,
            value: record.value,
            geo_version: record.geo_version.clone(),
            geo_code: entry.code.clone(),
            geo_name: entry.name.clone(),
        });
        self.report.joined += 1;
        true
    }

    /// Staged rows dropped before joining for lack of a value or year.
    pub fn note_missing_values(&mut self, count: usize) {
        self.report.input_records += count;
        self.report.missing_values += count;
    }

    pub fn finish(self) -> (Vec<NormalizedRow>, JoinReport) {
        let report = self.report;
        for (version, names) in &report.unmatched {
            let records: usize = names.values().sum();
            let sample: Vec<&str> = names.keys().take(5).map(String::as_str).collect();
            warn!(
                version = %version,
                names = names.len(),
                records,
                sample = ?sample,
                "geography names with no boundary match; records dropped"
            );
        }
        if report.unknown_version > 0 {
            warn!(
                records = report.unknown_version,
                loaded = ?self.indexes.versions().collect::<Vec<_>>(),
                "records tagged with a geography version that has no boundary file"
            );
        }
        info!(
            input = report.input_records,
            joined = report.joined,
            dropped = report.dropped(),
            "geo join complete"
        );
        (self.rows, report)
    }
}

/// Join `records` against `indexes` in order.
pub fn join_records<'r, I>(records: I, indexes: &GeoIndexSet) -> (Vec<NormalizedRow>, JoinReport)
where
    I: IntoIterator<Item = &'r IndicatorRecord>,
{
    let mut joiner = Joiner::new(indexes);
    for record in records {
        joiner.push(record);
    }
    joiner.finish()
}
