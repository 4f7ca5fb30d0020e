// src/geo/boundary.rs
//
// Boundary files are GeoJSON FeatureCollections. Only feature properties are
// read; geometry is skipped during deserialization.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{fs::File, io::BufReader, io::Read, path::Path};
use tracing::{debug, instrument};

use crate::table::format_value;

pub const DEFAULT_NAME_FIELD: &str = "ten_tinh";
pub const DEFAULT_CODE_FIELD: &str = "ma_tinh";

/// Which feature properties hold the display name and the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryFields {
    pub name: String,
    pub code: String,
}

impl Default for BoundaryFields {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME_FIELD.to_owned(),
            code: DEFAULT_CODE_FIELD.to_owned(),
        }
    }
}

/// A named, coded region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_boundaries(path: &Path, fields: &BoundaryFields) -> Result<Vec<Boundary>> {
    let file = File::open(path).with_context(|| format!("opening boundary {}", path.display()))?;
    let boundaries = read_boundaries(BufReader::new(file), fields)
        .with_context(|| format!("parsing boundary {}", path.display()))?;
    debug!(features = boundaries.len(), "boundary loaded");
    Ok(boundaries)
}

/// Features lacking a usable name or code are skipped.
pub fn read_boundaries<R: Read>(reader: R, fields: &BoundaryFields) -> Result<Vec<Boundary>> {
    let collection: FeatureCollection = serde_json::from_reader(reader)?;
    let boundaries = collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let props = feature.properties?;
            Some(Boundary {
                name: property_text(props.get(&fields.name))?,
                code: property_text(props.get(&fields.code))?,
            })
        })
        .collect();
    Ok(boundaries)
}

fn property_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => format_value(n.as_f64()?),
        },
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
