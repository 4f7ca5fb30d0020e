// src/table/parquet.rs

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{path::Path, sync::Arc};

use super::{stage_file, PendingFile};
use crate::geo::NormalizedRow;

/// Schema of the joined table: year is Int32, value Float64, text elsewhere.
pub fn normalized_schema() -> Schema {
    Schema::new(vec![
        Field::new("indicator_code", DataType::Utf8, false),
        Field::new("indicator_title", DataType::Utf8, false),
        Field::new("metric", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("value", DataType::Float64, false),
        Field::new("geo_version", DataType::Utf8, false),
        Field::new("geo_code", DataType::Utf8, false),
        Field::new("geo_name", DataType::Utf8, false),
    ])
}

fn text_column<'a>(rows: &'a [NormalizedRow], field: fn(&'a NormalizedRow) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(rows.iter().map(field)))
}

/// Columns for `rows`, in [`normalized_schema`] order.
pub fn to_arrays(rows: &[NormalizedRow]) -> Vec<ArrayRef> {
    vec![
        text_column(rows, |r| r.indicator_code.as_str()),
        text_column(rows, |r| r.indicator_title.as_str()),
        text_column(rows, |r| r.metric.as_str()),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.value))),
        text_column(rows, |r| r.geo_version.as_str()),
        text_column(rows, |r| r.geo_code.as_str()),
        text_column(rows, |r| r.geo_name.as_str()),
    ]
}

/// Write the joined table as a single SNAPPY-compressed row group.
pub fn write_normalized(path: &Path, rows: &[NormalizedRow]) -> Result<()> {
    stage_normalized(path, rows)?.persist()
}

/// [`write_normalized`] without the final rename.
pub fn stage_normalized(path: &Path, rows: &[NormalizedRow]) -> Result<PendingFile> {
    let schema = Arc::new(normalized_schema());
    let batch = RecordBatch::try_new(schema.clone(), to_arrays(rows))
        .context("building normalized record batch")?;
    stage_file(path, |file| {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .context("creating Arrow writer")?;
        writer.write(&batch).context("writing normalized batch")?;
        writer.close().context("closing Arrow writer")?;
        Ok(())
    })
    .with_context(|| format!("writing parquet {}", path.display()))
}
