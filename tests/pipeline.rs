// tests/pipeline.rs
//
// Whole-pipeline runs over a workbook generated on the fly.

use anyhow::Result;
use geostat::{
    geo::{BoundaryFields, BoundarySpec, NormalizedRow},
    pipeline::{run_all, run_extract, run_join, ExtractJob, JoinJob, RunJob},
    table::{csv::read_rows, TableFormat, UTF8_BOM},
    InputKind, PipelineError,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rust_xlsxwriter::Workbook as XlsxWorkbook;
use std::{
    fs::{self, File},
    path::PathBuf,
};
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,geostat=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

enum Value<'a> {
    Text(&'a str),
    Number(f64),
}

fn write_sheet(
    book: &mut XlsxWorkbook,
    name: &str,
    rows: &[(u32, Vec<(u16, Value)>)],
) -> Result<()> {
    let sheet = book.add_worksheet();
    sheet.set_name(name)?;
    for (row, cells) in rows {
        for (col, value) in cells {
            match value {
                Value::Text(text) => sheet.write_string(*row, *col, *text)?,
                Value::Number(n) => sheet.write_number(*row, *col, *n)?,
            };
        }
    }
    Ok(())
}

struct Fixture {
    dir: TempDir,
    workbook: PathBuf,
    config: PathBuf,
    boundaries: Vec<BoundarySpec>,
}

impl Fixture {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run_job(&self, output: PathBuf) -> RunJob {
        RunJob {
            workbook: self.workbook.clone(),
            config: self.config.clone(),
            boundaries: self.boundaries.clone(),
            fields: BoundaryFields::default(),
            staging: None,
            output,
            format: TableFormat::Csv,
            threads: 1,
            report: None,
        }
    }
}

fn fixture() -> Result<Fixture> {
    init_test_logging();
    let dir = tempfile::tempdir()?;

    // 1) workbook: a year-series sheet on the legacy geography and a
    //    per-row-year sheet on the current one
    use Value::{Number as N, Text as T};
    let mut book = XlsxWorkbook::new();
    write_sheet(
        &mut book,
        "1.1",
        &[
            (0, vec![(0, T("Tỷ lệ hộ nghèo đa chiều (%)"))]),
            (1, vec![(1, N(2020.0)), (2, N(2021.0))]),
            (2, vec![(0, T("Đồng bằng sông Hồng"))]),
            (3, vec![(0, T("Hà Nội")), (1, N(1.5)), (2, N(1.2))]),
            (4, vec![(0, T("Unknown Place")), (1, N(3.0)), (2, N(4.0))]),
            (5, vec![(0, T("Ghi chú: số liệu sơ bộ"))]),
            (9, vec![(0, T("Thừa Thiên Huế")), (1, N(9.0)), (2, N(9.0))]),
        ],
    )?;
    write_sheet(
        &mut book,
        "1.1.M",
        &[
            (0, vec![(0, T("Dân số và diện tích"))]),
            (
                1,
                vec![(0, T("Tỉnh")), (1, T("Năm")), (2, T("Số dân")), (3, T("Diện tích"))],
            ),
            (2, vec![(0, T("Province A")), (1, N(2021.0)), (2, N(100.0)), (3, N(50.0))]),
            (3, vec![(1, T("Năm 2022")), (2, N(110.0))]),
        ],
    )?;
    let workbook = dir.path().join("group1.xlsx");
    book.save(&workbook)?;

    // 2) configuration
    let config = dir.path().join("group1.json");
    fs::write(
        &config,
        r#"{
            "output": "unused.csv",
            "section_headers": ["Đồng bằng sông Hồng"],
            "sheets": [
                {"name": "1.1", "label_cols": [1], "data_start_row": 3, "year_row": 2},
                {"name": "1.1.M", "indicator_code": "1.1", "layout": "row_year_metrics",
                 "label_cols": [1], "data_start_row": 3, "year_col": 2, "metric_row": 2,
                 "metric_aliases": {"số dân": "population"}}
            ]
        }"#,
    )?;

    // 3) boundaries
    let old = dir.path().join("63.geojson");
    fs::write(
        &old,
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"ten_tinh": "Hà Nội", "ma_tinh": "01"}, "geometry": null},
            {"type": "Feature", "properties": {"ten_tinh": "Thừa Thiên Huế", "ma_tinh": "46"}, "geometry": null}
        ]}"#,
    )?;
    let new = dir.path().join("34.geojson");
    fs::write(
        &new,
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"ten_tinh": "Province A", "ma_tinh": 1}, "geometry": null}
        ]}"#,
    )?;
    let boundaries = vec![
        format!("old_63={}", old.display()).parse()?,
        format!("new_34={}", new.display()).parse()?,
    ];

    Ok(Fixture {
        dir,
        workbook,
        config,
        boundaries,
    })
}

fn summary(rows: &[NormalizedRow]) -> Vec<(String, String, i32, String, String)> {
    rows.iter()
        .map(|r| {
            (
                r.geo_name.clone(),
                r.metric.clone(),
                r.year,
                geostat::table::format_value(r.value),
                r.geo_code.clone(),
            )
        })
        .collect()
}

#[test]
fn test_run_produces_joined_table() -> Result<()> {
    let fx = fixture()?;
    let output = fx.path("out/gis_indicator_values.csv");
    let mut job = fx.run_job(output.clone());
    job.staging = Some(fx.path("out/group1_values.csv"));
    job.report = Some(fx.path("out/report.json"));
    let outcome = run_all(&job)?;
    assert_eq!(outcome.rows, 5);

    let bytes = fs::read(&output)?;
    assert!(bytes.starts_with(UTF8_BOM));
    let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec())?;
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("indicator_code,indicator_title,metric,year,value,geo_version,geo_code,geo_name")
    );
    assert_eq!(
        lines.next(),
        Some("1.1,Tỷ lệ hộ nghèo đa chiều (%),value,2020,1.5,old_63,01,Hà Nội")
    );

    let rows: Vec<NormalizedRow> = read_rows(&output)?;
    let s = |name: &str, metric: &str, year: i32, value: &str, code: &str| {
        (name.to_owned(), metric.to_owned(), year, value.to_owned(), code.to_owned())
    };
    assert_eq!(
        summary(&rows),
        vec![
            s("Hà Nội", "value", 2020, "1.5", "01"),
            s("Hà Nội", "value", 2021, "1.2", "01"),
            s("Province A", "population", 2021, "100", "1"),
            s("Province A", "Diện tích", 2021, "50", "1"),
            s("Province A", "population", 2022, "110", "1"),
        ]
    );
    assert!(rows[2..].iter().all(|r| r.geo_version == "new_34"));
    assert!(rows[2..].iter().all(|r| r.indicator_title == "Dân số và diện tích"));

    // staged table keeps the unmatched row and the section context
    let staged = fs::read_to_string(fx.path("out/group1_values.csv"))?;
    assert_eq!(staged.lines().count(), 8);
    assert!(staged.contains(
        "1.1,1.1,Tỷ lệ hộ nghèo đa chiều (%),Unknown Place,,Đồng bằng sông Hồng,value,2020,3,old_63"
    ));

    // diagnostics
    let report = &outcome.report;
    assert_eq!(report.sheets.len(), 2);
    assert_eq!(report.sheets[0].stopped_at_row, Some(9));
    assert_eq!(report.sheets[0].section_rows, 1);
    assert_eq!(report.sheets[0].skipped_rows, 1);
    assert_eq!(report.sheets[1].records, 3);
    let join = report.join.as_ref().expect("run reports the join");
    assert_eq!(join.input_records, 7);
    assert_eq!(join.joined, 5);
    assert_eq!(join.unmatched["old_63"]["Unknown Place"], 2);
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fx.path("out/report.json"))?)?;
    assert_eq!(written["join"]["joined"], 5);
    Ok(())
}

#[test]
fn test_staged_join_matches_single_pass() -> Result<()> {
    let fx = fixture()?;
    let direct = fx.path("direct.csv");
    run_all(&fx.run_job(direct.clone()))?;

    let staged = fx.path("staged/group1_values.csv");
    let extracted = run_extract(&ExtractJob {
        workbook: fx.workbook.clone(),
        config: fx.config.clone(),
        output: Some(staged.clone()),
        threads: 2,
        report: None,
    })?;
    assert_eq!(extracted.rows, 7);

    let joined = fx.path("joined.csv");
    let outcome = run_join(&JoinJob {
        values: vec![fx.path("staged/*_values.csv").display().to_string()],
        boundaries: fx.boundaries.clone(),
        fields: BoundaryFields::default(),
        default_version: "old_63".into(),
        output: joined.clone(),
        format: TableFormat::Csv,
        report: None,
    })?;
    assert_eq!(outcome.rows, 5);
    assert_eq!(fs::read(&direct)?, fs::read(&joined)?);

    // rerunning reproduces the same bytes
    run_all(&fx.run_job(direct.clone()))?;
    assert_eq!(fs::read(&direct)?, fs::read(&joined)?);
    Ok(())
}

#[test]
fn test_parquet_output() -> Result<()> {
    let fx = fixture()?;
    let output = fx.path("gis.parquet");
    let mut job = fx.run_job(output.clone());
    job.format = TableFormat::Parquet;
    run_all(&job)?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&output)?)?.build()?;
    let rows: usize = reader
        .map(|batch| batch.map(|b| b.num_rows()))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sum();
    assert_eq!(rows, 5);
    Ok(())
}

#[test]
fn test_missing_boundary_aborts_before_output() -> Result<()> {
    let fx = fixture()?;
    let output = fx.path("out/never.csv");
    let mut job = fx.run_job(output.clone());
    job.boundaries.push(BoundarySpec {
        version: "extra".into(),
        path: fx.path("absent.geojson"),
    });
    let err = run_all(&job).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::MissingInput { kind, path }) => {
            assert_eq!(*kind, InputKind::Boundary);
            assert_eq!(path, &fx.path("absent.geojson"));
        }
        other => panic!("unexpected error: {other:?} ({err:#})"),
    }
    assert!(!output.exists());
    assert!(!fx.path("out").exists());
    Ok(())
}

#[test]
fn test_missing_sheet_is_reported_by_name() -> Result<()> {
    let fx = fixture()?;
    let config = fx.path("bad.json");
    fs::write(
        &config,
        r#"{"sheets": [{"name": "9.9", "label_cols": [1], "data_start_row": 2, "year_row": 1}]}"#,
    )?;
    let mut job = fx.run_job(fx.path("never.csv"));
    job.config = config;
    let err = run_all(&job).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingSheet(name)) if name == "9.9"
    ));
    assert!(!fx.path("never.csv").exists());
    Ok(())
}

#[test]
fn test_failed_final_write_leaves_no_staging_table() -> Result<()> {
    let fx = fixture()?;
    let blocker = fx.path("blocker");
    fs::write(&blocker, "not a directory")?;
    let mut job = fx.run_job(blocker.join("final.csv"));
    job.staging = Some(fx.path("out/group1_values.csv"));
    job.report = Some(fx.path("out/report.json"));
    let err = run_all(&job).unwrap_err();
    assert!(format!("{err:#}").contains("final.csv"), "{err:#}");
    assert!(!fx.path("out/group1_values.csv").exists());
    assert!(!fx.path("out/report.json").exists());
    Ok(())
}

#[test]
fn test_failed_report_write_leaves_no_table() -> Result<()> {
    let fx = fixture()?;
    let blocker = fx.path("blocker");
    fs::write(&blocker, "not a directory")?;
    let staged = fx.path("staged/group1_values.csv");
    let err = run_extract(&ExtractJob {
        workbook: fx.workbook.clone(),
        config: fx.config.clone(),
        output: Some(staged.clone()),
        threads: 1,
        report: Some(blocker.join("report.json")),
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("report.json"), "{err:#}");
    assert!(!staged.exists());
    assert_eq!(fs::read_dir(fx.path("staged"))?.count(), 0);

    let joined = fx.path("joined.csv");
    fs::write(&staged, "geo_name,year,value,geo_version\nHà Nội,2020,1.5,old_63\n")?;
    let err = run_join(&JoinJob {
        values: vec![staged.display().to_string()],
        boundaries: fx.boundaries.clone(),
        fields: BoundaryFields::default(),
        default_version: "old_63".into(),
        output: joined.clone(),
        format: TableFormat::Csv,
        report: Some(blocker.join("report.json")),
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("report.json"), "{err:#}");
    assert!(!joined.exists());
    Ok(())
}
