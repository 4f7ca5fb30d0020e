// src/extract/mod.rs

pub mod header;
pub mod layout;
pub mod tracker;

use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, instrument, warn};

use crate::config::{GeoNaming, SectionHeaders, SheetConfig};
use crate::report::SheetReport;
use crate::sheet::{cell_at, Cell, Sheet};
use crate::table::{serialize_value, TableRow};

pub use layout::{Observation, ResolvedLayout, Strategy};
pub use tracker::{Marker, SectionTracker};

/// Consecutive fully blank rows that end a sheet. Rows past the run are
/// never inspected, even if data follows.
pub const BLANK_RUN_LIMIT: usize = 3;

/// One value read off a sheet, with the context a human would attach to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRecord {
    pub sheet: String,
    pub indicator_code: String,
    pub indicator_title: String,
    pub geo_name: String,
    pub geo_parent: String,
    pub section: String,
    pub metric: String,
    pub year: i32,
    #[serde(serialize_with = "serialize_value")]
    pub value: f64,
    pub geo_version: String,
}

impl TableRow for IndicatorRecord {
    const COLUMNS: &'static [&'static str] = &[
        "sheet",
        "indicator_code",
        "indicator_title",
        "geo_name",
        "geo_parent",
        "section",
        "metric",
        "year",
        "value",
        "geo_version",
    ];
}

/// Walks a sheet top to bottom, yielding records lazily.
///
/// Each row is either the end of the sheet (third blank row in a row), a
/// structural marker fed to the [`SectionTracker`], or a data row whose
/// observations become records carrying the tracker's current context.
pub struct SheetParser<'a> {
    sheet: &'a Sheet,
    config: &'a SheetConfig,
    headers: &'a SectionHeaders,
    layout: ResolvedLayout,
    mapped: Vec<usize>,
    title: String,
    geo_version: String,
    tracker: SectionTracker,
    next_row: usize,
    blank_run: usize,
    last_label: String,
    pending: VecDeque<IndicatorRecord>,
    done: bool,
    report: SheetReport,
}

impl<'a> SheetParser<'a> {
    pub fn new(
        sheet: &'a Sheet,
        config: &'a SheetConfig,
        headers: &'a SectionHeaders,
        naming: &GeoNaming,
    ) -> Self {
        let layout = ResolvedLayout::resolve(config, sheet);
        debug!(
            sheet = %config.name,
            strategy = ?layout.strategy,
            unresolved = layout.unresolved.len(),
            "resolved header map"
        );
        let geo_version = naming.version_for(&config.name).to_owned();
        Self {
            sheet,
            config,
            headers,
            mapped: layout.mapped_columns(),
            layout,
            title: indicator_title(sheet),
            report: SheetReport {
                sheet: config.name.clone(),
                geo_version: geo_version.clone(),
                ..SheetReport::default()
            },
            geo_version,
            tracker: SectionTracker::new(),
            next_row: config.data_start_row,
            blank_run: 0,
            last_label: String::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn report(&self) -> &SheetReport {
        &self.report
    }

    pub fn into_report(self) -> SheetReport {
        self.report
    }

    fn scan_row(&mut self, idx: usize) {
        let sheet = self.sheet;
        let row = sheet.row(idx);
        self.report.rows_scanned += 1;

        // 1) blank-run termination
        if row.iter().all(Cell::is_blank) {
            self.blank_run += 1;
            if self.blank_run >= BLANK_RUN_LIMIT {
                self.done = true;
                self.report.stopped_at_row = Some(idx + 1);
                if idx + 1 < sheet.height() {
                    warn!(
                        sheet = %self.config.name,
                        row = idx + 1,
                        remaining = sheet.height() - idx - 1,
                        "blank run ends sheet; later rows ignored"
                    );
                }
            }
            return;
        }
        self.blank_run = 0;

        // 2) label, inherited across merged cells for the per-row-year layout
        let mut label = row_label(row, &self.config.label_cols);
        if label.is_empty() && self.layout.inherits_labels() {
            label = self.last_label.clone();
        }

        // 3) structural marker or data
        let has_numeric = self.layout.has_numeric(row);
        if !has_numeric {
            if !label.is_empty() {
                let parent_cell = self.config.parent_label_col.map(|c| cell_at(row, c).text());
                match self.tracker.mark(&label, parent_cell.as_deref(), self.headers) {
                    Marker::Section => self.report.section_rows += 1,
                    Marker::Parent => self.report.parent_rows += 1,
                    Marker::Skipped => self.report.skipped_rows += 1,
                }
            }
            return;
        }
        if label.is_empty() {
            self.report.unlabeled_numeric_rows += 1;
            return;
        }

        // 4) emit; a labeled data row is inherited from even if its year is unreadable
        self.last_label.clone_from(&label);
        let Some(observations) = self.layout.observe(row) else {
            self.report.unparseable_year_rows += 1;
            return;
        };
        self.note_dropped_cells(row);
        for obs in observations {
            self.pending.push_back(IndicatorRecord {
                sheet: self.config.name.clone(),
                indicator_code: self.config.indicator_code.clone(),
                indicator_title: self.title.clone(),
                geo_name: label.clone(),
                geo_parent: self.tracker.parent().to_owned(),
                section: self.tracker.section().to_owned(),
                metric: obs.metric,
                year: obs.year,
                value: obs.value,
                geo_version: self.geo_version.clone(),
            });
        }
        self.report.records += self.pending.len();
    }

    fn note_dropped_cells(&mut self, row: &[Cell]) {
        for col in &self.mapped {
            let cell = cell_at(row, *col);
            if !cell.is_blank() && !cell.is_number() {
                self.report.non_numeric_cells += 1;
            }
        }
        for col in &self.layout.unresolved {
            if cell_at(row, *col).is_number() {
                self.report.unresolved_columns.insert(col + 1);
            }
        }
    }
}

impl Iterator for SheetParser<'_> {
    type Item = IndicatorRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if self.done || self.next_row >= self.sheet.height() {
                self.done = true;
                return None;
            }
            let idx = self.next_row;
            self.next_row += 1;
            self.scan_row(idx);
        }
    }
}

/// Parse a whole sheet eagerly.
#[instrument(level = "info", skip_all, fields(sheet = %config.name))]
pub fn parse_sheet(
    sheet: &Sheet,
    config: &SheetConfig,
    headers: &SectionHeaders,
    naming: &GeoNaming,
) -> (Vec<IndicatorRecord>, SheetReport) {
    let mut parser = SheetParser::new(sheet, config, headers, naming);
    let records: Vec<IndicatorRecord> = parser.by_ref().collect();
    let report = parser.into_report();
    info!(
        records = records.len(),
        rows = report.rows_scanned,
        geo_version = %report.geo_version,
        "parsed sheet"
    );
    if !report.unresolved_columns.is_empty() {
        warn!(columns = ?report.unresolved_columns, "numbers in columns without a resolved header");
    }
    (records, report)
}

/// First non-empty text in the sheet's first row.
pub fn indicator_title(sheet: &Sheet) -> String {
    sheet
        .row(0)
        .iter()
        .map(Cell::text)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// First non-empty label among `label_cols`, in priority order.
pub fn row_label(row: &[Cell], label_cols: &[usize]) -> String {
    label_cols
        .iter()
        .map(|c| cell_at(row, *c).text())
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_json;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,geostat::extract=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn parse(config_json: &str, sheet: &Sheet) -> (Vec<IndicatorRecord>, SheetReport) {
        init_test_logging();
        let config = parse_json(config_json).expect("test config parses");
        parse_sheet(
            sheet,
            &config.sheets[0],
            &config.section_headers,
            &config.geography,
        )
    }

    fn blank() -> Vec<Cell> {
        Vec::new()
    }

    #[test]
    fn test_year_series_full_row_yields_one_record_per_year() {
        let sheet = Sheet::new(
            "1.1",
            vec![
                vec!["Tỷ lệ hộ nghèo".into()],
                vec![Cell::Empty, 2020.into(), 2021.into(), 2022.into(), 2023.into()],
                vec!["Province A".into(), 1.into(), 2.into(), 3.into(), 4.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "1.1", "label_cols": [1], "data_start_row": 3, "year_row": 2}]}"#,
            &sheet,
        );
        assert_eq!(records.len(), 4);
        assert_eq!(report.records, 4);
        assert!(records.iter().all(|r| r.indicator_title == "Tỷ lệ hộ nghèo"));
        assert!(records.iter().all(|r| r.indicator_code == "1.1"));
        assert!(records.iter().all(|r| r.geo_version == "old_63"));
        assert_eq!(
            records.iter().map(|r| r.year).collect::<Vec<_>>(),
            vec![2020, 2021, 2022, 2023]
        );
    }

    #[test]
    fn test_concrete_year_series_scenario() {
        let sheet = Sheet::new(
            "2.1.M",
            vec![
                vec![Cell::Empty, 2020.into(), 2021.into()],
                vec!["Province A".into(), 10.into(), 20.into()],
            ],
        );
        let (records, _) = parse(
            r#"{"sheets": [{"name": "2.1.M", "label_cols": [1], "data_start_row": 2, "year_row": 1}]}"#,
            &sheet,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].geo_name, "Province A");
        assert_eq!(records[0].metric, "value");
        assert_eq!((records[0].year, records[0].value), (2020, 10.0));
        assert_eq!((records[1].year, records[1].value), (2021, 20.0));
        assert_eq!(records[0].geo_version, "new_34");
        assert_eq!(records[0].indicator_title, "2020");
    }

    #[test]
    fn test_section_and_parent_inheritance() {
        let sheet = Sheet::new(
            "3.1",
            vec![
                vec!["Title".into()],
                vec![Cell::Empty, Cell::Empty, 2020.into()],
                vec!["MIỀN BẮC".into()],
                vec!["Hà Nội".into(), "Hà Nội".into()],
                vec!["Ba Đình".into(), Cell::Empty, 1.into()],
                vec!["Ghi chú".into()],
                vec!["Hoàn Kiếm".into(), Cell::Empty, 2.into()],
                vec!["Miền Nam".into(), "ignored".into()],
                vec!["Cần Thơ".into(), Cell::Empty, 3.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"section_headers": ["Miền Bắc", "Miền Nam"],
                "sheets": [{"name": "3.1", "label_cols": [1], "data_start_row": 3, "year_row": 2,
                            "parent_label_col": 2}]}"#,
            &sheet,
        );
        let context: Vec<_> = records
            .iter()
            .map(|r| (r.geo_name.as_str(), r.section.as_str(), r.geo_parent.as_str()))
            .collect();
        assert_eq!(
            context,
            vec![
                ("Ba Đình", "MIỀN BẮC", "Hà Nội"),
                ("Hoàn Kiếm", "MIỀN BẮC", "Hà Nội"),
                ("Cần Thơ", "Miền Nam", ""),
            ]
        );
        assert_eq!(report.section_rows, 2);
        assert_eq!(report.parent_rows, 1);
        assert_eq!(report.skipped_rows, 1);
    }

    #[test]
    fn test_three_blank_rows_end_the_sheet() {
        let sheet = Sheet::new(
            "4.1",
            vec![
                vec![Cell::Empty, 2020.into()],
                vec!["A".into(), 1.into()],
                blank(),
                blank(),
                vec!["B".into(), 2.into()],
                blank(),
                blank(),
                blank(),
                vec!["C".into(), 3.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "4.1", "label_cols": [1], "data_start_row": 2, "year_row": 1}]}"#,
            &sheet,
        );
        let names: Vec<_> = records.iter().map(|r| r.geo_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(report.stopped_at_row, Some(8));
        assert_eq!(report.rows_scanned, 7);
    }

    #[test]
    fn test_unlabeled_numeric_rows_are_dropped() {
        let sheet = Sheet::new(
            "5.1",
            vec![
                vec![Cell::Empty, 2020.into()],
                vec!["A".into(), 1.into()],
                vec![Cell::Empty, 2.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "5.1", "label_cols": [1], "data_start_row": 2, "year_row": 1}]}"#,
            &sheet,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(report.unlabeled_numeric_rows, 1);
    }

    #[test]
    fn test_label_columns_checked_in_priority_order() {
        let sheet = Sheet::new(
            "6.1",
            vec![
                vec![Cell::Empty, Cell::Empty, 2020.into()],
                vec!["Vùng 1".into(), "Tỉnh X".into(), 1.into()],
                vec!["Vùng 2".into(), Cell::Empty, 2.into()],
            ],
        );
        let (records, _) = parse(
            r#"{"sheets": [{"name": "6.1", "label_cols": [2, 1], "data_start_row": 2, "year_row": 1}]}"#,
            &sheet,
        );
        let names: Vec<_> = records.iter().map(|r| r.geo_name.as_str()).collect();
        assert_eq!(names, vec!["Tỉnh X", "Vùng 2"]);
    }

    #[test]
    fn test_row_year_layout_inherits_merged_labels() {
        let sheet = Sheet::new(
            "7.1",
            vec![
                vec!["Tỉnh".into(), "Năm".into(), "poor".into()],
                vec!["Province D".into(), 2020.into(), 5.into()],
                vec![Cell::Empty, 2021.into(), 4.into()],
                vec![Cell::Empty, "chưa có".into(), 3.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "7.1", "layout": "row_year_metrics", "label_cols": [1],
                            "data_start_row": 2, "year_col": 2, "metric_row": 1}]}"#,
            &sheet,
        );
        let got: Vec<_> = records
            .iter()
            .map(|r| (r.geo_name.as_str(), r.year, r.value))
            .collect();
        assert_eq!(got, vec![("Province D", 2020, 5.0), ("Province D", 2021, 4.0)]);
        assert_eq!(report.unparseable_year_rows, 1);
    }

    #[test]
    fn test_row_with_unreadable_year_still_passes_its_label_on() {
        let sheet = Sheet::new(
            "7.2",
            vec![
                vec!["Tỉnh".into(), "Năm".into(), "poor".into()],
                vec!["Province D".into(), 2020.into(), 5.into()],
                vec!["Province E".into(), "n/a".into(), 4.into()],
                vec![Cell::Empty, 2021.into(), 3.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "7.2", "layout": "row_year_metrics", "label_cols": [1],
                            "data_start_row": 2, "year_col": 2, "metric_row": 1}]}"#,
            &sheet,
        );
        let got: Vec<_> = records
            .iter()
            .map(|r| (r.geo_name.as_str(), r.year, r.value))
            .collect();
        assert_eq!(got, vec![("Province D", 2020, 5.0), ("Province E", 2021, 3.0)]);
        assert_eq!(report.unparseable_year_rows, 1);
    }

    #[test]
    fn test_other_layouts_do_not_inherit_labels() {
        let sheet = Sheet::new(
            "8.1",
            vec![
                vec![Cell::Empty, "rate".into()],
                vec!["A".into(), 1.into()],
                vec![Cell::Empty, 2.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "8.1", "layout": "fixed_year_metrics", "label_cols": [1],
                            "data_start_row": 2, "fixed_year": 2022, "metric_row": 1}]}"#,
            &sheet,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(report.unlabeled_numeric_rows, 1);
    }

    #[test]
    fn test_text_in_mapped_cells_is_counted_not_fatal() {
        let sheet = Sheet::new(
            "9.1",
            vec![
                vec![Cell::Empty, 2020.into(), 2021.into(), Cell::Empty],
                vec!["A".into(), "-".into(), 7.into(), 99.into()],
            ],
        );
        let (records, report) = parse(
            r#"{"sheets": [{"name": "9.1", "label_cols": [1], "data_start_row": 2, "year_row": 1,
                            "blocks": [{"metric": "m", "start_col": 2, "end_col": 4}]}]}"#,
            &sheet,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year, 2021);
        assert_eq!(report.non_numeric_cells, 1);
        assert_eq!(report.unresolved_columns.iter().copied().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_parser_is_lazy_and_restartable() {
        let sheet = Sheet::new(
            "10.1",
            vec![
                vec![Cell::Empty, 2020.into(), 2021.into()],
                vec!["A".into(), 1.into(), 2.into()],
                vec!["B".into(), 3.into(), 4.into()],
            ],
        );
        let config = parse_json(
            r#"{"sheets": [{"name": "10.1", "label_cols": [1], "data_start_row": 2, "year_row": 1}]}"#,
        )
        .expect("test config parses");
        let cfg = &config.sheets[0];
        let mut parser = SheetParser::new(&sheet, cfg, &config.section_headers, &config.geography);
        let first = parser.next().expect("first record");
        assert_eq!(first.geo_name, "A");
        assert_eq!(parser.report().rows_scanned, 1);

        let again: Vec<_> =
            SheetParser::new(&sheet, cfg, &config.section_headers, &config.geography).collect();
        assert_eq!(again.len(), 4);
        assert_eq!(again[0], first);
    }
}
