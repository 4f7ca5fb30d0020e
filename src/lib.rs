//! Indicator extraction from irregular statistical workbooks, plus the
//! province geo-code join that turns parsed records into a flat table.
//!
//! Stages, leaf to root: [`sheet`] primitives, [`config`], [`extract`]
//! (layouts, header resolution, section tracking, sheet parser), [`geo`]
//! (boundary index and join) and [`table`] (delimited / columnar output).
//! [`pipeline`] strings them together for the binary.

pub mod config;
pub mod error;
pub mod extract;
pub mod geo;
pub mod pipeline;
pub mod report;
pub mod sheet;
pub mod table;

pub use config::{load_config, SheetConfig, WorkbookConfig};
pub use error::{InputKind, PipelineError};
pub use extract::{parse_sheet, IndicatorRecord, SheetParser};
pub use geo::{GeoIndex, GeoIndexSet, NormalizedRow};
pub use report::{JoinReport, RunReport, SheetReport};
