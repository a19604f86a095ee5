pub mod assets;
pub mod batch;
pub mod binder;
pub mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod document;
pub mod measure;
pub mod mutate;
pub mod package;
pub mod placeholder;
pub mod promote;
pub mod render;
pub mod report;
pub mod sizer;
pub mod style;
pub mod table;
pub mod text_metrics;
pub mod truncate;
pub mod upload;

pub use batch::{BatchError, BatchReport, generate_batch};
pub use binder::{BindOptions, DataRow, Mapping, RowBinding, bind_row};
#[cfg(feature = "cli")]
pub use cli::run;
pub use document::Document;
pub use measure::{BBox, Measure, MetricsMeasure};
pub use sizer::{PreparedTemplate, prepare_template};
