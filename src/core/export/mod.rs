//! CSV export pipeline

pub mod summary;
pub mod writer;

pub use summary::{JobSummary, RunSummary};
pub use writer::CsvExportWriter;
