//! Bulk import of scholarship spreadsheets.
//!
//! Upload -> [`bulk::BulkHandler`] -> [`parser::CsvParser`] per file ->
//! [`processor::RowProcessor`] per row -> [`report::BulkImportReport`].

pub mod bulk;
pub mod failed;
pub mod history;
pub mod parser;
pub mod processor;
pub mod report;
pub mod resolvers;
pub mod validator;

pub use bulk::{BulkHandler, Extraction};
pub use parser::{CsvParser, ParseError, Row, ScholarshipRow};
pub use processor::{ImportError, ImportPipeline, RowProcessor};
pub use report::{BulkImportReport, ImportReport, ImportReporter, RowOutcome, RowStatus};
pub use validator::{validate_row, ValidationResult};
