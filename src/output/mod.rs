//! Downstream sample output

pub mod formatting;

pub use formatting::{CsvSampleWriter, OutputFormat, SampleFormatter, SampleRecord, CSV_COLUMNS};
