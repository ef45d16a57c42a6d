pub mod csv_exporter;
pub mod wkt;

pub use csv_exporter::CsvExporter;

use crate::error::Result;
use crate::rowset::RowSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate or create the output and write the header
    Create,
    /// Add rows to an existing output whose header matches
    Append,
}

/// Destination of the cumulative table.
pub trait TabularExporter: Send + Sync {
    /// Returns the number of rows written.
    fn export(&mut self, rows: &RowSet, mode: WriteMode) -> Result<usize>;

    fn output_path(&self) -> PathBuf;
}
