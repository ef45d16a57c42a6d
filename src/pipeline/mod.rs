pub mod extraction;
pub mod report;

pub use extraction::{ExtractionPipeline, FileCallback};
pub use report::{ArchiveStatus, CellPreview, FileOutcome, FileRecord, RunReport};
