use crate::error::{ExtractError, Result};
use crate::inspector::MissingField;
use crate::scanner::{CellFile, LevelCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Exported,
    /// No registry layer in the cell
    SkippedEmpty,
    SkippedOpenFailure,
    /// Target layers present, but none carried its field
    SkippedFieldMissing,
    /// Query or export rejected; the run continues
    ExportFailed,
}

impl FileOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            FileOutcome::SkippedEmpty
                | FileOutcome::SkippedOpenFailure
                | FileOutcome::SkippedFieldMissing
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Exported => "exported",
            FileOutcome::SkippedEmpty => "no target layers",
            FileOutcome::SkippedOpenFailure => "open failed",
            FileOutcome::SkippedFieldMissing => "field missing",
            FileOutcome::ExportFailed => "export failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub level: LevelCode,
    pub outcome: FileOutcome,
    pub layers: Vec<String>,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileRecord {
    pub fn new(cell: &CellFile, outcome: FileOutcome) -> Self {
        Self {
            path: cell.display_path(),
            level: cell.level,
            outcome,
            layers: Vec::new(),
            rows: 0,
            message: None,
        }
    }

    pub fn with_layers(mut self, layers: Vec<String>) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStatus {
    pub path: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub input_dir: PathBuf,
    pub output_path: PathBuf,
    pub files_processed: usize,
    pub files_exported: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_written: usize,
    pub duration: Duration,
    pub files: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveStatus>,
}

impl RunReport {
    /// The output file only exists once a cell was exported.
    pub fn output_created(&self) -> bool {
        self.files_exported > 0
    }

    pub fn files_with(&self, outcome: FileOutcome) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(move |f| f.outcome == outcome)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|e| ExtractError::Export {
            message: format!("Failed to serialize run report: {}", e),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Dry-run view of one cell: what would be queried, nothing is written.
#[derive(Debug, Clone, Serialize)]
pub struct CellPreview {
    pub path: String,
    pub level: LevelCode,
    pub layers: Vec<String>,
    pub missing_fields: Vec<MissingField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
