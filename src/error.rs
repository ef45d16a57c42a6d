use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory traversal failed under {root}: {message}")]
    Scan { root: String, message: String },

    #[error("Cannot open cell file: {path}")]
    CellOpen { path: String, message: String },

    #[error("Query execution failed: {message}")]
    Query { message: String },

    #[error("Export failed: {message}")]
    Export { message: String },

    #[error("Output schema mismatch: expected [{}], found [{}]", expected.join(", "), found.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("CSV operation failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive operation failed: {message}")]
    Archive { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Source engine '{engine}' is not available in this build")]
    EngineUnavailable { engine: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ExtractError {
    fn user_message(&self) -> String {
        match self {
            ExtractError::Scan { root, message } => {
                format!("Could not read input directory {}: {}", root, message)
            }
            ExtractError::CellOpen { path, message } => {
                format!("Could not open cell {}: {}", path, message)
            }
            ExtractError::Query { message } => format!("Query rejected: {}", message),
            ExtractError::Export { message } => format!("Export rejected: {}", message),
            ExtractError::SchemaMismatch { expected, found } => format!(
                "Columns [{}] do not match the output columns [{}]",
                found.join(", "),
                expected.join(", ")
            ),
            ExtractError::Archive { message } => format!("Archive step failed: {}", message),
            ExtractError::Config { message } => format!("Configuration error: {}", message),
            ExtractError::EngineUnavailable { engine } => {
                format!("The '{}' source engine was not compiled in", engine)
            }
            ExtractError::Cancelled => "Operation was cancelled by user".to_string(),
            ExtractError::InvalidPath { path } => format!("Invalid path: {}", path),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ExtractError::Scan { .. } => Some(
                "Check that --input-dir exists, is a directory and is readable.".to_string(),
            ),
            ExtractError::Config { .. } => Some(
                "Check your configuration file syntax and the --layers/--field values."
                    .to_string(),
            ),
            ExtractError::EngineUnavailable { .. } => Some(
                "Rebuild with `--features gdal` (requires libgdal) or use --engine snapshot."
                    .to_string(),
            ),
            ExtractError::SchemaMismatch { .. } => Some(
                "All layers of one run must produce the same columns; do not mix profiles in one output directory."
                    .to_string(),
            ),
            ExtractError::Archive { .. } => Some(
                "The CSV output is intact; remove the stale archive and zip it manually if needed."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ExtractError {
    fn from(error: toml::de::Error) -> Self {
        ExtractError::Config {
            message: error.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(error: zip::result::ZipError) -> Self {
        ExtractError::Archive {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
