#[cfg(feature = "gdal")]
pub mod gdal;
pub mod snapshot;

use crate::error::{ExtractError, Result};
use crate::query::CellQuery;
use crate::rowset::RowSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use snapshot::{CellSnapshot, SnapshotEngine};

/// Opens cell files. Shared across worker threads, so it holds configuration only.
pub trait VectorSourceEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn CellSource>>;
}

/// One opened cell file.
pub trait CellSource {
    fn has_layer(&self, layer: &str) -> bool;

    /// Field names of a layer, or `None` when the layer does not exist.
    fn layer_fields(&self, layer: &str) -> Option<Vec<String>>;

    /// Runs the combined query; geometry repair and simplification happen here.
    fn execute(&self, query: &CellQuery) -> Result<RowSet>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// libgdal S-57 driver with the SQLite SQL dialect
    Gdal,
    /// JSON cell snapshots evaluated in process
    Snapshot,
}

impl Default for EngineKind {
    fn default() -> Self {
        if cfg!(feature = "gdal") {
            EngineKind::Gdal
        } else {
            EngineKind::Snapshot
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Gdal => write!(f, "gdal"),
            EngineKind::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Explicit replacement for process-wide driver options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub open_options: Vec<String>,
    pub wkt_precision: u8,
}

impl EngineSettings {
    pub fn option_enabled(&self, name: &str) -> bool {
        self.open_options.iter().any(|option| {
            option
                .split_once('=')
                .is_some_and(|(key, value)| key.eq_ignore_ascii_case(name) && is_truthy(value))
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "ON" | "YES" | "TRUE" | "1"
    )
}

/// `Gdal` needs the `gdal` cargo feature; `Snapshot` is always available.
pub fn create_engine(kind: EngineKind, settings: EngineSettings) -> Result<Box<dyn VectorSourceEngine>> {
    match kind {
        EngineKind::Snapshot => Ok(Box::new(SnapshotEngine::new(settings))),
        #[cfg(feature = "gdal")]
        EngineKind::Gdal => Ok(Box::new(gdal::GdalEngine::new(settings)?)),
        #[cfg(not(feature = "gdal"))]
        EngineKind::Gdal => Err(ExtractError::EngineUnavailable {
            engine: kind.to_string(),
        }),
    }
}
