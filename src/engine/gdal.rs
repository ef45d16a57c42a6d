use super::{CellSource, EngineSettings, VectorSourceEngine};
use crate::error::{ExtractError, Result};
use crate::query::CellQuery;
use crate::rowset::{CellValue, RowSet};
use gdal::vector::sql::Dialect;
use gdal::vector::{FieldValue, LayerAccess};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use std::path::Path;
use tracing::debug;

/// S-57 cells read through libgdal, queried with the SQLite SQL dialect.
pub struct GdalEngine {
    settings: EngineSettings,
}

impl GdalEngine {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        gdal::config::set_config_option("OGR_WKT_PRECISION", &settings.wkt_precision.to_string())
            .map_err(|e| ExtractError::Config {
                message: format!("Cannot set OGR_WKT_PRECISION: {}", e),
            })?;

        Ok(Self { settings })
    }
}

impl VectorSourceEngine for GdalEngine {
    fn name(&self) -> &'static str {
        "gdal"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn CellSource>> {
        let open_options: Vec<&str> = self
            .settings
            .open_options
            .iter()
            .map(String::as_str)
            .collect();

        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_VECTOR,
            open_options: Some(&open_options),
            ..Default::default()
        };

        let dataset = Dataset::open_ex(path, options).map_err(|e| ExtractError::CellOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), layers = dataset.layer_count(), "cell opened");
        Ok(Box::new(GdalCell { dataset }))
    }
}

struct GdalCell {
    dataset: Dataset,
}

impl CellSource for GdalCell {
    fn has_layer(&self, layer: &str) -> bool {
        self.dataset.layer_by_name(layer).is_ok()
    }

    fn layer_fields(&self, layer: &str) -> Option<Vec<String>> {
        let layer = self.dataset.layer_by_name(layer).ok()?;
        let fields = layer.defn().fields().map(|field| field.name()).collect();
        Some(fields)
    }

    fn execute(&self, query: &CellQuery) -> Result<RowSet> {
        let sql = query.to_sql();
        debug!(%sql, "executing cell query");

        let mut rows = RowSet::new(query.columns());
        let result = self
            .dataset
            .execute_sql(&sql, None, Dialect::SQLITE)
            .map_err(|e| ExtractError::Query {
                message: e.to_string(),
            })?;

        let Some(mut result) = result else {
            return Ok(rows);
        };

        for feature in result.features() {
            let geometry = match feature.geometry() {
                Some(geometry) => geometry
                    .wkt()
                    .map(CellValue::Text)
                    .map_err(|e| ExtractError::Query {
                        message: e.to_string(),
                    })?,
                None => CellValue::Null,
            };

            let mut row = vec![geometry];
            row.extend(feature.fields().map(|(_, value)| to_cell_value(value)));
            rows.push(row);
        }

        Ok(rows)
    }
}

fn to_cell_value(value: Option<FieldValue>) -> CellValue {
    match value {
        None => CellValue::Null,
        Some(FieldValue::RealValue(real)) => CellValue::Real(real),
        Some(FieldValue::IntegerValue(int)) => CellValue::Real(f64::from(int)),
        Some(FieldValue::Integer64Value(int)) => CellValue::Real(int as f64),
        Some(other) => other
            .into_string()
            .map(CellValue::Text)
            .unwrap_or(CellValue::Null),
    }
}
