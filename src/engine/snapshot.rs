use super::{CellSource, EngineSettings, VectorSourceEngine};
use crate::error::{ExtractError, Result};
use crate::query::{CellQuery, Projection};
use crate::registry::DEPTH_COLUMN;
use crate::rowset::{CellValue, RowSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

const SOUNDING_LAYER: &str = "SOUNDG";

/// What the S-57 driver would report for one cell: layers, their field names
/// and features with WKT geometry. Snapshots are written already repaired and
/// simplified, so geometry passes through unchanged.
///
/// ```json
/// {"layers": {"DEPARE": {"fields": ["DRVAL1"],
///   "features": [{"geometry": "POLYGON ((0 0, 1 0, 1 1, 0 0))",
///                 "attributes": {"DRVAL1": 5.0}}]}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    #[serde(default)]
    pub layers: BTreeMap<String, SnapshotLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLayer {
    /// Declared schema. When empty, the union of attribute keys is used.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub features: Vec<SnapshotFeature>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFeature {
    #[serde(default)]
    pub geometry: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl SnapshotLayer {
    pub fn field_names(&self) -> Vec<String> {
        if !self.fields.is_empty() {
            return self.fields.clone();
        }

        self.features
            .iter()
            .flat_map(|feature| feature.attributes.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn has_field(&self, field: &str) -> bool {
        self.field_names().iter().any(|f| f == field)
    }
}

impl CellSnapshot {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Applies the driver open options that change what a cell reports.
    pub fn apply_open_options(&mut self, settings: &EngineSettings) {
        if settings.option_enabled("SPLIT_MULTIPOINT") {
            for layer in self.layers.values_mut() {
                split_multipoints(layer);
            }
        }

        if settings.option_enabled("ADD_SOUNDG_DEPTH") {
            if let Some(layer) = self.layers.get_mut(SOUNDING_LAYER) {
                add_sounding_depth(layer);
            }
        }
    }

    fn layer(&self, name: &str) -> Result<&SnapshotLayer> {
        self.layers.get(name).ok_or_else(|| ExtractError::Query {
            message: format!("no such table: {}", name),
        })
    }
}

impl CellSource for CellSnapshot {
    fn has_layer(&self, layer: &str) -> bool {
        self.layers.contains_key(layer)
    }

    fn layer_fields(&self, layer: &str) -> Option<Vec<String>> {
        self.layers.get(layer).map(SnapshotLayer::field_names)
    }

    fn execute(&self, query: &CellQuery) -> Result<RowSet> {
        let mut rows = RowSet::new(query.columns());

        for fragment in query.fragments() {
            let layer = self.layer(&fragment.layer)?;

            if let Some(field) = fragment.filter_field() {
                if !layer.has_field(field) {
                    return Err(ExtractError::Query {
                        message: format!("no such column: {}", field),
                    });
                }
            }

            for feature in &layer.features {
                let value = fragment
                    .filter_field()
                    .and_then(|field| feature.attributes.get(field));

                if fragment.filter_field().is_some() && !passes_filter(value) {
                    continue;
                }

                let geometry = feature
                    .geometry
                    .clone()
                    .map(CellValue::Text)
                    .unwrap_or(CellValue::Null);
                let layer_tag = CellValue::Text(fragment.layer.clone());

                let row = match &fragment.projection {
                    Projection::Constant(depth) => {
                        vec![geometry, layer_tag, CellValue::Real(*depth)]
                    }
                    Projection::Cast { .. } => {
                        vec![geometry, layer_tag, cast_real(value)]
                    }
                    Projection::Text { level, .. } => vec![
                        geometry,
                        CellValue::Text(level.to_string()),
                        layer_tag,
                        text_value(value),
                    ],
                };
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

/// Reads JSON snapshots from disk; one file per cell.
pub struct SnapshotEngine {
    settings: EngineSettings,
}

impl SnapshotEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

impl VectorSourceEngine for SnapshotEngine {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn CellSource>> {
        let cell_open_error = |message: String| ExtractError::CellOpen {
            path: path.display().to_string(),
            message,
        };

        let text = fs::read_to_string(path).map_err(|e| cell_open_error(e.to_string()))?;
        let mut snapshot =
            CellSnapshot::from_json(&text).map_err(|e| cell_open_error(e.to_string()))?;
        snapshot.apply_open_options(&self.settings);

        debug!(path = %path.display(), layers = snapshot.layers.len(), "snapshot opened");
        Ok(Box::new(snapshot))
    }
}

/// `IS NOT NULL AND != ''`
fn passes_filter(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

/// `CAST(x AS REAL)`: text contributes its leading numeric prefix, or 0.
fn cast_real(value: Option<&Value>) -> CellValue {
    match value {
        None | Some(Value::Null) => CellValue::Null,
        Some(Value::Number(number)) => CellValue::Real(number.as_f64().unwrap_or(0.0)),
        Some(Value::Bool(flag)) => CellValue::Real(if *flag { 1.0 } else { 0.0 }),
        Some(Value::String(text)) => CellValue::Real(numeric_prefix(text)),
        Some(other) => CellValue::Real(numeric_prefix(&other.to_string())),
    }
}

fn text_value(value: Option<&Value>) -> CellValue {
    match value {
        None | Some(Value::Null) => CellValue::Null,
        Some(Value::String(text)) => CellValue::Text(text.clone()),
        Some(Value::Bool(flag)) => CellValue::Text(if *flag { "1" } else { "0" }.to_string()),
        Some(other) => CellValue::Text(other.to_string()),
    }
}

fn numeric_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &trimmed[digits_start..end] == "." {
        return 0.0;
    }

    // Exponent only counts when followed by digits
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    trimmed[..end].parse().unwrap_or(0.0)
}

fn split_multipoints(layer: &mut SnapshotLayer) {
    let features = std::mem::take(&mut layer.features);

    for feature in features {
        let points = feature.geometry.as_deref().and_then(split_multipoint);
        match points {
            Some(points) => {
                for point in points {
                    layer.features.push(SnapshotFeature {
                        geometry: Some(point),
                        attributes: feature.attributes.clone(),
                    });
                }
            }
            None => layer.features.push(feature),
        }
    }
}

/// Splits `MULTIPOINT [Z|M|ZM] (...)` into one `POINT` per member.
fn split_multipoint(wkt: &str) -> Option<Vec<String>> {
    let trimmed = wkt.trim();
    let keyword = trimmed.get(..10)?;
    if !keyword.eq_ignore_ascii_case("MULTIPOINT") {
        return None;
    }

    let rest = trimmed[10..].trim_start();
    let open = rest.find('(');
    let tag = match open {
        Some(index) => rest[..index].trim(),
        None => rest.trim(),
    };
    if tag.eq_ignore_ascii_case("EMPTY") || rest.ends_with("EMPTY") {
        return Some(Vec::new());
    }

    let open = open?;
    let close = rest.rfind(')')?;
    let body = rest.get(open + 1..close)?;
    let prefix = if tag.is_empty() {
        "POINT".to_string()
    } else {
        format!("POINT {}", tag.to_ascii_uppercase())
    };

    let points = body
        .split(',')
        .map(|member| member.trim().trim_start_matches('(').trim_end_matches(')').trim())
        .filter(|coords| !coords.is_empty())
        .map(|coords| format!("{} ({})", prefix, coords))
        .collect();

    Some(points)
}

fn add_sounding_depth(layer: &mut SnapshotLayer) {
    if !layer.fields.is_empty() && !layer.fields.iter().any(|f| f == DEPTH_COLUMN) {
        layer.fields.push(DEPTH_COLUMN.to_string());
    }

    for feature in &mut layer.features {
        if let Some(depth) = feature.geometry.as_deref().and_then(point_z) {
            feature
                .attributes
                .insert(DEPTH_COLUMN.to_string(), Value::from(depth));
        }
    }
}

/// Z ordinate of a `POINT Z` / `POINT ZM` / untagged three-dimensional point.
fn point_z(wkt: &str) -> Option<f64> {
    let trimmed = wkt.trim();
    let keyword = trimmed.get(..5)?;
    if !keyword.eq_ignore_ascii_case("POINT") {
        return None;
    }

    let rest = trimmed[5..].trim_start();
    let open = rest.find('(')?;
    let close = rest.rfind(')')?;
    if rest[..open].trim().eq_ignore_ascii_case("M") {
        return None;
    }

    rest.get(open + 1..close)?
        .split_whitespace()
        .nth(2)
        .and_then(|z| z.parse().ok())
}
