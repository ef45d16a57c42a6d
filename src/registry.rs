use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};

/// Geometry column emitted by every fragment.
pub const GEOMETRY_COLUMN: &str = "WKT";
/// Layer tag column emitted by every fragment.
pub const LAYER_COLUMN: &str = "LAYERS";
/// Level code column emitted by `FieldFilter` fragments.
pub const LEVEL_COLUMN: &str = "LEVEL";
/// Alias of the numeric value column for `Constant` and `FieldCast` fragments.
pub const DEPTH_COLUMN: &str = "DEPTH";

/// Sentinel depth reported for every land-area feature.
pub const LAND_DEPTH: f64 = -1.0;

pub const DEFAULT_NAME_LAYERS: [&str; 5] = ["LNDARE", "DEPARE", "SEAARE", "HRBFAC", "BRIDGE"];
pub const DEFAULT_NAME_FIELD: &str = "NOBJNM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Depth values per layer with a land sentinel
    Depth,
    /// One text field filtered uniformly across a layer list
    Names,
}

impl Profile {
    pub fn default_output_name(&self) -> &'static str {
        match self {
            Profile::Depth => "depth",
            Profile::Names => "nobjnm",
        }
    }

    pub fn default_force_2d(&self) -> bool {
        matches!(self, Profile::Depth)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionRule {
    Constant(f64),
    FieldCast(String),
    FieldFilter(String),
}

impl ExtractionRule {
    pub fn required_field(&self) -> Option<&str> {
        match self {
            ExtractionRule::Constant(_) => None,
            ExtractionRule::FieldCast(field) | ExtractionRule::FieldFilter(field) => Some(field),
        }
    }

    /// Output columns of a fragment built from this rule, in emission order.
    pub fn output_columns(&self) -> Vec<String> {
        match self {
            ExtractionRule::Constant(_) | ExtractionRule::FieldCast(_) => vec![
                GEOMETRY_COLUMN.to_string(),
                LAYER_COLUMN.to_string(),
                DEPTH_COLUMN.to_string(),
            ],
            ExtractionRule::FieldFilter(field) => vec![
                GEOMETRY_COLUMN.to_string(),
                LEVEL_COLUMN.to_string(),
                LAYER_COLUMN.to_string(),
                field.clone(),
            ],
        }
    }
}

/// Ordered layer name to rule table. Iteration order is fragment order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerRegistry {
    entries: Vec<(String, ExtractionRule)>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Land area first, then the depth layers in ascending name order.
    pub fn depth() -> Self {
        let mut registry = Self::new();
        let entries = [
            ("LNDARE", ExtractionRule::Constant(LAND_DEPTH)),
            ("DEPARE", ExtractionRule::FieldCast("DRVAL1".to_string())),
            ("DEPCNT", ExtractionRule::FieldCast("VALDCO".to_string())),
            ("DRGARE", ExtractionRule::FieldCast("DRVAL1".to_string())),
            ("OBSTRN", ExtractionRule::FieldCast("VALSOU".to_string())),
            // DEPTH only exists when the source is opened with ADD_SOUNDG_DEPTH
            ("SOUNDG", ExtractionRule::FieldCast("DEPTH".to_string())),
            ("UWTROC", ExtractionRule::FieldCast("VALSOU".to_string())),
            ("WRECKS", ExtractionRule::FieldCast("VALSOU".to_string())),
        ];

        for (layer, rule) in entries {
            registry.entries.push((layer.to_string(), rule));
        }

        registry
    }

    pub fn names<S: AsRef<str>>(layers: &[S], field: &str) -> Result<Self> {
        let mut registry = Self::new();
        for layer in layers {
            registry.insert(layer.as_ref(), ExtractionRule::FieldFilter(field.to_string()))?;
        }
        Ok(registry)
    }

    pub fn for_profile<S: AsRef<str>>(profile: Profile, layers: &[S], field: &str) -> Result<Self> {
        let registry = match profile {
            Profile::Depth => Self::depth(),
            Profile::Names => Self::names(layers, field)?,
        };
        registry.validate()?;
        Ok(registry)
    }

    pub fn insert(&mut self, layer: &str, rule: ExtractionRule) -> Result<()> {
        let layer = layer.trim();
        if layer.is_empty() {
            return Err(ExtractError::Config {
                message: "Layer names cannot be empty".to_string(),
            });
        }

        if self.rule_for(layer).is_some() {
            return Err(ExtractError::Config {
                message: format!("Layer '{}' is listed more than once", layer),
            });
        }

        if let Some(field) = rule.required_field() {
            if field.trim().is_empty() {
                return Err(ExtractError::Config {
                    message: format!("Layer '{}' needs a non-empty field name", layer),
                });
            }
        }

        self.entries.push((layer.to_string(), rule));
        Ok(())
    }

    pub fn rule_for(&self, layer: &str) -> Option<&ExtractionRule> {
        self.entries
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, rule)| rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtractionRule)> {
        self.entries.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Columns every fragment of this registry produces.
    pub fn output_columns(&self) -> Option<Vec<String>> {
        self.entries.first().map(|(_, rule)| rule.output_columns())
    }

    /// Every fragment must yield the same column list, otherwise the first
    /// export of a run would depend on which layers that cell happened to carry.
    pub fn validate(&self) -> Result<()> {
        let Some(expected) = self.output_columns() else {
            return Err(ExtractError::Config {
                message: "At least one target layer must be configured".to_string(),
            });
        };

        for (layer, rule) in self.iter() {
            let columns = rule.output_columns();
            if columns != expected {
                return Err(ExtractError::Config {
                    message: format!(
                        "Layer '{}' produces columns [{}] but the registry expects [{}]",
                        layer,
                        columns.join(", "),
                        expected.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }
}
