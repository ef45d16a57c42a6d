use crate::engine::{CellSource, VectorSourceEngine};
use crate::error::Result;
use crate::registry::{ExtractionRule, LayerRegistry};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPresence {
    /// The rule reads no field
    NotRequired,
    Present,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub layer: String,
    pub rule: ExtractionRule,
    pub field_presence: FieldPresence,
}

/// A target layer that exists in the cell but lacks the field its rule reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingField {
    pub layer: String,
    pub field: String,
}

/// Layers of one cell that passed both presence checks, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellPlan {
    entries: Vec<PlanEntry>,
    missing_fields: Vec<MissingField>,
}

impl CellPlan {
    pub fn new(entries: Vec<PlanEntry>, missing_fields: Vec<MissingField>) -> Self {
        Self {
            entries,
            missing_fields,
        }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn missing_fields(&self) -> &[MissingField] {
        &self.missing_fields
    }

    pub fn layers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.layer.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CellInspector;

impl CellInspector {
    pub fn new() -> Self {
        Self
    }

    pub fn open(&self, engine: &dyn VectorSourceEngine, path: &Path) -> Result<Box<dyn CellSource>> {
        engine.open(path)
    }

    pub fn inspect(&self, source: &dyn CellSource, registry: &LayerRegistry) -> CellPlan {
        let mut entries = Vec::new();
        let mut missing_fields = Vec::new();

        for (layer, rule) in registry.iter() {
            if !source.has_layer(layer) {
                continue;
            }

            let field_presence = match rule.required_field() {
                None => FieldPresence::NotRequired,
                Some(field) => {
                    let has_field = source
                        .layer_fields(layer)
                        .is_some_and(|fields| fields.iter().any(|f| f == field));

                    if !has_field {
                        warn!(layer, field, "layer present without required field, skipping layer");
                        missing_fields.push(MissingField {
                            layer: layer.to_string(),
                            field: field.to_string(),
                        });
                        continue;
                    }

                    FieldPresence::Present
                }
            };

            debug!(layer, ?rule, "target layer found");
            entries.push(PlanEntry {
                layer: layer.to_string(),
                rule: rule.clone(),
                field_presence,
            });
        }

        CellPlan::new(entries, missing_fields)
    }
}
