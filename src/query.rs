use crate::inspector::CellPlan;
use crate::registry::{ExtractionRule, DEPTH_COLUMN, GEOMETRY_COLUMN, LAYER_COLUMN, LEVEL_COLUMN};
use crate::rowset::format_real;
use crate::scanner::LevelCode;

/// Simplification tolerance applied to every geometry, in source units (degrees).
pub const SIMPLIFY_TOLERANCE: &str = "0.00025";

const UNION_ALL: &str = " UNION ALL ";

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Constant(f64),
    Cast { field: String },
    Text { field: String, level: LevelCode },
}

/// One `SELECT` of the combined query, bound to a single layer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFragment {
    pub layer: String,
    pub projection: Projection,
}

impl QueryFragment {
    pub fn new(layer: &str, rule: &ExtractionRule, level: LevelCode) -> Self {
        let projection = match rule {
            ExtractionRule::Constant(value) => Projection::Constant(*value),
            ExtractionRule::FieldCast(field) => Projection::Cast {
                field: field.clone(),
            },
            ExtractionRule::FieldFilter(field) => Projection::Text {
                field: field.clone(),
                level,
            },
        };

        Self {
            layer: layer.to_string(),
            projection,
        }
    }

    /// Field that must be non-null and non-empty for a row to be kept.
    pub fn filter_field(&self) -> Option<&str> {
        match &self.projection {
            Projection::Constant(_) => None,
            Projection::Cast { field } | Projection::Text { field, .. } => Some(field),
        }
    }

    /// The rule this fragment was built from; the column shape comes from it.
    pub fn rule(&self) -> ExtractionRule {
        match &self.projection {
            Projection::Constant(value) => ExtractionRule::Constant(*value),
            Projection::Cast { field } => ExtractionRule::FieldCast(field.clone()),
            Projection::Text { field, .. } => ExtractionRule::FieldFilter(field.clone()),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.rule().output_columns()
    }

    pub fn to_sql(&self) -> String {
        let geometry = format!(
            "ST_MakeValid(ST_SimplifyPreserveTopology(geometry, {})) AS {}",
            SIMPLIFY_TOLERANCE, GEOMETRY_COLUMN
        );
        let layer_tag = format!("{} AS {}", quote_literal(&self.layer), LAYER_COLUMN);
        let from = format!("FROM {}", quote_identifier(&self.layer));

        let mut sql = match &self.projection {
            Projection::Constant(value) => format!(
                "SELECT {}, {}, CAST({} AS REAL) AS {} {}",
                geometry,
                layer_tag,
                format_real(*value),
                DEPTH_COLUMN,
                from
            ),
            Projection::Cast { field } => format!(
                "SELECT {}, {}, CAST({} AS REAL) AS {} {}",
                geometry,
                layer_tag,
                quote_identifier(field),
                DEPTH_COLUMN,
                from
            ),
            Projection::Text { field, level } => format!(
                "SELECT {}, {} AS {}, {}, {} {}",
                geometry,
                quote_literal(&level.to_string()),
                LEVEL_COLUMN,
                layer_tag,
                quote_identifier(field),
                from
            ),
        };

        if let Some(field) = self.filter_field() {
            let column = quote_identifier(field);
            sql.push_str(&format!(
                " WHERE {} IS NOT NULL AND {} != ''",
                column, column
            ));
        }

        sql
    }
}

/// All fragments of one cell, combined with `UNION ALL`.
#[derive(Debug, Clone, PartialEq)]
pub struct CellQuery {
    fragments: Vec<QueryFragment>,
}

impl CellQuery {
    pub fn fragments(&self) -> &[QueryFragment] {
        &self.fragments
    }

    pub fn layers(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.layer.as_str()).collect()
    }

    /// Result columns; a union takes its names from the first select.
    pub fn columns(&self) -> Vec<String> {
        self.fragments
            .first()
            .map(QueryFragment::columns)
            .unwrap_or_default()
    }

    pub fn to_sql(&self) -> String {
        self.fragments
            .iter()
            .map(QueryFragment::to_sql)
            .collect::<Vec<_>>()
            .join(UNION_ALL)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuerySynthesizer;

impl QuerySynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Returns `None` for an empty plan so the caller never reaches the engine.
    pub fn synthesize(&self, plan: &CellPlan, level: LevelCode) -> Option<CellQuery> {
        if plan.is_empty() {
            return None;
        }

        let fragments = plan
            .entries()
            .iter()
            .map(|entry| QueryFragment::new(&entry.layer, &entry.rule, level))
            .collect();

        Some(CellQuery { fragments })
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
