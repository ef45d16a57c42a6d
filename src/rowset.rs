use serde::{Deserialize, Serialize};

/// One attribute value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Real(f64),
    Text(String),
}

impl CellValue {
    /// Text written to a CSV field. Nulls become empty fields.
    pub fn render(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Real(value) => format_real(*value),
            CellValue::Text(text) => text.clone(),
        }
    }
}

/// Result of one query execution: ordered column names and rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<CellValue>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width must match columns");
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Formats a REAL the way SQL literals and the CSV output expect it:
/// integral values without a fractional part, others in shortest form.
pub fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
