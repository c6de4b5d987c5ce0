//! Artifact - the tagged value that flows between plan steps
//!
//! Artifacts are immutable once written to a ScratchStore.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tabular payload: column names plus row-major cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output of one tool invocation, stored under a scratch key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    /// Tabular result
    Table(TableData),
    /// Single value (count, metric, label)
    Scalar { value: Value },
    /// Rendered chart bytes (SVG/PNG)
    ChartImage { bytes: Vec<u8> },
    /// A failure recorded in place of a result
    ErrorRecord {
        message: String,
        #[serde(default)]
        origin_query: Option<String>,
    },
}

impl Artifact {
    /// Convenience: build a table artifact.
    pub fn table(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self::Table(TableData::new(columns, rows))
    }

    /// Convenience: build a scalar artifact.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar {
            value: value.into(),
        }
    }

    /// Convenience: build an error record.
    pub fn error(message: impl Into<String>, origin_query: Option<String>) -> Self {
        Self::ErrorRecord {
            message: message.into(),
            origin_query,
        }
    }

    pub fn as_table(&self) -> Option<&TableData> {
        match self {
            Self::Table(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::ErrorRecord { .. })
    }

    /// Short human label for logging and previews.
    pub fn describe(&self) -> String {
        match self {
            Self::Table(data) => format!(
                "table[{} col x {} row]",
                data.columns.len(),
                data.rows.len()
            ),
            Self::Scalar { value } => format!("scalar({})", value),
            Self::ChartImage { bytes } => format!("chart[{} bytes]", bytes.len()),
            Self::ErrorRecord { message, .. } => format!("error({})", message),
        }
    }
}
