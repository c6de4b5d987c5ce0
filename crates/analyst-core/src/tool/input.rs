//! ToolInput / ToolValue type definitions

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::types::{Artifact, TableData};

/// One resolved tool argument: a literal from the plan step, or an artifact
/// substituted for a `global_dict.<key>` reference.
#[derive(Debug, Clone)]
pub enum ToolValue {
    Literal(Value),
    Artifact(Artifact),
}

impl ToolValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => value.as_str(),
            Self::Artifact(Artifact::Scalar { value }) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Literal(value) => value.as_f64(),
            Self::Artifact(Artifact::Scalar { value }) => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Literal(value) => value.as_bool(),
            Self::Artifact(Artifact::Scalar { value }) => value.as_bool(),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableData> {
        match self {
            Self::Artifact(artifact) => artifact.as_table(),
            _ => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            _ => None,
        }
    }
}

impl From<Value> for ToolValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<Artifact> for ToolValue {
    fn from(artifact: Artifact) -> Self {
        Self::Artifact(artifact)
    }
}

/// Fully resolved input for one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolInput {
    values: BTreeMap<String, ToolValue>,
}

impl ToolInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ToolValue) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: ToolValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Required argument, failing with the missing-upstream-data message.
    pub fn require(&self, name: &str) -> Result<&ToolValue, CoreError> {
        self.values
            .get(name)
            .ok_or_else(|| CoreError::missing_field(name))
    }

    /// Required string argument.
    pub fn require_str(&self, name: &str) -> Result<&str, CoreError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| CoreError::missing_field(name))
    }

    /// Required table argument; an empty table is reported as a no-rows
    /// condition rather than a type error.
    pub fn require_table(&self, name: &str) -> Result<&TableData, CoreError> {
        let table = self
            .require(name)?
            .as_table()
            .ok_or_else(|| CoreError::missing_field(name))?;
        if table.is_empty() {
            return Err(CoreError::no_rows());
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_reports_missing_upstream_data() {
        let input = ToolInput::new();
        let err = input.require("data").unwrap_err();
        assert_eq!(err.kind(), "missing_upstream_data");
    }

    #[test]
    fn test_require_table_rejects_empty_table() {
        let input = ToolInput::new().with(
            "data",
            ToolValue::from(Artifact::table(vec!["a".to_string()], vec![])),
        );
        let err = input.require_table("data").unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }

    #[test]
    fn test_scalar_artifact_reads_as_literal() {
        let input = ToolInput::new().with("limit", ToolValue::from(Artifact::scalar(10)));
        assert_eq!(input.get("limit").and_then(ToolValue::as_f64), Some(10.0));
        let input = input.with("name", ToolValue::from(json!("orders")));
        assert_eq!(input.require_str("name").unwrap(), "orders");
    }
}
