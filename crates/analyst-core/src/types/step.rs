//! PlanStep type definitions
//!
//! A plan step is an atomic tool invocation proposed by the model, one at a
//! time. Inputs are literals or `global_dict.<key>` references into the plan
//! run's scratch store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix marking an input value as a scratch store reference.
const STORE_REFERENCE_PREFIX: &str = "global_dict.";

/// Strongly-typed step ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// If `value` is a textual `global_dict.<key>` reference, return the key.
pub fn store_reference(value: &Value) -> Option<&str> {
    let text = value.as_str()?;
    let key = text.strip_prefix(STORE_REFERENCE_PREFIX)?;
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// A single step in an evolving plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique identifier for this step
    pub id: StepId,
    /// Human-readable description of what the step does
    #[serde(default)]
    pub description: String,
    /// Function name of the tool to invoke
    pub tool_name: String,
    /// Parameter name -> literal value or "global_dict.<key>" reference.
    /// BTreeMap keeps prompt rendering and logs deterministic.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    /// Scratch keys the tool outputs are written to, positionally
    #[serde(default)]
    pub output_storage_keys: Vec<String>,
    /// Terminal marker: the model signals the plan is complete
    #[serde(default)]
    pub done: bool,
}

impl PlanStep {
    /// Create a new step invoking `tool_name`.
    pub fn new(id: impl Into<StepId>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tool_name: tool_name.into(),
            inputs: BTreeMap::new(),
            output_storage_keys: Vec::new(),
            done: false,
        }
    }

    /// Create the terminal step closing a plan.
    pub fn done(id: impl Into<StepId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tool_name: String::new(),
            inputs: BTreeMap::new(),
            output_storage_keys: Vec::new(),
            done: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a literal input.
    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Add a `global_dict.<key>` reference input.
    pub fn with_reference(mut self, name: impl Into<String>, key: impl AsRef<str>) -> Self {
        self.inputs.insert(
            name.into(),
            Value::String(format!("{}{}", STORE_REFERENCE_PREFIX, key.as_ref())),
        );
        self
    }

    pub fn with_outputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_storage_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}
