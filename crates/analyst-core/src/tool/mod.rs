//! Tool abstraction module
//!
//! This module defines the Tool trait and related types:
//! - Tool: the core trait for dispatchable analysis units
//! - ToolSpec / FieldSpec: typed input/output schema used for prompt
//!   catalogs and pre-dispatch validation
//! - ToolInput / ToolValue: resolved arguments (literals or artifacts)
//! - ToolContext: execution context with cooperative cancellation
//! - ToolRegistry / ToolDispatcher: catalog and isolated execution

mod context;
mod dispatcher;
mod input;
mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use context::ToolContext;
pub use dispatcher::{DispatchResult, ToolDispatcher};
pub use input::{ToolInput, ToolValue};
pub use registry::ToolRegistry;

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::types::Artifact;

/// Tool trait - the unit of dispatch for plan steps
///
/// Tools are black boxes to the executor. They can reach external engines,
/// render charts, or run statistics; they must poll the context's
/// cancellation token around long operations and are responsible for their
/// own side-effect hygiene when cancelled.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Machine name used for dispatch (must be unique)
    fn function_name(&self) -> &str;

    /// Full spec: identity, description, input/output schema, flags
    fn spec(&self) -> ToolSpec;

    /// Execute the tool. Outputs are ordered to match the declared
    /// output schema.
    async fn run(&self, input: ToolInput, ctx: ToolContext) -> Result<Vec<Artifact>, CoreError>;
}

/// Type tag for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Table,
    Chart,
    Any,
}

/// One named field in a tool's input or output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
    /// Fields without a default are required at dispatch.
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Tool metadata for the catalog, prompts, and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Display name
    pub name: String,
    /// Dispatch name
    pub function_name: String,
    /// Free-text description (shown to the planning model)
    pub description: String,
    /// Ordered input schema
    #[serde(default)]
    pub input_schema: Vec<FieldSpec>,
    /// Ordered output schema; the executor zips outputs against storage keys
    #[serde(default)]
    pub output_schema: Vec<FieldSpec>,
    /// Filtered from prompts and rejected at dispatch when set
    #[serde(default)]
    pub disabled: bool,
    /// Immutable: the catalog refuses to remove this tool
    #[serde(default)]
    pub cannot_delete: bool,
    /// Immutable: the catalog refuses to disable this tool
    #[serde(default)]
    pub cannot_disable: bool,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        function_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            function_name: function_name.into(),
            description: description.into(),
            input_schema: Vec::new(),
            output_schema: Vec::new(),
            disabled: false,
            cannot_delete: false,
            cannot_disable: false,
        }
    }

    pub fn with_input(mut self, field: FieldSpec) -> Self {
        self.input_schema.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldSpec) -> Self {
        self.output_schema.push(field);
        self
    }

    /// Mark the tool as part of the fixed catalog (undeletable, undisablable).
    pub fn protected(mut self) -> Self {
        self.cannot_delete = true;
        self.cannot_disable = true;
        self
    }
}
