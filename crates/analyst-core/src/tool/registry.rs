//! ToolRegistry - catalog of dispatchable tools

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::CoreError;

use super::{Tool, ToolSpec};

/// Catalog of tools keyed by function name.
///
/// Registration order is preserved so prompt catalogs and `list` output are
/// stable. The disabled set is registry state; the immutable
/// `cannot_delete`/`cannot_disable` flags come from each tool's spec.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
    disabled: HashSet<String>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering the same function name replaces the
    /// callable but keeps its position in the catalog.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.function_name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Look up a tool by function name (disabled tools are still returned;
    /// the dispatcher rejects them).
    pub fn lookup(&self, function_name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(function_name).cloned()
    }

    pub fn is_disabled(&self, function_name: &str) -> bool {
        self.disabled.contains(function_name)
    }

    /// Disable a tool so it is filtered from prompts and rejected at
    /// dispatch. Refused for tools flagged `cannot_disable`.
    pub fn disable(&mut self, function_name: &str) -> Result<(), CoreError> {
        let tool = self
            .tools
            .get(function_name)
            .ok_or_else(|| CoreError::ToolNotFound {
                name: function_name.to_string(),
            })?;
        if tool.spec().cannot_disable {
            return Err(CoreError::internal(format!(
                "tool '{}' is part of the fixed catalog and cannot be disabled",
                function_name
            )));
        }
        self.disabled.insert(function_name.to_string());
        Ok(())
    }

    pub fn enable(&mut self, function_name: &str) {
        self.disabled.remove(function_name);
    }

    /// Remove a dynamically authored tool. Refused for tools flagged
    /// `cannot_delete`.
    pub fn remove(&mut self, function_name: &str) -> Result<(), CoreError> {
        let tool = self
            .tools
            .get(function_name)
            .ok_or_else(|| CoreError::ToolNotFound {
                name: function_name.to_string(),
            })?;
        if tool.spec().cannot_delete {
            return Err(CoreError::internal(format!(
                "tool '{}' is part of the fixed catalog and cannot be deleted",
                function_name
            )));
        }
        self.tools.remove(function_name);
        self.order.retain(|n| n != function_name);
        self.disabled.remove(function_name);
        Ok(())
    }

    /// Catalog listing in registration order. Disabled tools are filtered
    /// out unless `include_disabled` is set; each spec reflects the current
    /// disabled flag.
    pub fn list(&self, include_disabled: bool) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| {
                let disabled = self.disabled.contains(name);
                if disabled && !include_disabled {
                    return None;
                }
                let mut spec = self.tools.get(name)?.spec();
                spec.disabled = disabled;
                Some(spec)
            })
            .collect()
    }

    /// All registered function names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }
}
