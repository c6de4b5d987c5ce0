//! Shared error taxonomy
//!
//! Every error surfaced to a caller carries a short machine-usable kind and
//! a human-readable message bounded in length, so report payloads never leak
//! stack internals or oversized engine output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap for user-facing error messages.
pub const MAX_REPORT_CHARS: usize = 600;

/// Truncate a message for inclusion in a user-facing report.
pub fn truncate_for_report(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Core error taxonomy
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The guard rejected a query. Terminal: unsafe output is not a
    /// transient fault and is never retried.
    #[error("query rejected by safety guard: {query}")]
    UnsafeQuery { query: String },

    /// The query engine failed. Carries the offending query and the engine
    /// message; drives the bounded repair loop.
    #[error("query execution failed: {message} (query: {query})")]
    Execution { query: String, message: String },

    /// No tool registered under the requested function name.
    #[error("tool '{name}' not found")]
    ToolNotFound { name: String },

    /// The tool exists but is disabled and cannot be dispatched.
    #[error("tool '{name}' is disabled")]
    ToolDisabled { name: String },

    /// The tool did not finish within the dispatch budget.
    #[error("tool '{tool}' timed out after {timeout_secs}s; try narrowing the input volume")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    /// A key/index error inside a tool traced to an absent or malformed
    /// upstream artifact.
    #[error("{message}")]
    MissingUpstreamData { message: String },

    /// A plan step referenced a scratch key that was never written.
    #[error("step '{step_id}' references scratch key '{key}' which was never written")]
    UnresolvedReference { step_id: String, key: String },

    /// Tool produced a different number of outputs than declared storage keys.
    #[error("tool '{tool}' produced {actual} output(s) but {expected} storage key(s) were declared")]
    OutputArityMismatch {
        tool: String,
        expected: usize,
        actual: usize,
    },

    /// A plan step declared a storage key that is already taken, either by
    /// an earlier step or twice within the same step.
    #[error("step '{step_id}' declares storage key '{key}' which is already in use")]
    DuplicateStorageKey { step_id: String, key: String },

    /// A stage handler failed after exhausting its own recovery.
    #[error("stage {stage} failed: {message}")]
    StageTransition { stage: String, message: String },

    /// Anything else, already truncated at construction.
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    /// Missing column/field inside a tool, traced to an upstream step.
    pub fn missing_field(name: impl AsRef<str>) -> Self {
        Self::MissingUpstreamData {
            message: format!(
                "missing column/field '{}', likely because an upstream step did not produce it",
                name.as_ref()
            ),
        }
    }

    /// Empty-data condition inside a tool, traced to an upstream filter.
    pub fn no_rows() -> Self {
        Self::MissingUpstreamData {
            message: "no rows to operate on, likely due to an upstream filter".to_string(),
        }
    }

    /// Wrap an arbitrary failure, truncating the message.
    pub fn internal(message: impl AsRef<str>) -> Self {
        Self::Internal(truncate_for_report(message.as_ref(), MAX_REPORT_CHARS))
    }

    /// Short machine-usable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsafeQuery { .. } => "unsafe_query",
            Self::Execution { .. } => "execution_error",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::ToolDisabled { .. } => "tool_disabled",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::MissingUpstreamData { .. } => "missing_upstream_data",
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::OutputArityMismatch { .. } => "output_arity_mismatch",
            Self::DuplicateStorageKey { .. } => "duplicate_storage_key",
            Self::StageTransition { .. } => "stage_transition_error",
            Self::Internal(_) => "internal",
        }
    }

    /// Only execution failures feed the repair loop; everything else either
    /// indicates a malformed plan or needs caller action.
    pub fn is_repairable(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

/// Structured error surface returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Machine-usable kind, e.g. "tool_timeout".
    pub kind: String,
    /// Human-readable message, bounded in length.
    pub message: String,
}

impl ErrorReport {
    pub fn new(kind: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self {
            kind: kind.into(),
            message: truncate_for_report(message.as_ref(), MAX_REPORT_CHARS),
        }
    }
}

impl From<&CoreError> for ErrorReport {
    fn from(error: &CoreError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<CoreError> for ErrorReport {
    fn from(error: CoreError) -> Self {
        Self::from(&error)
    }
}
