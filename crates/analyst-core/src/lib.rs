//! # Analyst Core
//!
//! Core abstractions and deterministic logic for the analyst runtime.
//!
//! This crate contains:
//! - Artifact / PlanStep / GoldenQuery / AnalysisJob definitions
//! - SafeQueryGuard, ToolRegistry, ToolDispatcher
//! - ScratchStore and the PlanStepExecutor
//! - The shared error taxonomy
//!
//! This crate does NOT care about:
//! - How queries are generated (see analyst-query)
//! - How jobs are scheduled across stages (see analyst-jobs)
//! - Where golden examples or jobs are persisted (see analyst-stores)

pub mod error;
pub mod executor;
pub mod guard;
pub mod store;
pub mod tool;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{CoreError, ErrorReport};
    pub use crate::executor::{PlanRun, PlanStepExecutor, RunContext};
    pub use crate::guard::SafeQueryGuard;
    pub use crate::store::{
        GoldenStore, JobStore, ScratchStore, StageMessage, StageQueue, StoreError,
    };
    pub use crate::tool::{
        CancellationToken, DispatchResult, FieldSpec, FieldType, Tool, ToolContext, ToolDispatcher,
        ToolRegistry, ToolSpec, ToolValue,
    };
    pub use crate::types::{
        AnalysisJob, Artifact, Clarification, GoldenQuery, JobStatus, PlanStep, Stage, StepId,
    };
}

// Re-export key types at crate root
pub use error::{CoreError, ErrorReport};
pub use executor::{PlanRun, PlanStepExecutor};
pub use guard::SafeQueryGuard;
pub use store::{ScratchStore, StoreError};
pub use tool::{Tool, ToolDispatcher, ToolRegistry};
pub use types::{AnalysisJob, Artifact, PlanStep, Stage};
