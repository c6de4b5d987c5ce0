//! Type definitions shared across the runtime.

mod artifact;
mod golden;
mod job;
mod step;

pub use artifact::{Artifact, TableData};
pub use golden::GoldenQuery;
pub use job::{AnalysisJob, Clarification, JobStatus, Stage};
pub use step::{store_reference, PlanStep, StepId};
