//! # Analyst Jobs
//!
//! Long-running, resumable deep analyses.
//!
//! This crate contains:
//! - StageStateMachine: loads a job, runs the handler for its current
//!   stage, persists outputs before advancing the stage pointer
//! - Stage handlers: gather_context, explore, predict, optimize, export
//! - StageWorker: drains the stage queue and drives jobs to completion
//!
//! Persistence and queueing go through the analyst-core store traits, so
//! the machinery is backend-agnostic.

pub mod bootstrap;
pub mod handlers;
pub mod machine;
pub mod worker;

pub use bootstrap::{build_dispatcher, explore_config};
pub use handlers::{
    ExploreConfig, ExploreHandler, ExportHandler, GatherContextHandler, OptimizeHandler,
    OracleStageConfig, PredictHandler,
};
pub use machine::{StageHandler, StageStateMachine};
pub use worker::StageWorker;
