//! Storage abstraction module
//!
//! This module defines the persistence seams of the runtime:
//! - ScratchStore: per-run artifact arena (concrete, in-memory)
//! - JobStore: durable analysis-job records keyed by report id
//! - GoldenStore: curated question/query examples with embeddings
//! - StageQueue: hand-off of (job, stage) work items to the stage worker
//!
//! Backends implement the async traits; the runtime only sees the traits.

mod scratch;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AnalysisJob, GoldenQuery, Stage};

pub use scratch::ScratchStore;

/// Storage error type
#[derive(Error, Debug)]
pub enum StoreError {
    /// Entry not found
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("io error: {0}")]
    Io(String),

    /// Backend connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Other internal error
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Durable store of analysis jobs, keyed by report id.
///
/// `save` replaces the whole record; callers persist a job after every
/// stage boundary so a restart resumes from the last saved stage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load a job by report id
    async fn load(&self, report_id: &str) -> Result<Option<AnalysisJob>, StoreError>;

    /// Persist a job, replacing any existing record with the same report id
    async fn save(&self, job: &AnalysisJob) -> Result<(), StoreError>;

    /// Delete a job record
    async fn delete(&self, report_id: &str) -> Result<(), StoreError>;
}

/// Curated golden examples with embeddings, scoped per database.
#[async_trait]
pub trait GoldenStore: Send + Sync {
    /// The `k` examples nearest to `vector` within `db_name`, closest first.
    /// Ties break by insertion order. Returns fewer than `k` when the store
    /// holds fewer examples; an empty result is not an error.
    async fn get_nearest(
        &self,
        db_name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<GoldenQuery>, StoreError>;

    /// Insert or replace the example with the same (db_name, question).
    async fn upsert(&self, example: GoldenQuery) -> Result<(), StoreError>;

    /// Remove an example; removing an absent example is a no-op.
    async fn delete(&self, db_name: &str, question: &str) -> Result<(), StoreError>;
}

/// One unit of stage work as delivered to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMessage {
    pub report_id: String,
    pub stage: Stage,
}

/// Queue of stage work items consumed by the background worker.
///
/// The queue makes no deduplication effort; stage handlers are idempotent,
/// so a duplicate delivery re-runs as a no-op.
#[async_trait]
pub trait StageQueue: Send + Sync {
    /// Enqueue a (job, stage) work item
    async fn enqueue(&self, report_id: &str, stage: Stage) -> Result<(), StoreError>;
}
