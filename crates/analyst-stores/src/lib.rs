//! # Analyst Stores
//!
//! In-memory implementations of the analyst-core store traits:
//! - InMemoryGoldenStore: brute-force nearest-neighbour over embeddings
//! - InMemoryJobStore: job records keyed by report id
//! - InMemoryStageQueue: mpsc-backed stage work queue
//!
//! Suitable for tests, demos, and single-process deployments; durable
//! backends implement the same traits.

mod golden;
mod job;
mod queue;

pub use golden::InMemoryGoldenStore;
pub use job::InMemoryJobStore;
pub use queue::InMemoryStageQueue;
