//! # Analyst Query
//!
//! Natural-language to database-query generation for the analyst runtime.
//!
//! This crate contains:
//! - Oracle clients: chat completion and embedding, HTTP and mock
//! - Provider seams: schema, instructions, query engine, optional rewriter
//! - GoldenExampleMatcher: nearest curated examples by embedding distance
//! - QueryGenerator: prompt assembly, guarded execution, bounded repair
//!
//! This crate does NOT care about:
//! - How generated tables flow through a plan (see analyst-core)
//! - Multi-stage job scheduling (see analyst-jobs)

pub mod generator;
pub mod matcher;
pub mod oracle;
pub mod provider;

pub use generator::{GeneratedQuery, QueryGenerationConfig, QueryGenerator};
pub use matcher::GoldenExampleMatcher;
pub use oracle::{
    EmbeddingOracle, HttpEmbeddingOracle, HttpModelOracle, HttpOracleConfig, MockEmbeddingOracle,
    MockModelOracle, ModelOracle, OracleError, Prompt,
};
pub use provider::{
    ColumnInfo, EngineError, InstructionsProvider, QueryEngine, QueryRewriter, SchemaProvider,
};
