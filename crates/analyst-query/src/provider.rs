//! Provider seams around the query generator
//!
//! The generator never talks to a database or a catalog directly; it goes
//! through these traits so hosts can plug in their own warehouse, docs, and
//! dialect conventions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use analyst_core::error::CoreError;
use analyst_core::types::TableData;

/// One column of schema context fed to the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

impl ColumnInfo {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            data_type: data_type.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Supplies column metadata for a database.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn columns(&self, db_name: &str) -> Result<Vec<ColumnInfo>, CoreError>;
}

/// Supplies free-text analyst instructions for a database (dialect notes,
/// metric definitions, naming conventions). May be empty.
#[async_trait]
pub trait InstructionsProvider: Send + Sync {
    async fn instructions(&self, db_name: &str) -> Result<String, CoreError>;
}

/// Failure reported by the query engine. The message is exactly what the
/// repair loop feeds back to the model.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Executes a read query against a database.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, db_name: &str, query: &str) -> Result<TableData, EngineError>;
}

/// Optional post-generation rewrite hook (dialect fixups, limit injection).
/// Rewritten queries go back through the safety guard before execution.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, db_name: &str, query: &str) -> Result<String, CoreError>;
}
