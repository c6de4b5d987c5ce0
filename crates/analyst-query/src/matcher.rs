//! GoldenExampleMatcher - curated examples by embedding proximity
//!
//! Curated question/query pairs ("golden examples") anchor generation to the
//! house dialect. The matcher embeds an incoming question and asks the store
//! for the nearest examples; an empty store simply yields no examples.

use std::sync::Arc;

use analyst_core::error::CoreError;
use analyst_core::store::GoldenStore;
use analyst_core::types::GoldenQuery;

use crate::oracle::EmbeddingOracle;

pub struct GoldenExampleMatcher {
    embedder: Arc<dyn EmbeddingOracle>,
    store: Arc<dyn GoldenStore>,
}

impl GoldenExampleMatcher {
    pub fn new(embedder: Arc<dyn EmbeddingOracle>, store: Arc<dyn GoldenStore>) -> Self {
        Self { embedder, store }
    }

    /// The `k` examples nearest to `question` within `db_name`, closest
    /// first. Fewer than `k` (including zero) is a normal outcome.
    pub async fn nearest(
        &self,
        db_name: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<GoldenQuery>, CoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| CoreError::internal(format!("embedding failed: {}", e)))?;
        let examples = self
            .store
            .get_nearest(db_name, &vector, k)
            .await
            .map_err(|e| CoreError::internal(format!("golden lookup failed: {}", e)))?;
        tracing::debug!(
            db_name = %db_name,
            requested = k,
            found = examples.len(),
            "golden examples matched"
        );
        Ok(examples)
    }

    /// Curate a new example: embed the question and upsert the pair.
    pub async fn remember(
        &self,
        db_name: &str,
        question: &str,
        query: &str,
    ) -> Result<(), CoreError> {
        let vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| CoreError::internal(format!("embedding failed: {}", e)))?;
        let example = GoldenQuery::new(db_name, question, query, vector);
        self.store
            .upsert(example)
            .await
            .map_err(|e| CoreError::internal(format!("golden upsert failed: {}", e)))?;
        tracing::info!(db_name = %db_name, question = %question, "golden example curated");
        Ok(())
    }

    /// Drop a curated example. Absent examples are a no-op.
    pub async fn forget(&self, db_name: &str, question: &str) -> Result<(), CoreError> {
        self.store
            .delete(db_name, question)
            .await
            .map_err(|e| CoreError::internal(format!("golden delete failed: {}", e)))
    }
}
