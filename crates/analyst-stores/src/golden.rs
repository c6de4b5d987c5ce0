//! In-memory golden example store

use async_trait::async_trait;
use tokio::sync::RwLock;

use analyst_core::store::{GoldenStore, StoreError};
use analyst_core::types::GoldenQuery;

/// Brute-force nearest-neighbour store over golden examples.
///
/// Examples are kept in insertion order; distance ties resolve to the
/// earlier insertion, which makes curation order observable and retrieval
/// deterministic.
#[derive(Default)]
pub struct InMemoryGoldenStore {
    examples: RwLock<Vec<GoldenQuery>>,
}

impl InMemoryGoldenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.examples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.examples.read().await.is_empty()
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl GoldenStore for InMemoryGoldenStore {
    async fn get_nearest(
        &self,
        db_name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<GoldenQuery>, StoreError> {
        let examples = self.examples.read().await;
        let mut scored: Vec<(f32, &GoldenQuery)> = Vec::new();
        for example in examples.iter().filter(|e| e.db_name == db_name) {
            if example.embedding.len() != vector.len() {
                return Err(StoreError::Internal(format!(
                    "embedding dimension mismatch: stored {} vs query {}",
                    example.embedding.len(),
                    vector.len()
                )));
            }
            scored.push((squared_distance(&example.embedding, vector), example));
        }
        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, e)| e.clone()).collect())
    }

    async fn upsert(&self, example: GoldenQuery) -> Result<(), StoreError> {
        let mut examples = self.examples.write().await;
        match examples
            .iter_mut()
            .find(|e| e.db_name == example.db_name && e.question == example.question)
        {
            Some(existing) => *existing = example,
            None => examples.push(example),
        }
        Ok(())
    }

    async fn delete(&self, db_name: &str, question: &str) -> Result<(), StoreError> {
        let mut examples = self.examples.write().await;
        examples.retain(|e| !(e.db_name == db_name && e.question == question));
        Ok(())
    }
}
