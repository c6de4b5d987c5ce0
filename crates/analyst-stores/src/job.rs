//! In-memory job store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use analyst_core::store::{JobStore, StoreError};
use analyst_core::types::AnalysisJob;

/// Job records keyed by report id. `save` replaces the whole record under
/// one write lock, so a reader never observes a half-updated job.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, AnalysisJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn load(&self, report_id: &str) -> Result<Option<AnalysisJob>, StoreError> {
        Ok(self.jobs.read().await.get(report_id).cloned())
    }

    async fn save(&self, job: &AnalysisJob) -> Result<(), StoreError> {
        self.jobs
            .write()
            .await
            .insert(job.report_id.clone(), job.clone());
        Ok(())
    }

    async fn delete(&self, report_id: &str) -> Result<(), StoreError> {
        self.jobs.write().await.remove(report_id);
        Ok(())
    }
}
