//! StageStateMachine - one stage forward per call, persist before advance
//!
//! Invariants:
//! - A stage's outputs are saved before the stage pointer moves past it, so
//!   a crash never loses a completed stage
//! - Re-running a stage whose outputs already exist skips the work and only
//!   repairs the pointer
//! - The pointer is monotonic except through `rerun_from`, which explicitly
//!   discards stage state before rewinding

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use analyst_core::error::{truncate_for_report, CoreError, MAX_REPORT_CHARS};
use analyst_core::store::{JobStore, StageQueue};
use analyst_core::types::{AnalysisJob, Stage};

/// Does the work of one stage. Handlers must be idempotent: the machine may
/// deliver the same stage twice after a crash or a duplicate queue message.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Run the stage. `inputs` is the merged outputs of all prior stages,
    /// keyed by stage name. The returned value becomes this stage's
    /// persisted outputs.
    async fn run(&self, job: &AnalysisJob, inputs: &Value) -> Result<Value, CoreError>;
}

/// Drives jobs through the ordered stages.
pub struct StageStateMachine {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn StageQueue>,
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
}

impl StageStateMachine {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn StageQueue>) -> Self {
        Self {
            store,
            queue,
            handlers: HashMap::new(),
        }
    }

    pub fn with_handler(mut self, stage: Stage, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(stage, handler);
        self
    }

    /// Persist a fresh job and enqueue its first stage.
    pub async fn submit(&self, job: AnalysisJob) -> Result<(), CoreError> {
        let report_id = job.report_id.clone();
        let stage = job.stage;
        self.store
            .save(&job)
            .await
            .map_err(|e| CoreError::internal(format!("job save failed: {}", e)))?;
        self.queue
            .enqueue(&report_id, stage)
            .await
            .map_err(|e| CoreError::internal(format!("enqueue failed: {}", e)))?;
        info!(report_id = %report_id, stage = %stage, "job submitted");
        Ok(())
    }

    pub async fn load(&self, report_id: &str) -> Result<Option<AnalysisJob>, CoreError> {
        self.store
            .load(report_id)
            .await
            .map_err(|e| CoreError::internal(format!("job load failed: {}", e)))
    }

    /// Run the job's current stage and advance the pointer by one.
    ///
    /// Terminal jobs (Done or Failed) are returned unchanged. A stage whose
    /// outputs already exist is not re-run; only the pointer is advanced.
    pub async fn advance(&self, report_id: &str) -> Result<AnalysisJob, CoreError> {
        let mut job = self
            .load(report_id)
            .await?
            .ok_or_else(|| CoreError::internal(format!("unknown job '{}'", report_id)))?;
        if job.is_terminal() {
            return Ok(job);
        }
        let stage = job.stage;

        if job.outputs_for(stage).is_none() {
            let handler = self.handlers.get(&stage).ok_or_else(|| {
                CoreError::StageTransition {
                    stage: stage.to_string(),
                    message: "no handler registered".to_string(),
                }
            })?;

            let inputs = job.accumulated_inputs(stage);
            job.record_inputs(stage, inputs.clone());
            info!(report_id = %report_id, stage = %stage, "stage started");

            match handler.run(&job, &inputs).await {
                Ok(outputs) => {
                    job.record_outputs(stage, outputs);
                    // Outputs must hit the store before the pointer moves.
                    self.save(&job).await?;
                }
                Err(err) => {
                    let message = truncate_for_report(&err.to_string(), MAX_REPORT_CHARS);
                    warn!(
                        report_id = %report_id,
                        stage = %stage,
                        kind = err.kind(),
                        error = %message,
                        "stage failed"
                    );
                    job.fail(message.clone());
                    self.save(&job).await?;
                    return Err(CoreError::StageTransition {
                        stage: stage.to_string(),
                        message,
                    });
                }
            }
        } else {
            info!(report_id = %report_id, stage = %stage, "stage outputs already present, skipping work");
        }

        job.advance_stage();
        self.save(&job).await?;
        info!(report_id = %report_id, stage = %job.stage, "stage advanced");
        Ok(job)
    }

    /// Rewind a job to `stage`, discarding that stage and everything after
    /// it, then enqueue the rerun. Clears a Failed status.
    pub async fn rerun_from(&self, report_id: &str, stage: Stage) -> Result<(), CoreError> {
        let mut job = self
            .load(report_id)
            .await?
            .ok_or_else(|| CoreError::internal(format!("unknown job '{}'", report_id)))?;
        job.discard_from(stage);
        self.save(&job).await?;
        self.queue
            .enqueue(report_id, stage)
            .await
            .map_err(|e| CoreError::internal(format!("enqueue failed: {}", e)))?;
        info!(report_id = %report_id, stage = %stage, "job rewound for rerun");
        Ok(())
    }

    pub(crate) async fn enqueue_stage(&self, report_id: &str, stage: Stage) -> Result<(), CoreError> {
        self.queue
            .enqueue(report_id, stage)
            .await
            .map_err(|e| CoreError::internal(format!("enqueue failed: {}", e)))
    }

    async fn save(&self, job: &AnalysisJob) -> Result<(), CoreError> {
        self.store
            .save(job)
            .await
            .map_err(|e| CoreError::internal(format!("job save failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::types::JobStatus;
    use analyst_stores::{InMemoryJobStore, InMemoryStageQueue};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits `{"ran": <n>}` and counts invocations.
    struct CountingHandler {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl StageHandler for CountingHandler {
        async fn run(&self, _job: &AnalysisJob, _inputs: &Value) -> Result<Value, CoreError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "ran": n }))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl StageHandler for FailingHandler {
        async fn run(&self, _job: &AnalysisJob, _inputs: &Value) -> Result<Value, CoreError> {
            Err(CoreError::internal("boom"))
        }
    }

    fn machine_with_handlers(
        store: Arc<InMemoryJobStore>,
        handler: Arc<dyn StageHandler>,
    ) -> (
        StageStateMachine,
        tokio::sync::mpsc::UnboundedReceiver<analyst_core::store::StageMessage>,
    ) {
        let (queue, receiver) = InMemoryStageQueue::channel();
        let mut machine = StageStateMachine::new(store, Arc::new(queue));
        for stage in Stage::ALL {
            if !stage.is_terminal() {
                machine = machine.with_handler(stage, handler.clone());
            }
        }
        (machine, receiver)
    }

    #[test]
    fn test_advance_walks_all_stages_and_stops_at_done() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryJobStore::new());
            let handler = Arc::new(CountingHandler {
                runs: AtomicUsize::new(0),
            });
            let (machine, _receiver) = machine_with_handlers(store.clone(), handler.clone());
            store
                .save(&AnalysisJob::new("r1", "sales", "trends"))
                .await
                .unwrap();

            let mut last = machine.advance("r1").await.unwrap();
            while !last.is_terminal() {
                last = machine.advance("r1").await.unwrap();
            }
            assert_eq!(last.stage, Stage::Done);
            assert_eq!(handler.runs.load(Ordering::SeqCst), 5);

            // Advancing a terminal job is a no-op.
            let again = machine.advance("r1").await.unwrap();
            assert_eq!(again.stage, Stage::Done);
            assert_eq!(handler.runs.load(Ordering::SeqCst), 5);
        });
    }

    #[test]
    fn test_existing_outputs_skip_the_handler() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryJobStore::new());
            let handler = Arc::new(CountingHandler {
                runs: AtomicUsize::new(0),
            });
            let (machine, _receiver) = machine_with_handlers(store.clone(), handler.clone());

            // Simulate a crash after outputs were saved but before the
            // pointer advanced.
            let mut job = AnalysisJob::new("r1", "sales", "trends");
            job.record_outputs(Stage::GatherContext, json!({"schema": "orders"}));
            store.save(&job).await.unwrap();

            let advanced = machine.advance("r1").await.unwrap();
            assert_eq!(advanced.stage, Stage::Explore);
            assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
            assert_eq!(
                advanced.outputs_for(Stage::GatherContext),
                Some(&json!({"schema": "orders"}))
            );
        });
    }

    #[test]
    fn test_handler_failure_absorbs_the_job() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryJobStore::new());
            let (machine, _receiver) = machine_with_handlers(store.clone(), Arc::new(FailingHandler));
            store
                .save(&AnalysisJob::new("r1", "sales", "trends"))
                .await
                .unwrap();

            let err = machine.advance("r1").await.unwrap_err();
            assert_eq!(err.kind(), "stage_transition_error");

            let job = machine.load("r1").await.unwrap().unwrap();
            assert!(matches!(job.status, JobStatus::Failed { .. }));
            assert!(job.is_terminal());
            // Pointer never moved past the failed stage.
            assert_eq!(job.stage, Stage::GatherContext);
        });
    }

    #[test]
    fn test_rerun_from_discards_and_reruns_later_stages() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryJobStore::new());
            let handler = Arc::new(CountingHandler {
                runs: AtomicUsize::new(0),
            });
            let (machine, _receiver) = machine_with_handlers(store.clone(), handler.clone());
            store
                .save(&AnalysisJob::new("r1", "sales", "trends"))
                .await
                .unwrap();

            let mut last = machine.advance("r1").await.unwrap();
            while !last.is_terminal() {
                last = machine.advance("r1").await.unwrap();
            }

            machine.rerun_from("r1", Stage::Predict).await.unwrap();
            let job = machine.load("r1").await.unwrap().unwrap();
            assert_eq!(job.stage, Stage::Predict);
            assert!(job.outputs_for(Stage::Explore).is_some());
            assert!(job.outputs_for(Stage::Predict).is_none());
            assert!(job.outputs_for(Stage::Export).is_none());

            let mut last = machine.advance("r1").await.unwrap();
            while !last.is_terminal() {
                last = machine.advance("r1").await.unwrap();
            }
            // 5 first pass + 3 rerun (predict, optimize, export).
            assert_eq!(handler.runs.load(Ordering::SeqCst), 8);
        });
    }
}
