//! StageWorker - drains the stage queue and drives jobs forward
//!
//! Each message advances its job by exactly one stage; a non-terminal job is
//! re-enqueued so long analyses interleave fairly with fresh submissions.
//! A failed stage has already absorbed the job into Failed, so the worker
//! only logs and moves on.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use analyst_core::store::StageMessage;

use crate::machine::StageStateMachine;

pub struct StageWorker {
    machine: Arc<StageStateMachine>,
}

impl StageWorker {
    pub fn new(machine: Arc<StageStateMachine>) -> Self {
        Self { machine }
    }

    /// Consume messages until the queue closes or shutdown is requested.
    pub async fn run(
        self,
        mut receiver: UnboundedReceiver<StageMessage>,
        shutdown: CancellationToken,
    ) {
        info!("stage worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("stage worker shutting down");
                    break;
                }
                message = receiver.recv() => {
                    let Some(message) = message else {
                        info!("stage queue closed, worker exiting");
                        break;
                    };
                    self.process(message).await;
                }
            }
        }
    }

    async fn process(&self, message: StageMessage) {
        match self.machine.advance(&message.report_id).await {
            Ok(job) if job.is_terminal() => {
                info!(report_id = %job.report_id, stage = %job.stage, "job reached terminal state");
            }
            Ok(job) => {
                if let Err(err) = self.machine.enqueue_stage(&job.report_id, job.stage).await {
                    warn!(
                        report_id = %job.report_id,
                        error = %err,
                        "failed to re-enqueue job"
                    );
                }
            }
            // advance() already persisted the Failed status.
            Err(err) => {
                warn!(
                    report_id = %message.report_id,
                    stage = %message.stage,
                    error = %err,
                    "stage advance failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::StageHandler;
    use analyst_core::error::CoreError;
    use analyst_core::types::{AnalysisJob, Stage};
    use analyst_stores::{InMemoryJobStore, InMemoryStageQueue};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct EchoHandler;

    #[async_trait]
    impl StageHandler for EchoHandler {
        async fn run(&self, job: &AnalysisJob, _inputs: &Value) -> Result<Value, CoreError> {
            Ok(json!({ "stage": job.stage.to_string() }))
        }
    }

    #[test]
    fn test_worker_drives_a_job_to_done() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryJobStore::new());
            let (queue, receiver) = InMemoryStageQueue::channel();
            let mut machine = StageStateMachine::new(store.clone(), Arc::new(queue));
            for stage in Stage::ALL {
                if !stage.is_terminal() {
                    machine = machine.with_handler(stage, Arc::new(EchoHandler));
                }
            }
            let machine = Arc::new(machine);

            let shutdown = CancellationToken::new();
            let worker = StageWorker::new(machine.clone());
            let worker_task = tokio::spawn(worker.run(receiver, shutdown.clone()));

            machine
                .submit(AnalysisJob::new("r1", "sales", "trends"))
                .await
                .unwrap();

            let mut done = false;
            for _ in 0..100 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let job = machine.load("r1").await.unwrap().unwrap();
                if job.stage == Stage::Done {
                    done = true;
                    for stage in Stage::ALL {
                        if !stage.is_terminal() {
                            assert!(job.outputs_for(stage).is_some(), "missing {}", stage);
                        }
                    }
                    break;
                }
            }
            assert!(done, "job never reached Done");

            shutdown.cancel();
            worker_task.await.unwrap();
        });
    }
}
