//! In-memory stage queue

use async_trait::async_trait;
use tokio::sync::mpsc;

use analyst_core::store::{StageMessage, StageQueue, StoreError};
use analyst_core::types::Stage;

/// Unbounded mpsc-backed stage queue. The sender side implements
/// `StageQueue`; the receiver is handed to the background worker. No
/// deduplication: stage handlers are idempotent, so duplicates re-run as
/// no-ops.
pub struct InMemoryStageQueue {
    sender: mpsc::UnboundedSender<StageMessage>,
}

impl InMemoryStageQueue {
    /// Build the queue and its worker-side receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StageMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StageQueue for InMemoryStageQueue {
    async fn enqueue(&self, report_id: &str, stage: Stage) -> Result<(), StoreError> {
        tracing::debug!(report_id = %report_id, stage = %stage, "stage work enqueued");
        self.sender
            .send(StageMessage {
                report_id: report_id.to_string(),
                stage,
            })
            .map_err(|e| StoreError::Connection(format!("stage queue closed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_delivers_in_order() {
        tokio_test::block_on(async {
            let (queue, mut receiver) = InMemoryStageQueue::channel();
            queue.enqueue("r1", Stage::GatherContext).await.unwrap();
            queue.enqueue("r1", Stage::Explore).await.unwrap();

            assert_eq!(
                receiver.recv().await.unwrap(),
                StageMessage {
                    report_id: "r1".to_string(),
                    stage: Stage::GatherContext
                }
            );
            assert_eq!(receiver.recv().await.unwrap().stage, Stage::Explore);
        });
    }

    #[test]
    fn test_enqueue_after_receiver_drop_is_an_error() {
        tokio_test::block_on(async {
            let (queue, receiver) = InMemoryStageQueue::channel();
            drop(receiver);
            let err = queue.enqueue("r1", Stage::Explore).await.unwrap_err();
            assert!(err.to_string().contains("closed"));
        });
    }
}
