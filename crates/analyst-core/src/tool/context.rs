//! ToolContext type definition

use tokio_util::sync::CancellationToken;

use crate::types::StepId;

/// Execution context for tools
///
/// Provides the identity of the invocation plus a cancellation token.
/// Tools should check the token around long-running work; the dispatcher
/// cancels it when the wall-clock budget is exhausted.
#[derive(Clone)]
pub struct ToolContext {
    /// Plan run this invocation belongs to
    pub run_id: String,
    /// Step being executed
    pub step_id: StepId,
    /// Cooperative cancellation; cancelled by the dispatcher on timeout
    pub cancellation_token: CancellationToken,
}

impl ToolContext {
    pub fn new(run_id: impl Into<String>, step_id: impl Into<StepId>) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation_token(
        run_id: impl Into<String>,
        step_id: impl Into<StepId>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            cancellation_token,
        }
    }

    /// Check if this invocation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Completes when cancellation is requested
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    /// Child token cancelled together with this invocation
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("run_id", &self.run_id)
            .field("step_id", &self.step_id)
            .finish_non_exhaustive()
    }
}
