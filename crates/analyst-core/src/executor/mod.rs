//! PlanStepExecutor - sequential execution of plan steps over a scratch arena
//!
//! Responsibilities:
//! - Resolve each step's inputs, substituting artifacts for
//!   `global_dict.<key>` references
//! - Dispatch the step's tool through the ToolDispatcher
//! - Zip the tool's outputs against the declared storage keys and write them
//!   to the run's scratch store
//! - Support redo-from-position: re-running at position N first discards
//!   everything positions N and later produced

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::store::ScratchStore;
use crate::tool::{ToolContext, ToolDispatcher, ToolInput, ToolValue};
use crate::types::{store_reference, PlanStep, StepId};

/// Identity and cancellation scope for one plan run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub cancellation_token: CancellationToken,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation_token(
        run_id: impl Into<String>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            cancellation_token,
        }
    }
}

/// Mutable state of one plan run: the scratch arena plus, per executed
/// position, which keys that position wrote.
#[derive(Debug, Default)]
pub struct PlanRun {
    store: ScratchStore,
    history: Vec<(StepId, Vec<String>)>,
}

impl PlanRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &ScratchStore {
        &self.store
    }

    /// Number of positions executed so far.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Discard everything produced at `position` and later: their scratch
    /// entries and their history records. A position at or past the end is
    /// a no-op.
    pub fn truncate_from(&mut self, position: usize) {
        if position >= self.history.len() {
            return;
        }
        for (_, keys) in self.history.drain(position..) {
            for key in keys {
                self.store.remove(&key);
            }
        }
    }

    fn record(&mut self, step_id: StepId, keys: Vec<String>) {
        self.history.push((step_id, keys));
    }
}

/// Executes plan steps one at a time. Steps are strictly sequential; a step
/// only ever reads artifacts written by earlier positions.
pub struct PlanStepExecutor {
    dispatcher: Arc<ToolDispatcher>,
}

impl PlanStepExecutor {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Execute `step` at `position` within `run`.
    ///
    /// Returns the storage keys written. On any error nothing is written
    /// for this position, though the truncation for a redo has already
    /// happened.
    pub async fn run_step(
        &self,
        position: usize,
        step: &PlanStep,
        run: &mut PlanRun,
        ctx: &RunContext,
    ) -> Result<Vec<String>, CoreError> {
        // Redo-from-here: later positions are stale once this one re-runs.
        run.truncate_from(position);

        // Scratch keys are unique within one run. A key reused across steps
        // (or twice within one step) is a malformed plan, caught before any
        // dispatch happens.
        let mut declared = std::collections::HashSet::new();
        for key in &step.output_storage_keys {
            if run.store.contains(key) || !declared.insert(key.as_str()) {
                return Err(CoreError::DuplicateStorageKey {
                    step_id: step.id.to_string(),
                    key: key.clone(),
                });
            }
        }

        let input = resolve_inputs(step, run.store())?;

        tracing::info!(
            run_id = %ctx.run_id,
            step_id = %step.id,
            position,
            tool = %step.tool_name,
            "executing plan step"
        );

        let tool_ctx = ToolContext::with_cancellation_token(
            ctx.run_id.clone(),
            step.id.clone(),
            ctx.cancellation_token.clone(),
        );
        let result = self.dispatcher.execute(&step.tool_name, input, &tool_ctx).await?;

        let expected = step.output_storage_keys.len();
        let actual = result.outputs.len();
        if expected != actual {
            return Err(CoreError::OutputArityMismatch {
                tool: step.tool_name.clone(),
                expected,
                actual,
            });
        }

        for (key, artifact) in step.output_storage_keys.iter().zip(result.outputs) {
            run.store.insert(key.clone(), artifact);
        }
        run.record(step.id.clone(), step.output_storage_keys.clone());

        tracing::debug!(
            run_id = %ctx.run_id,
            step_id = %step.id,
            keys = %step.output_storage_keys.join(","),
            "plan step outputs stored"
        );
        Ok(step.output_storage_keys.clone())
    }
}

/// Bind a step's declared inputs, substituting scratch artifacts for
/// `global_dict.<key>` references. An unresolved reference fails the step
/// before any dispatch happens.
fn resolve_inputs(step: &PlanStep, store: &ScratchStore) -> Result<ToolInput, CoreError> {
    let mut input = ToolInput::new();
    for (name, value) in &step.inputs {
        match store_reference(value) {
            Some(key) => {
                let artifact = store.get(key).ok_or_else(|| CoreError::UnresolvedReference {
                    step_id: step.id.to_string(),
                    key: key.to_string(),
                })?;
                input.insert(name, ToolValue::Artifact(artifact.clone()));
            }
            None => input.insert(name, ToolValue::Literal(value.clone())),
        }
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{FieldSpec, FieldType, Tool, ToolInput, ToolRegistry, ToolSpec};
    use crate::types::Artifact;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits a fixed number of scalar outputs and counts invocations.
    struct CountingTool {
        name: &'static str,
        outputs: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn function_name(&self) -> &str {
            self.name
        }

        fn spec(&self) -> ToolSpec {
            let mut spec = ToolSpec::new(self.name, self.name, "test tool");
            for i in 0..self.outputs {
                spec = spec.with_output(FieldSpec::new(format!("out{}", i), FieldType::Any));
            }
            spec
        }

        async fn run(
            &self,
            _input: ToolInput,
            _ctx: ToolContext,
        ) -> Result<Vec<Artifact>, CoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.outputs)
                .map(|i| Artifact::scalar(json!(format!("call{}-out{}", call, i))))
                .collect())
        }
    }

    fn executor_with(tools: Vec<Arc<dyn Tool>>) -> PlanStepExecutor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        PlanStepExecutor::new(Arc::new(ToolDispatcher::new(registry)))
    }

    #[test]
    fn test_outputs_zip_against_storage_keys() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let executor = executor_with(vec![Arc::new(CountingTool {
                name: "produce",
                outputs: 2,
                calls: calls.clone(),
            })]);
            let mut run = PlanRun::new();
            let ctx = RunContext::new("run-1");

            let step = PlanStep::new("s1", "produce").with_outputs(["first", "second"]);
            let keys = executor.run_step(0, &step, &mut run, &ctx).await.unwrap();
            assert_eq!(keys, vec!["first".to_string(), "second".to_string()]);
            assert_eq!(
                run.store().get("first").and_then(Artifact::as_scalar),
                Some(&json!("call0-out0"))
            );
            assert_eq!(
                run.store().get("second").and_then(Artifact::as_scalar),
                Some(&json!("call0-out1"))
            );
        });
    }

    #[test]
    fn test_unresolved_reference_fails_before_dispatch() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let executor = executor_with(vec![Arc::new(CountingTool {
                name: "consume",
                outputs: 0,
                calls: calls.clone(),
            })]);
            let mut run = PlanRun::new();
            let ctx = RunContext::new("run-1");

            let step = PlanStep::new("s1", "consume")
                .with_reference("data", "never_written");
            let err = executor.run_step(0, &step, &mut run, &ctx).await.unwrap_err();
            assert_eq!(err.kind(), "unresolved_reference");
            assert!(err.to_string().contains("never_written"));
            // The tool was never dispatched.
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_arity_mismatch_writes_nothing() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let executor = executor_with(vec![Arc::new(CountingTool {
                name: "produce",
                outputs: 2,
                calls,
            })]);
            let mut run = PlanRun::new();
            let ctx = RunContext::new("run-1");

            // Declares three keys but the tool emits two artifacts.
            let step = PlanStep::new("s1", "produce").with_outputs(["a", "b", "c"]);
            let err = executor.run_step(0, &step, &mut run, &ctx).await.unwrap_err();
            assert_eq!(err.kind(), "output_arity_mismatch");
            assert!(run.store().is_empty());
            assert!(run.is_empty());
        });
    }

    #[test]
    fn test_reused_storage_key_fails_and_keeps_earlier_artifact() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let executor = executor_with(vec![Arc::new(CountingTool {
                name: "produce",
                outputs: 1,
                calls: calls.clone(),
            })]);
            let mut run = PlanRun::new();
            let ctx = RunContext::new("run-1");

            let s1 = PlanStep::new("s1", "produce").with_outputs(["k"]);
            let s2 = PlanStep::new("s2", "produce").with_outputs(["k"]);
            executor.run_step(0, &s1, &mut run, &ctx).await.unwrap();

            let err = executor.run_step(1, &s2, &mut run, &ctx).await.unwrap_err();
            assert_eq!(err.kind(), "duplicate_storage_key");
            assert!(err.to_string().contains("'k'"));
            // s1's artifact survives untouched and s2 never dispatched.
            assert_eq!(
                run.store().get("k").and_then(Artifact::as_scalar),
                Some(&json!("call0-out0"))
            );
            assert_eq!(run.len(), 1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_storage_key_repeated_within_one_step_is_rejected() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let executor = executor_with(vec![Arc::new(CountingTool {
                name: "produce",
                outputs: 2,
                calls: calls.clone(),
            })]);
            let mut run = PlanRun::new();
            let ctx = RunContext::new("run-1");

            let step = PlanStep::new("s1", "produce").with_outputs(["a", "a"]);
            let err = executor.run_step(0, &step, &mut run, &ctx).await.unwrap_err();
            assert_eq!(err.kind(), "duplicate_storage_key");
            assert!(run.store().is_empty());
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_redo_truncates_later_positions() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let executor = executor_with(vec![Arc::new(CountingTool {
                name: "produce",
                outputs: 1,
                calls: calls.clone(),
            })]);
            let mut run = PlanRun::new();
            let ctx = RunContext::new("run-1");

            let s1 = PlanStep::new("s1", "produce").with_outputs(["k1"]);
            let s2 = PlanStep::new("s2", "produce").with_outputs(["k2"]);
            let s3 = PlanStep::new("s3", "produce").with_outputs(["k3"]);
            executor.run_step(0, &s1, &mut run, &ctx).await.unwrap();
            executor.run_step(1, &s2, &mut run, &ctx).await.unwrap();
            executor.run_step(2, &s3, &mut run, &ctx).await.unwrap();
            assert_eq!(run.len(), 3);

            // Redo position 1: k2 and k3 are discarded, k1 survives, and the
            // re-run writes a fresh k2.
            executor.run_step(1, &s2, &mut run, &ctx).await.unwrap();
            assert_eq!(run.len(), 2);
            assert!(run.store().contains("k1"));
            assert!(!run.store().contains("k3"));
            assert_eq!(
                run.store().get("k2").and_then(Artifact::as_scalar),
                Some(&json!("call3-out0"))
            );
        });
    }
}
