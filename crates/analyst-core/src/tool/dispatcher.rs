//! ToolDispatcher - isolated execution of one tool call
//!
//! The dispatcher is the unit of cancellation: each call runs as its own
//! task under a hard wall-clock budget. On timeout the in-flight work is
//! cancelled and awaited to full teardown before the dispatcher returns.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{truncate_for_report, CoreError, MAX_REPORT_CHARS};
use crate::tool::{FieldSpec, Tool, ToolContext, ToolInput, ToolRegistry, ToolValue};
use crate::types::Artifact;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(240);
const MAX_LOG_TEXT_CHARS: usize = 2_000;

/// Successful dispatch: ordered outputs plus the tool's declared output
/// schema, which the caller needs to know how many storage keys to expect.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub outputs: Vec<Artifact>,
    pub output_schema: Vec<FieldSpec>,
}

/// Executes one tool call with timeout, cancellation, and the typed error
/// taxonomy.
pub struct ToolDispatcher {
    registry: Arc<RwLock<ToolRegistry>>,
    timeout: Duration,
}

impl ToolDispatcher {
    /// Create a dispatcher owning its registry
    pub fn new(registry: ToolRegistry) -> Self {
        Self::with_registry(Arc::new(RwLock::new(registry)))
    }

    /// Create a dispatcher over a shared registry
    pub fn with_registry(registry: Arc<RwLock<ToolRegistry>>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Override the wall-clock budget per tool call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> Arc<RwLock<ToolRegistry>> {
        self.registry.clone()
    }

    /// The wall-clock budget per tool call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `function_name` with already-bound inputs.
    ///
    /// Lookup failure and disabled tools are returned as error values so
    /// callers can continue the plan or report cleanly.
    pub async fn execute(
        &self,
        function_name: &str,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> Result<DispatchResult, CoreError> {
        let (tool, disabled) = {
            let registry = self.registry.read().await;
            match registry.lookup(function_name) {
                Some(tool) => (tool, registry.is_disabled(function_name)),
                None => {
                    return Err(CoreError::ToolNotFound {
                        name: function_name.to_string(),
                    })
                }
            }
        };
        if disabled {
            return Err(CoreError::ToolDisabled {
                name: function_name.to_string(),
            });
        }

        let spec = tool.spec();
        let input = bind_defaults(input, &spec.input_schema)?;

        tracing::debug!(
            run_id = %ctx.run_id,
            step_id = %ctx.step_id,
            tool = %function_name,
            args = %preview_input(&input),
            "tool dispatch started"
        );

        // The spawned task owns a child token so a timeout here never
        // cancels the enclosing plan run.
        let token = ctx.child_token();
        let tool_ctx = ToolContext::with_cancellation_token(
            ctx.run_id.clone(),
            ctx.step_id.clone(),
            token.clone(),
        );
        let mut handle = tokio::spawn(async move { tool.run(input, tool_ctx).await });

        let joined = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                token.cancel();
                // Await teardown to completion before surfacing the timeout.
                let _ = handle.await;
                let err = CoreError::ToolTimeout {
                    tool: function_name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                };
                tracing::warn!(
                    run_id = %ctx.run_id,
                    step_id = %ctx.step_id,
                    tool = %function_name,
                    timeout_secs = self.timeout.as_secs(),
                    "tool dispatch timed out"
                );
                return Err(err);
            }
        };

        let result = match joined {
            Ok(result) => result,
            Err(join_err) => {
                return Err(CoreError::internal(format!(
                    "tool '{}' aborted: {}",
                    function_name, join_err
                )))
            }
        };

        match result {
            Ok(outputs) => {
                tracing::info!(
                    run_id = %ctx.run_id,
                    step_id = %ctx.step_id,
                    tool = %function_name,
                    output_count = outputs.len(),
                    "tool dispatch completed"
                );
                Ok(DispatchResult {
                    outputs,
                    output_schema: spec.output_schema,
                })
            }
            Err(err) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    step_id = %ctx.step_id,
                    tool = %function_name,
                    kind = err.kind(),
                    error = %truncate_for_report(&err.to_string(), MAX_LOG_TEXT_CHARS),
                    "tool dispatch failed"
                );
                Err(bound_error(err))
            }
        }
    }
}

/// Apply schema defaults and reject missing required fields before the
/// callable ever runs.
fn bind_defaults(mut input: ToolInput, schema: &[FieldSpec]) -> Result<ToolInput, CoreError> {
    for field in schema {
        if input.contains(&field.name) {
            continue;
        }
        match &field.default {
            Some(default) => input.insert(&field.name, ToolValue::Literal(default.clone())),
            None => return Err(CoreError::missing_field(&field.name)),
        }
    }
    Ok(input)
}

/// Known failure classes pass through typed; anything else is truncated.
fn bound_error(err: CoreError) -> CoreError {
    match err {
        CoreError::Internal(message) => {
            CoreError::Internal(truncate_for_report(&message, MAX_REPORT_CHARS))
        }
        other => other,
    }
}

fn preview_input(input: &ToolInput) -> String {
    let names: Vec<&str> = input.names().collect();
    truncate_for_report(&names.join(","), MAX_LOG_TEXT_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{FieldType, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::sleep;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn function_name(&self) -> &str {
            "echo"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new("Echo", "echo", "echoes a message")
                .with_input(FieldSpec::new("message", FieldType::String))
                .with_input(
                    FieldSpec::new("prefix", FieldType::String).with_default(json!("> ")),
                )
                .with_output(FieldSpec::new("result", FieldType::String))
        }

        async fn run(
            &self,
            input: ToolInput,
            _ctx: ToolContext,
        ) -> Result<Vec<Artifact>, CoreError> {
            let prefix = input.require_str("prefix")?;
            let message = input.require_str("message")?;
            Ok(vec![Artifact::scalar(format!("{}{}", prefix, message))])
        }
    }

    struct StallingTool {
        cancelled: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Tool for StallingTool {
        fn function_name(&self) -> &str {
            "stall"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new("Stall", "stall", "never returns")
        }

        async fn run(
            &self,
            _input: ToolInput,
            ctx: ToolContext,
        ) -> Result<Vec<Artifact>, CoreError> {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.cancelled.store(true, Ordering::SeqCst);
                    Err(CoreError::internal("cancelled"))
                }
                _ = sleep(Duration::from_secs(3600)) => Ok(vec![Artifact::scalar(0)]),
            }
        }
    }

    fn dispatcher_with(tool: Arc<dyn Tool>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        ToolDispatcher::new(registry)
    }

    #[test]
    fn test_unknown_tool_is_an_error_value() {
        tokio_test::block_on(async {
            let dispatcher = dispatcher_with(Arc::new(EchoTool));
            let ctx = ToolContext::new("run-1", "s1");
            let err = dispatcher
                .execute("nope", ToolInput::new(), &ctx)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "tool_not_found");
        });
    }

    #[test]
    fn test_disabled_tool_is_rejected_at_dispatch() {
        tokio_test::block_on(async {
            let mut registry = ToolRegistry::new();
            registry.register(Arc::new(EchoTool));
            registry.disable("echo").unwrap();
            let dispatcher = ToolDispatcher::new(registry);
            let ctx = ToolContext::new("run-1", "s1");
            let err = dispatcher
                .execute(
                    "echo",
                    ToolInput::new().with("message", ToolValue::from(json!("hi"))),
                    &ctx,
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "tool_disabled");
        });
    }

    #[test]
    fn test_defaults_apply_and_missing_required_fails_before_run() {
        tokio_test::block_on(async {
            let dispatcher = dispatcher_with(Arc::new(EchoTool));
            let ctx = ToolContext::new("run-1", "s1");

            let ok = dispatcher
                .execute(
                    "echo",
                    ToolInput::new().with("message", ToolValue::from(json!("hi"))),
                    &ctx,
                )
                .await
                .unwrap();
            assert_eq!(ok.outputs[0].as_scalar().unwrap(), &json!("> hi"));
            assert_eq!(ok.output_schema.len(), 1);

            let err = dispatcher
                .execute("echo", ToolInput::new(), &ctx)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "missing_upstream_data");
            assert!(err.to_string().contains("'message'"));
        });
    }

    #[test]
    fn test_timeout_cancels_and_awaits_the_tool() {
        tokio_test::block_on(async {
            let cancelled = Arc::new(AtomicBool::new(false));
            let dispatcher = dispatcher_with(Arc::new(StallingTool {
                cancelled: cancelled.clone(),
            }))
            .with_timeout(Duration::from_millis(50));
            let ctx = ToolContext::new("run-1", "s1");

            let err = dispatcher
                .execute("stall", ToolInput::new(), &ctx)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "tool_timeout");
            assert!(err.to_string().contains("stall"));
            // The dispatcher awaited teardown, so the cooperative flag is
            // already observable.
            assert!(cancelled.load(Ordering::SeqCst));
            // The enclosing run was not cancelled.
            assert!(!ctx.is_cancelled());
        });
    }
}
