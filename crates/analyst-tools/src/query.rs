//! run_query tool

use std::sync::Arc;

use async_trait::async_trait;

use analyst_core::error::CoreError;
use analyst_core::tool::{FieldSpec, FieldType, Tool, ToolContext, ToolInput, ToolSpec};
use analyst_core::types::Artifact;
use analyst_query::QueryGenerator;

/// Answers a natural-language question with a result table, going through
/// the full generate/guard/repair pipeline.
pub struct RunQueryTool {
    generator: Arc<QueryGenerator>,
}

impl RunQueryTool {
    pub fn new(generator: Arc<QueryGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Tool for RunQueryTool {
    fn function_name(&self) -> &str {
        "run_query"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "Run Query",
            "run_query",
            "Answer a natural-language question about the data with a result table",
        )
        .with_input(
            FieldSpec::new("question", FieldType::String)
                .with_description("What to ask of the data, in plain language"),
        )
        .with_input(
            FieldSpec::new("db_name", FieldType::String)
                .with_description("Dataset to query"),
        )
        .with_output(FieldSpec::new("result", FieldType::Table))
        .protected()
    }

    async fn run(&self, input: ToolInput, ctx: ToolContext) -> Result<Vec<Artifact>, CoreError> {
        let question = input.require_str("question")?;
        let db_name = input.require_str("db_name")?;
        tracing::info!(
            run_id = %ctx.run_id,
            step_id = %ctx.step_id,
            db_name = %db_name,
            "run_query invoked"
        );
        let generated = self.generator.generate(db_name, question).await?;
        Ok(vec![Artifact::Table(generated.table)])
    }
}
