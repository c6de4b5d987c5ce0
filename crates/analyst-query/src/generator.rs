//! QueryGenerator - question to executed query with bounded repair
//!
//! Flow per question:
//! 1. Gather schema columns, analyst instructions, and nearest golden
//!    examples
//! 2. Ask the oracle for a single query
//! 3. Vet the candidate: safety guard, optional rewrite, guard again
//! 4. Execute; on an engine error, feed the failing query and the engine
//!    message back to the oracle, up to the configured repair bound
//!
//! An unsafe candidate is terminal. Repair only ever follows an execution
//! failure, and the total number of oracle completions is bounded by
//! `max_repair_attempts + 1`.

use std::fmt::Write;
use std::sync::Arc;

use analyst_core::error::{truncate_for_report, CoreError};
use analyst_core::guard::SafeQueryGuard;
use analyst_core::types::{GoldenQuery, TableData};
use tracing::{debug, info, warn};

use crate::matcher::GoldenExampleMatcher;
use crate::oracle::{ModelOracle, Prompt};
use crate::provider::{ColumnInfo, InstructionsProvider, QueryEngine, QueryRewriter, SchemaProvider};

const MAX_PROMPT_LOG_CHARS: usize = 4_000;
const MAX_ORACLE_OUTPUT_LOG_CHARS: usize = 8_000;

/// Generator config
#[derive(Debug, Clone)]
pub struct QueryGenerationConfig {
    pub model: String,
    pub temperature: f32,
    /// Extra oracle round-trips allowed after an execution failure.
    pub max_repair_attempts: usize,
    /// Golden examples included in the prompt.
    pub max_golden_examples: usize,
    pub system_prompt: String,
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a careful data analyst. Return ONLY one read-only query, no commentary.";

impl Default for QueryGenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_repair_attempts: 2,
            max_golden_examples: 5,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl From<&analyst_config::QueryConfig> for QueryGenerationConfig {
    fn from(config: &analyst_config::QueryConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_repair_attempts: config.max_repair_attempts,
            max_golden_examples: config.max_golden_examples,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// A query that was generated, vetted, and executed successfully.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub query: String,
    pub table: TableData,
    /// How many repair round-trips were needed (0 = first attempt ran).
    pub repair_attempts: usize,
}

/// Question to executed query, with golden-example grounding and bounded
/// self-repair.
pub struct QueryGenerator {
    oracle: Arc<dyn ModelOracle>,
    matcher: GoldenExampleMatcher,
    schema: Arc<dyn SchemaProvider>,
    instructions: Arc<dyn InstructionsProvider>,
    engine: Arc<dyn QueryEngine>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
    guard: SafeQueryGuard,
    config: QueryGenerationConfig,
}

impl QueryGenerator {
    pub fn new(
        oracle: Arc<dyn ModelOracle>,
        matcher: GoldenExampleMatcher,
        schema: Arc<dyn SchemaProvider>,
        instructions: Arc<dyn InstructionsProvider>,
        engine: Arc<dyn QueryEngine>,
        config: QueryGenerationConfig,
    ) -> Self {
        Self {
            oracle,
            matcher,
            schema,
            instructions,
            engine,
            rewriter: None,
            guard: SafeQueryGuard::new(),
            config,
        }
    }

    /// Install a dialect rewrite hook. Rewritten text goes back through the
    /// safety guard.
    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Generate, vet, and execute a query answering `question`.
    pub async fn generate(
        &self,
        db_name: &str,
        question: &str,
    ) -> Result<GeneratedQuery, CoreError> {
        let columns = self.schema.columns(db_name).await?;
        let instructions = self.instructions.instructions(db_name).await?;
        let golden = self
            .matcher
            .nearest(db_name, question, self.config.max_golden_examples)
            .await?;

        let system = build_system_prompt(&self.config.system_prompt, &columns, &instructions);
        let user = build_user_prompt(question, &golden);
        info!(
            db_name = %db_name,
            model = %self.config.model,
            question_len = question.len(),
            column_count = columns.len(),
            golden_count = golden.len(),
            "query generation started"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                system_prompt = %truncate_for_report(&system, MAX_PROMPT_LOG_CHARS),
                user_prompt = %truncate_for_report(&user, MAX_PROMPT_LOG_CHARS),
                "generation prompts"
            );
        }

        let mut query = self.propose(db_name, &system, &user).await?;
        let mut attempt = 0usize;
        loop {
            match self.engine.execute(db_name, &query).await {
                Ok(table) => {
                    info!(
                        db_name = %db_name,
                        repair_attempts = attempt,
                        rows = table.rows.len(),
                        "query generation succeeded"
                    );
                    return Ok(GeneratedQuery {
                        query,
                        table,
                        repair_attempts: attempt,
                    });
                }
                Err(engine_err) => {
                    warn!(
                        db_name = %db_name,
                        attempt,
                        error = %truncate_for_report(&engine_err.to_string(), MAX_PROMPT_LOG_CHARS),
                        "query execution failed"
                    );
                    if attempt >= self.config.max_repair_attempts {
                        return Err(CoreError::Execution {
                            query,
                            message: engine_err.to_string(),
                        });
                    }
                    attempt += 1;
                    let repair = build_repair_prompt(&query, &engine_err.to_string());
                    query = self.propose(db_name, &system, &repair).await?;
                }
            }
        }
    }

    /// One oracle round-trip plus vetting: extract the query text, check it
    /// against the guard, apply the optional rewrite, and guard again.
    async fn propose(
        &self,
        db_name: &str,
        system: &str,
        user: &str,
    ) -> Result<String, CoreError> {
        let output = self
            .oracle
            .complete(Prompt {
                system: system.to_string(),
                user: user.to_string(),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            })
            .await
            .map_err(|e| CoreError::internal(format!("oracle failed: {}", e)))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                oracle_output = %truncate_for_report(&output, MAX_ORACLE_OUTPUT_LOG_CHARS),
                "raw oracle output"
            );
        }

        let candidate = extract_query(&output);
        if !self.guard.is_safe(&candidate) {
            return Err(CoreError::UnsafeQuery { query: candidate });
        }
        let query = match &self.rewriter {
            Some(rewriter) => {
                let rewritten = rewriter.rewrite(db_name, &candidate).await?;
                // The rewrite hook is host code; its output is vetted like
                // the model's.
                if !self.guard.is_safe(&rewritten) {
                    return Err(CoreError::UnsafeQuery { query: rewritten });
                }
                rewritten
            }
            None => candidate,
        };
        Ok(query)
    }
}

fn build_system_prompt(base: &str, columns: &[ColumnInfo], instructions: &str) -> String {
    let mut system = String::new();
    system.push_str(base.trim());
    system.push_str("\n\nSchema:\n");
    for column in columns {
        if column.description.is_empty() {
            let _ = writeln!(
                system,
                "- {}.{} ({})",
                column.table_name, column.column_name, column.data_type
            );
        } else {
            let _ = writeln!(
                system,
                "- {}.{} ({}): {}",
                column.table_name, column.column_name, column.data_type, column.description
            );
        }
    }
    if !instructions.trim().is_empty() {
        system.push_str("\nAnalyst Instructions:\n");
        system.push_str(instructions.trim());
        system.push('\n');
    }
    system.push_str("\nRules:\n");
    system.push_str("1) Return exactly one read-only query, nothing else.\n");
    system.push_str("2) Use only tables and columns listed in Schema.\n");
    system.push_str("3) Never write or alter data.\n");
    system
}

fn build_user_prompt(question: &str, golden: &[GoldenQuery]) -> String {
    let mut user = String::new();
    if !golden.is_empty() {
        user.push_str("Validated examples:\n");
        for example in golden {
            let _ = writeln!(user, "Q: {}", example.question);
            let _ = writeln!(user, "A: {}", example.sql);
        }
        user.push('\n');
    }
    let _ = writeln!(user, "Question:\n{}", question);
    user
}

/// Repair carries only the failing query and the engine message; the schema
/// and instructions are already in the system prompt.
fn build_repair_prompt(query: &str, error: &str) -> String {
    let mut user = String::new();
    user.push_str("The previous query failed. Fix it and return only the corrected query.\n\n");
    let _ = writeln!(user, "Failing query:\n{}\n", query);
    let _ = writeln!(user, "Engine error:\n{}", error);
    user
}

/// Pull the query text out of the oracle output, tolerating a fenced code
/// block with an optional language tag.
fn extract_query(output: &str) -> String {
    let trimmed = output.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        let body = match rest.rfind("```") {
            Some(end) => &rest[..end],
            None => rest,
        };
        return body.trim().to_string();
    }
    trimmed.to_string()
}
