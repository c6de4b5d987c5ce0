//! Concrete stage handlers
//!
//! - GatherContextHandler: schema, instructions, clarifications into one blob
//! - ExploreHandler: model-proposed plan steps, one at a time, executed
//!   through the PlanStepExecutor
//! - PredictHandler: ordinary least squares over a numeric table with a
//!   train/eval split
//! - OptimizeHandler: grid evaluation over the fitted model, or a narrative
//!   recommendation when there is nothing to optimize numerically
//! - ExportHandler: final narrative report

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use analyst_core::error::{truncate_for_report, CoreError};
use analyst_core::executor::{PlanRun, PlanStepExecutor, RunContext};
use analyst_core::tool::ToolRegistry;
use analyst_core::types::{AnalysisJob, Artifact, PlanStep, TableData};
use analyst_query::oracle::{ModelOracle, Prompt};
use analyst_query::provider::{InstructionsProvider, SchemaProvider};

use crate::machine::StageHandler;

const MAX_CONTEXT_PROMPT_CHARS: usize = 8_000;

/// Model/temperature pair shared by the oracle-backed handlers.
#[derive(Debug, Clone)]
pub struct OracleStageConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for OracleStageConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

fn extract_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Compact rendering of prior-stage outputs for a prompt.
fn context_preview(inputs: &Value) -> String {
    truncate_for_report(&inputs.to_string(), MAX_CONTEXT_PROMPT_CHARS)
}

// ---------------------------------------------------------------------------
// gather_context
// ---------------------------------------------------------------------------

/// Collects everything later stages need to know about the dataset: column
/// metadata, analyst instructions, and the clarifications answered so far.
pub struct GatherContextHandler {
    schema: Arc<dyn SchemaProvider>,
    instructions: Arc<dyn InstructionsProvider>,
}

impl GatherContextHandler {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        instructions: Arc<dyn InstructionsProvider>,
    ) -> Self {
        Self {
            schema,
            instructions,
        }
    }
}

#[async_trait]
impl StageHandler for GatherContextHandler {
    async fn run(&self, job: &AnalysisJob, _inputs: &Value) -> Result<Value, CoreError> {
        let columns = self.schema.columns(&job.db_name).await?;
        let instructions = self.instructions.instructions(&job.db_name).await?;
        info!(
            report_id = %job.report_id,
            db_name = %job.db_name,
            column_count = columns.len(),
            clarification_count = job.clarifications.len(),
            "context gathered"
        );
        Ok(json!({
            "columns": columns,
            "instructions": instructions,
            "clarifications": job.clarifications,
        }))
    }
}

// ---------------------------------------------------------------------------
// explore
// ---------------------------------------------------------------------------

/// Explore config
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    pub model: String,
    pub temperature: f32,
    /// Oracle round-trips allowed before the stage gives up.
    pub max_steps: usize,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_steps: 12,
        }
    }
}

/// Incremental exploration: the model proposes one plan step at a time, the
/// executor runs it, and the result (or failure) goes back into the next
/// prompt. The model closes the plan with a `done` step.
pub struct ExploreHandler {
    oracle: Arc<dyn ModelOracle>,
    executor: Arc<PlanStepExecutor>,
    registry: Arc<RwLock<ToolRegistry>>,
    config: ExploreConfig,
}

impl ExploreHandler {
    pub fn new(
        oracle: Arc<dyn ModelOracle>,
        executor: Arc<PlanStepExecutor>,
        registry: Arc<RwLock<ToolRegistry>>,
        config: ExploreConfig,
    ) -> Self {
        Self {
            oracle,
            executor,
            registry,
            config,
        }
    }

    async fn build_system_prompt(&self, job: &AnalysisJob, inputs: &Value) -> String {
        let mut system = String::new();
        system.push_str(
            "You are exploring a dataset step by step. Propose exactly ONE next step as a \
             JSON object, or close the plan when the objective is answered.",
        );
        system.push_str("\n\nStep shape:\n");
        system.push_str(
            r#"{"id":"s1","tool_name":"...","inputs":{},"output_storage_keys":[],"done":false}"#,
        );
        system.push_str("\n\nRules:\n");
        system.push_str("1) Return ONLY one JSON object, no commentary.\n");
        system.push_str("2) Use only tool names from the Tool Catalog.\n");
        system.push_str(
            "3) Reference an earlier result by passing the string \"global_dict.<key>\" as an \
             input value.\n",
        );
        system.push_str(
            "4) output_storage_keys must list exactly one key per declared tool output.\n",
        );
        system.push_str("5) When the objective is answered, return {\"id\":\"done\",\"tool_name\":\"\",\"done\":true}.\n");
        system.push_str("\nTool Catalog:\n");
        for spec in self.registry.read().await.list(false) {
            let _ = writeln!(system, "- name: {}", spec.function_name);
            let _ = writeln!(system, "  description: {}", spec.description);
            if !spec.input_schema.is_empty() {
                let _ = writeln!(system, "  inputs:");
                for field in &spec.input_schema {
                    let required = if field.default.is_none() {
                        "required"
                    } else {
                        "optional"
                    };
                    let _ = writeln!(
                        system,
                        "    - {} ({:?}, {}): {}",
                        field.name, field.field_type, required, field.description
                    );
                }
            }
            let _ = writeln!(system, "  outputs: {}", spec.output_schema.len());
        }
        system.push_str("\nContext:\n");
        system.push_str(&context_preview(inputs));
        system.push('\n');
        let _ = writeln!(system, "\nObjective:\n{}", job.objective);
        system
    }
}

#[async_trait]
impl StageHandler for ExploreHandler {
    async fn run(&self, job: &AnalysisJob, inputs: &Value) -> Result<Value, CoreError> {
        let system = self.build_system_prompt(job, inputs).await;
        let ctx = RunContext::new(format!("explore-{}", job.report_id));
        let mut run = PlanRun::new();
        let mut transcript: Vec<Value> = Vec::new();
        let mut position = 0usize;
        let mut closed = false;

        for attempt in 0..self.config.max_steps {
            let mut user = String::new();
            if transcript.is_empty() {
                user.push_str("No steps executed yet. Propose the first step.\n");
            } else {
                user.push_str("Executed steps so far:\n");
                for entry in &transcript {
                    let _ = writeln!(user, "- {}", entry);
                }
                user.push_str("\nPropose the next step, or close the plan.\n");
            }

            let output = self
                .oracle
                .complete(Prompt {
                    system: system.clone(),
                    user,
                    model: self.config.model.clone(),
                    temperature: self.config.temperature,
                })
                .await
                .map_err(|e| CoreError::internal(format!("oracle failed: {}", e)))?;

            let Some(raw) = extract_json(&output) else {
                warn!(report_id = %job.report_id, attempt, "explore output contained no JSON");
                transcript.push(json!({"error": "response contained no JSON step"}));
                continue;
            };
            let step: PlanStep = match serde_json::from_str(&raw) {
                Ok(step) => step,
                Err(e) => {
                    warn!(report_id = %job.report_id, attempt, error = %e, "explore step did not parse");
                    transcript.push(json!({"error": format!("invalid step JSON: {}", e)}));
                    continue;
                }
            };
            if step.done {
                closed = true;
                break;
            }

            match self.executor.run_step(position, &step, &mut run, &ctx).await {
                Ok(keys) => {
                    let stored: Vec<String> = keys
                        .iter()
                        .map(|k| {
                            let label = run
                                .store()
                                .get(k)
                                .map(Artifact::describe)
                                .unwrap_or_default();
                            format!("{}={}", k, label)
                        })
                        .collect();
                    transcript.push(json!({
                        "id": step.id,
                        "tool": step.tool_name,
                        "stored": stored,
                    }));
                    position += 1;
                }
                Err(err) => {
                    debug!(report_id = %job.report_id, step_id = %step.id, error = %err, "explore step failed");
                    transcript.push(json!({
                        "id": step.id,
                        "tool": step.tool_name,
                        "error": truncate_for_report(&err.to_string(), 600),
                    }));
                }
            }
        }

        if !closed {
            info!(
                report_id = %job.report_id,
                max_steps = self.config.max_steps,
                "explore budget exhausted without a done step"
            );
        }

        // Tables survive into downstream stages; everything else is
        // summarized.
        let mut tables = Map::new();
        let mut artifacts = Map::new();
        for key in run.store().keys() {
            if let Some(artifact) = run.store().get(key) {
                artifacts.insert(key.to_string(), Value::String(artifact.describe()));
                if let Some(table) = artifact.as_table() {
                    tables.insert(key.to_string(), serde_json::to_value(table).unwrap_or_default());
                }
            }
        }
        Ok(json!({
            "steps": transcript,
            "closed": closed,
            "artifacts": Value::Object(artifacts),
            "tables": Value::Object(tables),
        }))
    }
}

// ---------------------------------------------------------------------------
// predict
// ---------------------------------------------------------------------------

/// Fits y = a*x + b on the widest numeric table the explore stage produced,
/// holding out the tail of the rows for evaluation.
pub struct PredictHandler {
    /// Fraction of rows used for training; the remainder evaluates r².
    pub train_fraction: f64,
}

impl Default for PredictHandler {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
        }
    }
}

impl PredictHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn numeric_columns(table: &TableData) -> Vec<(String, Vec<f64>)> {
    let mut out = Vec::new();
    for name in &table.columns {
        let Some(values) = table.column_values(name) else {
            continue;
        };
        let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        if numbers.len() == table.rows.len() && !numbers.is_empty() {
            out.push((name.clone(), numbers));
        }
    }
    out
}

fn fit_ols(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len() as f64;
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x) * (x - mean_x)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

fn r_squared(xs: &[f64], ys: &[f64], slope: f64, intercept: f64) -> f64 {
    let n = ys.len() as f64;
    if ys.is_empty() {
        return 0.0;
    }
    let mean_y = ys.iter().sum::<f64>() / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y) * (y - mean_y)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| {
            let predicted = slope * x + intercept;
            (y - predicted) * (y - predicted)
        })
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Pull the explore tables out of the accumulated inputs.
fn explore_tables(inputs: &Value) -> Vec<(String, TableData)> {
    let Some(tables) = inputs
        .get("explore")
        .and_then(|e| e.get("tables"))
        .and_then(|t| t.as_object())
    else {
        return Vec::new();
    };
    tables
        .iter()
        .filter_map(|(key, raw)| {
            serde_json::from_value::<TableData>(raw.clone())
                .ok()
                .map(|t| (key.clone(), t))
        })
        .collect()
}

#[async_trait]
impl StageHandler for PredictHandler {
    async fn run(&self, job: &AnalysisJob, inputs: &Value) -> Result<Value, CoreError> {
        let mut best: Option<(String, TableData)> = None;
        for (key, table) in explore_tables(inputs) {
            let better = best
                .as_ref()
                .map(|(_, t)| table.rows.len() > t.rows.len())
                .unwrap_or(true);
            if better && numeric_columns(&table).len() >= 2 {
                best = Some((key, table));
            }
        }

        let Some((key, table)) = best else {
            info!(report_id = %job.report_id, "no numeric table to model, predict skipped");
            return Ok(json!({
                "skipped": "no table with at least two fully numeric columns"
            }));
        };

        let numeric = numeric_columns(&table);
        let (feature_name, xs) = numeric.first().cloned().unwrap_or_default();
        let (target_name, ys) = numeric.last().cloned().unwrap_or_default();
        if xs.len() < 2 {
            info!(report_id = %job.report_id, table = %key, "too few rows to model, predict skipped");
            return Ok(json!({ "skipped": "fewer than two rows" }));
        }

        let split = ((xs.len() as f64) * self.train_fraction).ceil() as usize;
        let split = split.clamp(2, xs.len());
        let (slope, intercept) = fit_ols(&xs[..split], &ys[..split]).ok_or_else(|| {
            CoreError::internal(format!("degenerate feature column '{}'", feature_name))
        })?;
        let r2 = if split < xs.len() {
            r_squared(&xs[split..], &ys[split..], slope, intercept)
        } else {
            r_squared(&xs, &ys, slope, intercept)
        };

        info!(
            report_id = %job.report_id,
            table = %key,
            feature = %feature_name,
            target = %target_name,
            r2,
            "linear model fitted"
        );
        Ok(json!({
            "model": "ols",
            "table": key,
            "feature": feature_name,
            "target": target_name,
            "slope": slope,
            "intercept": intercept,
            "r2": r2,
            "n_train": split,
            "n_eval": xs.len() - split.min(xs.len()),
        }))
    }
}

// ---------------------------------------------------------------------------
// optimize
// ---------------------------------------------------------------------------

/// When predict produced a model, evaluates it over a grid of feature values
/// spanning the observed range and picks the best point for the objective
/// (minimize when the objective says so, maximize otherwise). Without a
/// model, falls back to a narrative recommendation from the oracle.
pub struct OptimizeHandler {
    oracle: Arc<dyn ModelOracle>,
    config: OracleStageConfig,
    pub grid_points: usize,
}

impl OptimizeHandler {
    pub fn new(oracle: Arc<dyn ModelOracle>, config: OracleStageConfig) -> Self {
        Self {
            oracle,
            config,
            grid_points: 21,
        }
    }
}

#[async_trait]
impl StageHandler for OptimizeHandler {
    async fn run(&self, job: &AnalysisJob, inputs: &Value) -> Result<Value, CoreError> {
        let predict = inputs.get("predict");
        let model = predict.and_then(|p| {
            Some((
                p.get("slope")?.as_f64()?,
                p.get("intercept")?.as_f64()?,
                p.get("feature")?.as_str()?.to_string(),
                p.get("table")?.as_str()?.to_string(),
            ))
        });

        if let Some((slope, intercept, feature, table_key)) = model {
            let range = explore_tables(inputs)
                .into_iter()
                .find(|(key, _)| *key == table_key)
                .and_then(|(_, table)| {
                    let values: Vec<f64> = table
                        .column_values(&feature)?
                        .iter()
                        .filter_map(|v| v.as_f64())
                        .collect();
                    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    (min.is_finite() && max.is_finite()).then_some((min, max))
                });

            if let Some((min, max)) = range {
                let minimize = job.objective.to_lowercase().contains("minimize");
                let points = self.grid_points.max(2);
                let mut best_x = min;
                let mut best_y = slope * min + intercept;
                for i in 1..points {
                    let x = min + (max - min) * (i as f64) / ((points - 1) as f64);
                    let y = slope * x + intercept;
                    let better = if minimize { y < best_y } else { y > best_y };
                    if better {
                        best_x = x;
                        best_y = y;
                    }
                }
                info!(
                    report_id = %job.report_id,
                    feature = %feature,
                    best_x,
                    best_y,
                    minimize,
                    "grid optimization complete"
                );
                return Ok(json!({
                    "method": "grid",
                    "feature": feature,
                    "direction": if minimize { "minimize" } else { "maximize" },
                    "best_feature_value": best_x,
                    "predicted_target": best_y,
                }));
            }
        }

        let output = self
            .oracle
            .complete(Prompt {
                system: "You are a data analyst. Give one concrete, actionable recommendation \
                         based on the findings. Two sentences maximum."
                    .to_string(),
                user: format!(
                    "Objective:\n{}\n\nFindings:\n{}",
                    job.objective,
                    context_preview(inputs)
                ),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            })
            .await
            .map_err(|e| CoreError::internal(format!("oracle failed: {}", e)))?;
        Ok(json!({
            "method": "narrative",
            "recommendation": output.trim(),
        }))
    }
}

// ---------------------------------------------------------------------------
// export
// ---------------------------------------------------------------------------

const DEFAULT_MAX_REPORT_CHARS: usize = 8_000;

/// Turns the accumulated stage outputs into the final narrative report.
pub struct ExportHandler {
    oracle: Arc<dyn ModelOracle>,
    config: OracleStageConfig,
    max_report_chars: usize,
}

impl ExportHandler {
    pub fn new(oracle: Arc<dyn ModelOracle>, config: OracleStageConfig) -> Self {
        Self {
            oracle,
            config,
            max_report_chars: DEFAULT_MAX_REPORT_CHARS,
        }
    }

    /// Override the character cap on the final report.
    pub fn with_report_limit(mut self, max_report_chars: usize) -> Self {
        self.max_report_chars = max_report_chars;
        self
    }
}

#[async_trait]
impl StageHandler for ExportHandler {
    async fn run(&self, job: &AnalysisJob, inputs: &Value) -> Result<Value, CoreError> {
        let report = self
            .oracle
            .complete(Prompt {
                system: "You are writing the final report of a data analysis. Summarize the \
                         findings for a business reader: what was asked, what the data showed, \
                         what was modeled, and the recommendation. Use plain prose."
                    .to_string(),
                user: format!(
                    "Objective:\n{}\n\nStage outputs:\n{}",
                    job.objective,
                    context_preview(inputs)
                ),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            })
            .await
            .map_err(|e| CoreError::internal(format!("oracle failed: {}", e)))?;
        info!(report_id = %job.report_id, report_len = report.len(), "report exported");
        Ok(json!({
            "report": truncate_for_report(report.trim(), self.max_report_chars)
        }))
    }
}
