//! AnalysisJob type definitions
//!
//! A long-running, resumable analysis driven through ordered stages by the
//! stage state machine in analyst-jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered stages of a deep analysis. Declaration order is execution order;
/// the derived `Ord` backs the monotonic-transition invariant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GatherContext,
    Explore,
    Predict,
    Optimize,
    Export,
    Done,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::GatherContext,
        Stage::Explore,
        Stage::Predict,
        Stage::Optimize,
        Stage::Export,
        Stage::Done,
    ];

    /// The stage after this one, None at Done.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::GatherContext => Some(Stage::Explore),
            Stage::Explore => Some(Stage::Predict),
            Stage::Predict => Some(Stage::Optimize),
            Stage::Optimize => Some(Stage::Export),
            Stage::Export => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::GatherContext => "gather_context",
            Stage::Explore => "explore",
            Stage::Predict => "predict",
            Stage::Optimize => "optimize",
            Stage::Export => "export",
            Stage::Done => "done",
        };
        f.write_str(label)
    }
}

/// Job status - FAILED is an absorbing state reachable from any stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Active,
    Failed {
        reason: String,
    },
}

/// A question asked of the user during context gathering, with its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
}

/// The persisted record of one deep analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Unique report identifier
    pub report_id: String,
    /// Dataset the analysis runs against
    pub db_name: String,
    /// The user's analysis goal, verbatim
    pub objective: String,
    /// Current stage pointer
    pub stage: Stage,
    /// Active or absorbed into Failed
    #[serde(default)]
    pub status: JobStatus,
    /// Inputs each stage started from, keyed by stage
    #[serde(default)]
    pub stage_inputs: BTreeMap<Stage, Value>,
    /// Outputs each completed stage persisted, keyed by stage
    #[serde(default)]
    pub stage_outputs: BTreeMap<Stage, Value>,
    /// Question/answer pairs gathered up front
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    /// Free-text progress line for user display
    #[serde(default)]
    pub status_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(
        report_id: impl Into<String>,
        db_name: impl Into<String>,
        objective: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            report_id: report_id.into(),
            db_name: db_name.into(),
            objective: objective.into(),
            stage: Stage::GatherContext,
            status: JobStatus::Active,
            stage_inputs: BTreeMap::new(),
            stage_outputs: BTreeMap::new(),
            clarifications: Vec::new(),
            status_text: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a job with a generated report id.
    pub fn create(db_name: impl Into<String>, objective: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), db_name, objective)
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal() || matches!(self.status, JobStatus::Failed { .. })
    }

    pub fn outputs_for(&self, stage: Stage) -> Option<&Value> {
        self.stage_outputs.get(&stage)
    }

    /// Record the inputs a stage started from.
    pub fn record_inputs(&mut self, stage: Stage, inputs: Value) {
        self.stage_inputs.insert(stage, inputs);
        self.touch();
    }

    /// Persist a stage's outputs. Must happen before the pointer advances.
    pub fn record_outputs(&mut self, stage: Stage, outputs: Value) {
        self.stage_outputs.insert(stage, outputs);
        self.touch();
    }

    /// Merge the outputs of every stage before `stage` into one object,
    /// keyed by stage name. This is the stage's input blob.
    pub fn accumulated_inputs(&self, stage: Stage) -> Value {
        let mut merged = Map::new();
        for (done_stage, outputs) in &self.stage_outputs {
            if *done_stage < stage {
                merged.insert(done_stage.to_string(), outputs.clone());
            }
        }
        Value::Object(merged)
    }

    /// Advance the stage pointer. Monotonic: never skips, never goes back.
    pub fn advance_stage(&mut self) {
        if let Some(next) = self.stage.next() {
            self.stage = next;
            self.touch();
        }
    }

    /// Discard all state for `stage` and every later stage and reset the
    /// pointer there. Clears a Failed status so the rerun can proceed.
    pub fn discard_from(&mut self, stage: Stage) {
        self.stage_inputs.retain(|s, _| *s < stage);
        self.stage_outputs.retain(|s, _| *s < stage);
        self.stage = stage;
        self.status = JobStatus::Active;
        self.touch();
    }

    /// Absorb into the Failed state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Failed {
            reason: reason.into(),
        };
        self.touch();
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
        self.touch();
    }

    pub fn add_clarification(&mut self, question: impl Into<String>, answer: Option<String>) {
        self.clarifications.push(Clarification {
            question: question.into(),
            answer,
        });
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_order_is_monotonic() {
        let mut stage = Stage::GatherContext;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, Stage::ALL);
    }

    #[test]
    fn test_accumulated_inputs_only_include_prior_stages() {
        let mut job = AnalysisJob::new("r1", "sales", "trends");
        job.record_outputs(Stage::GatherContext, json!({"schema": "orders"}));
        job.record_outputs(Stage::Explore, json!({"rows": 12}));

        let inputs = job.accumulated_inputs(Stage::Predict);
        assert_eq!(inputs["gather_context"]["schema"], "orders");
        assert_eq!(inputs["explore"]["rows"], 12);

        let early = job.accumulated_inputs(Stage::Explore);
        assert!(early.get("explore").is_none());
    }

    #[test]
    fn test_discard_from_resets_pointer_and_drops_later_outputs() {
        let mut job = AnalysisJob::new("r1", "sales", "trends");
        for stage in [
            Stage::GatherContext,
            Stage::Explore,
            Stage::Predict,
            Stage::Optimize,
        ] {
            job.record_outputs(stage, json!({"stage": stage.to_string()}));
            job.advance_stage();
        }
        assert_eq!(job.stage, Stage::Export);
        job.fail("export blew up");

        job.discard_from(Stage::Explore);
        assert_eq!(job.stage, Stage::Explore);
        assert_eq!(job.status, JobStatus::Active);
        assert!(job.outputs_for(Stage::GatherContext).is_some());
        assert!(job.outputs_for(Stage::Explore).is_none());
        assert!(job.outputs_for(Stage::Predict).is_none());
        assert!(job.outputs_for(Stage::Optimize).is_none());
    }

    #[test]
    fn test_create_generates_distinct_report_ids() {
        let a = AnalysisJob::create("sales", "trends");
        let b = AnalysisJob::create("sales", "trends");
        assert!(!a.report_id.is_empty());
        assert_ne!(a.report_id, b.report_id);
        assert_eq!(a.stage, Stage::GatherContext);
    }

    #[test]
    fn test_stage_serializes_as_snake_case() {
        let raw = serde_json::to_string(&Stage::GatherContext).unwrap();
        assert_eq!(raw, "\"gather_context\"");
    }
}
