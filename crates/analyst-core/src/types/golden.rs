//! GoldenQuery - a human-validated (question, query) pair used as few-shot
//! grounding. Uniqueness key is (db_name, question).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenQuery {
    /// Dataset the pair was validated against
    pub db_name: String,
    /// Natural-language question
    pub question: String,
    /// The validated query text
    pub sql: String,
    /// Fixed-length embedding of the question
    pub embedding: Vec<f32>,
}

impl GoldenQuery {
    pub fn new(
        db_name: impl Into<String>,
        question: impl Into<String>,
        sql: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            question: question.into(),
            sql: sql.into(),
            embedding,
        }
    }
}
