//! Oracle clients: chat completion and embedding
//!
//! Both traits are implemented over an OpenAI-compatible HTTP API and as
//! mocks for tests. The generator and matcher only see the traits.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One chat-completion request.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
}

/// Oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Chat-completion oracle
#[async_trait]
pub trait ModelOracle: Send + Sync {
    async fn complete(&self, prompt: Prompt) -> Result<String, OracleError>;
}

#[async_trait]
impl ModelOracle for Arc<dyn ModelOracle> {
    async fn complete(&self, prompt: Prompt) -> Result<String, OracleError> {
        (**self).complete(prompt).await
    }
}

/// Embedding oracle
#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError>;
}

#[async_trait]
impl EmbeddingOracle for Arc<dyn EmbeddingOracle> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        (**self).embed(text).await
    }
}

/// HTTP client config (OpenAI-compatible)
#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub extra_headers: HeaderMap,
}

impl Default for HttpOracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            extra_headers: HeaderMap::new(),
        }
    }
}

fn build_headers(config: &HttpOracleConfig) -> Result<HeaderMap, OracleError> {
    let mut headers = config.extra_headers.clone();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = &config.api_key {
        let value = format!("Bearer {}", key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&value).map_err(|e| OracleError::Http(e.to_string()))?,
        );
    }
    Ok(headers)
}

/// HTTP chat-completion oracle using an OpenAI-compatible API
pub struct HttpModelOracle {
    client: reqwest::Client,
    config: HttpOracleConfig,
}

impl HttpModelOracle {
    pub fn new(config: HttpOracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[async_trait]
impl ModelOracle for HttpModelOracle {
    async fn complete(&self, prompt: Prompt) -> Result<String, OracleError> {
        let headers = build_headers(&self.config)?;
        let body = ChatRequest {
            model: prompt.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user,
                },
            ],
            temperature: prompt.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Response(format!("HTTP {}: {}", status, text)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| OracleError::Serialization(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| OracleError::Response("Missing choices".to_string()))?;

        Ok(content)
    }
}

/// HTTP embedding oracle using an OpenAI-compatible API
pub struct HttpEmbeddingOracle {
    client: reqwest::Client,
    config: HttpOracleConfig,
}

impl HttpEmbeddingOracle {
    pub fn new(config: HttpOracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingOracle for HttpEmbeddingOracle {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        let headers = build_headers(&self.config)?;
        let body = EmbeddingRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Response(format!("HTTP {}: {}", status, text)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;
        let parsed: EmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| OracleError::Serialization(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| OracleError::Response("Missing embedding data".to_string()))
    }
}

/// Mock chat oracle for tests: returns scripted responses in order and
/// counts how many completions were requested.
pub struct MockModelOracle {
    responses: Mutex<Vec<String>>,
    calls: Mutex<usize>,
}

impl MockModelOracle {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelOracle for MockModelOracle {
    async fn complete(&self, _prompt: Prompt) -> Result<String, OracleError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(OracleError::Response("no scripted response left".to_string()));
        }
        Ok(responses.remove(0))
    }
}

/// Mock embedding oracle: a fixed vector per call.
pub struct MockEmbeddingOracle {
    pub vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingOracle for MockEmbeddingOracle {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, OracleError> {
        Ok(self.vector.clone())
    }
}
