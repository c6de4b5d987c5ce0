//! # Analyst Config
//!
//! Unified single-file configuration for the analyst runtime. A single
//! `analyst.yaml` configures query generation, tool dispatch, exploration,
//! stores, and observability settings.

mod loader;

pub use loader::{load_config, ConfigError, ConfigManager, ConfigWatcher};

use serde::Deserialize;

/// Top-level configuration schema.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalystConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub explore: ExploreConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            query: QueryConfig::default(),
            dispatcher: DispatcherConfig::default(),
            explore: ExploreConfig::default(),
            export: ExportConfig::default(),
            stores: StoresConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "analyst".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Query generation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    /// Extra oracle round-trips after an execution failure.
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: usize,
    /// Golden examples included per prompt.
    #[serde(default = "default_max_golden_examples")]
    pub max_golden_examples: usize,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_repair_attempts: default_max_repair_attempts(),
            max_golden_examples: default_max_golden_examples(),
            system_prompt: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_repair_attempts() -> usize {
    2
}

fn default_max_golden_examples() -> usize {
    5
}

/// Tool dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Wall-clock budget per tool call.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    240
}

/// Exploration stage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExploreConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_explore_temperature")]
    pub temperature: f32,
    /// Oracle round-trips per explore stage.
    #[serde(default = "default_explore_max_steps")]
    pub max_steps: usize,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_explore_temperature(),
            max_steps: default_explore_max_steps(),
        }
    }
}

fn default_explore_temperature() -> f32 {
    0.2
}

fn default_explore_max_steps() -> usize {
    12
}

/// Export stage limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Character cap for the final narrative report.
    #[serde(default = "default_max_report_chars")]
    pub max_report_chars: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_report_chars: default_max_report_chars(),
        }
    }
}

fn default_max_report_chars() -> usize {
    8_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoresConfig {
    #[serde(default)]
    pub job: StoreSpec,
    #[serde(default)]
    pub golden: StoreSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSpec {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub connection_url: Option<String>,
}

impl Default for StoreSpec {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection_url: None,
        }
    }
}

fn default_backend() -> String {
    "in_memory".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
