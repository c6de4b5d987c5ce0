//! Bridges the unified `analyst.yaml` config onto the runtime components.
//!
//! Each section of [`AnalystConfig`] maps onto the struct that actually
//! governs behavior: query settings onto the generator, explore settings
//! onto the explore handler, the dispatcher budget onto the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use analyst_config::{AnalystConfig, DispatcherConfig};
use analyst_core::tool::{ToolDispatcher, ToolRegistry};

use crate::handlers::{ExploreConfig, OracleStageConfig};

impl From<&analyst_config::ExploreConfig> for ExploreConfig {
    fn from(config: &analyst_config::ExploreConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_steps: config.max_steps,
        }
    }
}

impl From<&analyst_config::ExploreConfig> for OracleStageConfig {
    fn from(config: &analyst_config::ExploreConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

/// Build a dispatcher over `registry` with the configured wall-clock budget.
pub fn build_dispatcher(
    registry: Arc<RwLock<ToolRegistry>>,
    config: &DispatcherConfig,
) -> ToolDispatcher {
    ToolDispatcher::with_registry(registry)
        .with_timeout(Duration::from_secs(config.tool_timeout_secs))
}

/// The explore handler config derived from the full unified config.
pub fn explore_config(config: &AnalystConfig) -> ExploreConfig {
    ExploreConfig::from(&config.explore)
}
