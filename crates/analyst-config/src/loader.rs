//! Configuration loading and hot-reload support.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::AnalystConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("File watch error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full analyst configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<AnalystConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AnalystConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AnalystConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.query.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "query.model must not be empty".to_string(),
        ));
    }

    if config.query.max_golden_examples == 0 {
        return Err(ConfigError::Invalid(
            "query.max_golden_examples must be > 0".to_string(),
        ));
    }

    if config.dispatcher.tool_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "dispatcher.tool_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.explore.max_steps == 0 {
        return Err(ConfigError::Invalid(
            "explore.max_steps must be > 0".to_string(),
        ));
    }

    if config.export.max_report_chars == 0 {
        return Err(ConfigError::Invalid(
            "export.max_report_chars must be > 0".to_string(),
        ));
    }

    for (label, spec) in [("job", &config.stores.job), ("golden", &config.stores.golden)] {
        if spec.backend.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "stores.{}.backend must not be empty",
                label
            )));
        }
    }

    Ok(())
}

/// Manages unified configuration with hot-reload support.
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<AnalystConfig>>,
}

impl ConfigManager {
    /// Create a new config manager.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(AnalystConfig::default())),
        }
    }

    /// Get a reference to the current config.
    pub fn config(&self) -> Arc<RwLock<AnalystConfig>> {
        self.config.clone()
    }

    /// Load configuration from file.
    pub async fn load(&self) -> Result<(), ConfigError> {
        let config = load_config(&self.path)?;
        let mut current = self.config.write().await;
        *current = config;
        Ok(())
    }

    /// Start watching for config file changes.
    pub fn start_watching(self: &Arc<Self>) -> Result<ConfigWatcher, ConfigError> {
        let manager = Arc::clone(self);
        let handle = tokio::runtime::Handle::current();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        let manager = Arc::clone(&manager);
                        handle.spawn(async move {
                            if let Err(e) = manager.load().await {
                                tracing::error!("Failed to reload config: {}", e);
                            } else {
                                tracing::info!("Config reloaded successfully");
                            }
                        });
                    }
                }
            })?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        Ok(ConfigWatcher { _watcher: watcher })
    }
}

/// Keeps the file watcher alive.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalystConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.query.max_repair_attempts, 2);
        assert_eq!(config.dispatcher.tool_timeout_secs, 240);
        assert_eq!(config.explore.max_steps, 12);
        assert_eq!(config.export.max_report_chars, 8_000);
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "query:\n  model: gpt-4o\n  max_repair_attempts: 1\nexplore:\n  max_steps: 6\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.query.model, "gpt-4o");
        assert_eq!(config.query.max_repair_attempts, 1);
        assert_eq!(config.explore.max_steps, 6);
        // Untouched sections keep their defaults.
        assert_eq!(config.dispatcher.tool_timeout_secs, 240);
        assert_eq!(config.stores.job.backend, "in_memory");
    }

    #[test]
    fn test_zero_bounds_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dispatcher:\n  tool_timeout_secs: 0\n").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_manager_load_replaces_current_config() {
        tokio_test::block_on(async {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "app:\n  name: sales-analyst\n").unwrap();

            let manager = ConfigManager::new(file.path());
            manager.load().await.unwrap();
            let config = manager.config();
            assert_eq!(config.read().await.app.name, "sales-analyst");
        });
    }
}
