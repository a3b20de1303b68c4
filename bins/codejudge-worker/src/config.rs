// Worker configuration management for codejudge
use anyhow::{bail, Context, Result};
use codejudge_common::config::HarnessConfig;
use codejudge_common::redis::{QUEUE_NAME, RESULT_TTL_SECONDS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/worker.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_name: String,
    pub result_ttl_seconds: u64,
    /// BLPOP timeout; bounds how long shutdown waits for an idle worker
    pub poll_timeout_seconds: f64,
    #[serde(flatten)]
    pub harness: HarnessConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: QUEUE_NAME.to_string(),
            result_ttl_seconds: RESULT_TTL_SECONDS,
            poll_timeout_seconds: 5.0,
            harness: HarnessConfig::default(),
        }
    }
}

/// Worker configuration manager
#[derive(Debug, Clone)]
pub struct WorkerConfigManager {
    config: WorkerConfig,
    source: Option<PathBuf>,
}

impl WorkerConfigManager {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Worker config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: WorkerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Self {
            config,
            source: Some(config_path.to_path_buf()),
        })
    }

    /// Load from `CODEJUDGE_CONFIG` or config/worker.json, defaults when neither exists
    pub fn load_default() -> Result<Self> {
        let mut manager = match std::env::var("CODEJUDGE_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(Path::new(DEFAULT_CONFIG_PATH))?,
            Err(_) => {
                warn!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
                Self {
                    config: WorkerConfig::default(),
                    source: None,
                }
            }
        };

        if let Ok(python) = std::env::var("PYTHON_EXECUTABLE") {
            manager.config.harness.python_executable = python;
        }
        manager.validate()?;
        Ok(manager)
    }

    fn validate(&self) -> Result<()> {
        let harness = &self.config.harness;
        if harness.python_executable.trim().is_empty() {
            bail!("python_executable must not be empty");
        }
        if harness.default_timeout_seconds == 0 {
            bail!("default_timeout_seconds must be at least 1");
        }
        if self.config.queue_name.is_empty() {
            bail!("queue_name must not be empty");
        }
        Ok(())
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn harness(&self) -> &HarnessConfig {
        &self.config.harness
    }

    /// File the configuration came from, `None` for defaults
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_flattened_harness_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"queue_name": "judge:q", "default_timeout_seconds": 7, "early_stop": false}}"#
        )
        .unwrap();

        let manager = WorkerConfigManager::load(file.path()).unwrap();
        assert_eq!(manager.config().queue_name, "judge:q");
        assert_eq!(manager.config().result_ttl_seconds, RESULT_TTL_SECONDS);
        assert_eq!(manager.harness().default_timeout_seconds, 7);
        assert!(!manager.harness().early_stop);
        assert_eq!(manager.harness().python_executable, "python3");
        assert_eq!(manager.source(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(WorkerConfigManager::load(Path::new("/nonexistent/worker.json")).is_err());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(WorkerConfigManager::load(file.path()).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let manager = WorkerConfigManager {
            config: WorkerConfig {
                harness: HarnessConfig {
                    default_timeout_seconds: 0,
                    ..HarnessConfig::default()
                },
                ..WorkerConfig::default()
            },
            source: None,
        };
        assert!(manager.validate().is_err());
    }
}
