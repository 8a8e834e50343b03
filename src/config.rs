/*!
 * Governor Configuration
 * JSON configuration for the collector, quota manager, and task manager
 *
 * Durations are milliseconds. Every field has a default, so `{}` is a valid
 * configuration.
 */

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::limits::DEFAULT_SHUTDOWN_GRACE;
use crate::core::serde::duration_millis;
use crate::quota::QuotaConfig;
use crate::resources::CollectorConfig;
use crate::tasks::TaskManagerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Names the JSON config file read by `GovernorConfig::load`
pub const CONFIG_ENV: &str = "PROCGOV_CONFIG";

/// Overrides `tasks.log_dir`
pub const LOG_DIR_ENV: &str = "PROCGOV_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub collector: CollectorConfig,
    pub quota: QuotaConfig,
    pub tasks: TaskManagerConfig,
    #[serde(with = "duration_millis")]
    pub shutdown_grace: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            quota: QuotaConfig::default(),
            tasks: TaskManagerConfig::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl GovernorConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json, &path.display().to_string())
    }

    /// Load from the file named by `PROCGOV_CONFIG`, or defaults when unset,
    /// then apply environment overrides
    pub fn load() -> ConfigResult<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let config = Self::from_json_file(&path)?;
                info!(path = %Path::new(&path).display(), "configuration loaded");
                config
            }
            None => {
                info!("no {} set, using default configuration", CONFIG_ENV);
                Self::default()
            }
        };

        if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
            config.apply_log_dir(PathBuf::from(dir));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_log_dir(&mut self, dir: PathBuf) {
        info!(log_dir = %dir.display(), "task log directory overridden");
        self.tasks.log_dir = dir;
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.collector.validate()?;
        self.quota.validate()?;
        self.tasks.validate()?;
        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::Invalid("shutdown_grace must be positive".into()));
        }
        Ok(())
    }
}
