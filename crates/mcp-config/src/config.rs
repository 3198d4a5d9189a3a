use crate::{
    CONFIG_DIR_ENV, CONFIG_FILENAME, ConfigError, ConfigErrorResult, DEFAULT_CONFIG_DIR,
    LoggingConfig, SupervisorConfig,
};

use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config with full production error handling.
    ///
    /// Loading order:
    /// 1. Check for MCPS_CONFIG_DIR env var, else use ./.mcps/
    /// 2. Auto-create config directory if it doesn't exist
    /// 3. Load config.toml if it exists, else use defaults
    /// 4. Apply MCPS_* environment variable overrides
    ///
    /// Does NOT validate - call validate() after load().
    pub fn load() -> ConfigErrorResult<Self> {
        let config_dir = Self::config_dir()?;

        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::Io {
                path: config_dir.clone(),
                source: e,
            })?;
        }

        let config_path = config_dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            Self::load_toml(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    fn load_toml(path: &Path) -> ConfigErrorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the config directory.
    /// Priority: MCPS_CONFIG_DIR env var > ./.mcps/ (relative to cwd)
    pub fn config_dir() -> ConfigErrorResult<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }

        let cwd = std::env::current_dir()
            .map_err(|_| ConfigError::config("Cannot determine current working directory"))?;
        Ok(cwd.join(DEFAULT_CONFIG_DIR))
    }

    /// Validate all configuration.
    /// Call after load() to catch all errors at startup.
    pub fn validate(&self) -> ConfigErrorResult<()> {
        self.supervisor.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Absolute path of the log directory.
    pub fn log_dir(&self) -> ConfigErrorResult<PathBuf> {
        Ok(Self::config_dir()?.join(&self.logging.dir))
    }

    /// Log configuration summary.
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!(
            "  supervisor: grace={}ms, stop_timeout={}ms, probe_timeout={}ms",
            self.supervisor.grace_period_ms,
            self.supervisor.stop_timeout_ms,
            self.supervisor.probe_timeout_ms
        );
        info!(
            "  output: drain_settle={}ms, tail={} lines",
            self.supervisor.drain_settle_ms, self.supervisor.output_tail_lines
        );
        info!(
            "  logging: {} -> {} (colored: {})",
            self.logging.level, self.logging.dir, self.logging.colored
        );
    }

    fn apply_env_overrides(&mut self) {
        // Supervisor
        Self::apply_env_parse("MCPS_GRACE_PERIOD_MS", &mut self.supervisor.grace_period_ms);
        Self::apply_env_parse("MCPS_STOP_TIMEOUT_MS", &mut self.supervisor.stop_timeout_ms);
        Self::apply_env_parse("MCPS_PROBE_TIMEOUT_MS", &mut self.supervisor.probe_timeout_ms);
        Self::apply_env_parse("MCPS_DRAIN_SETTLE_MS", &mut self.supervisor.drain_settle_ms);
        Self::apply_env_parse(
            "MCPS_OUTPUT_TAIL_LINES",
            &mut self.supervisor.output_tail_lines,
        );

        // Logging
        Self::apply_env_parse("MCPS_LOG_LEVEL", &mut self.logging.level);
        Self::apply_env_string("MCPS_LOG_DIR", &mut self.logging.dir);
        Self::apply_env_bool("MCPS_LOG_COLORED", &mut self.logging.colored);
    }

    /// Helper: Apply environment variable override for String values
    fn apply_env_string(var_name: &str, target: &mut String) {
        if let Ok(val) = std::env::var(var_name) {
            *target = val;
        }
    }

    /// Helper: Apply environment variable override for bool values (accepts "true"/"1")
    fn apply_env_bool(var_name: &str, target: &mut bool) {
        if let Ok(val) = std::env::var(var_name) {
            *target = val == "true" || val == "1";
        }
    }

    /// Helper: Apply environment variable override for parseable values
    fn apply_env_parse<T: std::str::FromStr>(var_name: &str, target: &mut T) {
        if let Ok(val) = std::env::var(var_name)
            && let Ok(parsed) = val.parse()
        {
            *target = parsed;
        }
    }
}
