mod config;
mod error;
mod log_level;
mod logging_config;
mod supervisor_config;

pub use config::Config;
pub use error::{ConfigError, ConfigErrorResult};
pub use log_level::LogLevel;
pub use logging_config::LoggingConfig;
pub use supervisor_config::SupervisorConfig;

#[cfg(test)]
mod tests;

const CONFIG_DIR_ENV: &str = "MCPS_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = ".mcps";
const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_LOG_LEVEL_STRING: &str = "info";
const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
const DEFAULT_LOG_DIRECTORY: &str = "logs";
const DEFAULT_LOG_FILE_PREFIX: &str = "mcp-supervisor";
