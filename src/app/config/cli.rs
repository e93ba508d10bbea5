use super::serde_helpers::{load_env_path_opt, load_env_string, load_env_var};
use super::{ConfigError, LogFormat, LogLevel};
use crate::sink::SinkSettings;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Gate base URL
    #[arg(long, env = "GATE_URL", default_value = "http://localhost:6306")]
    pub gate_url: String,

    /// API key sent with every request
    #[arg(long, env = "GATE_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Stream that lines read from stdin are written to
    #[arg(long, env = "GATE_STREAM", default_value = "events")]
    pub stream: String,

    /// Initial size of a buffer in bytes
    #[arg(long, env = "INITIAL_BUFFER_SIZE", default_value = "4096")]
    pub initial_buffer_size: usize,

    /// Maximum size a single buffer may grow to in bytes
    #[arg(long, env = "MAX_BUFFER_SIZE", default_value = "16777216")]
    pub max_buffer_size: usize,

    /// Maximum framed size of a record in bytes
    #[arg(long, env = "MAX_RECORD_SIZE", default_value = "1048576")]
    pub max_record_size: usize,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_REQUEST_SIZE", default_value = "4194304")]
    pub max_request_size: usize,

    /// Memory budget shared by all buffers in bytes
    #[arg(long, env = "MAX_MEMORY", default_value = "134217728")]
    pub max_memory: usize,

    /// Base send period in milliseconds
    #[arg(long, env = "SEND_PERIOD_MS", default_value = "2000")]
    pub send_period_ms: u64,

    /// Upper bound of the backoff delay in milliseconds
    #[arg(long, env = "SEND_PERIOD_CAP_MS", default_value = "300000")]
    pub send_period_cap_ms: u64,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let sink = SinkSettings::default();
        Self {
            gate_url: sink.gate_url,
            api_key: sink.api_key,
            stream: "events".to_string(),
            initial_buffer_size: sink.initial_buffer_size,
            max_buffer_size: sink.max_buffer_size,
            max_record_size: sink.max_record_size,
            max_request_size: sink.max_request_size,
            max_memory: sink.max_memory,
            send_period_ms: sink.send_period.as_millis() as u64,
            send_period_cap_ms: sink.send_period_cap.as_millis() as u64,
            request_timeout_ms: sink.request_timeout.as_millis() as u64,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_string("GATE_URL", &mut config.gate_url);
        load_env_string("GATE_API_KEY", &mut config.api_key);
        load_env_string("GATE_STREAM", &mut config.stream);
        load_env_var("INITIAL_BUFFER_SIZE", &mut config.initial_buffer_size)?;
        load_env_var("MAX_BUFFER_SIZE", &mut config.max_buffer_size)?;
        load_env_var("MAX_RECORD_SIZE", &mut config.max_record_size)?;
        load_env_var("MAX_REQUEST_SIZE", &mut config.max_request_size)?;
        load_env_var("MAX_MEMORY", &mut config.max_memory)?;
        load_env_var("SEND_PERIOD_MS", &mut config.send_period_ms)?;
        load_env_var("SEND_PERIOD_CAP_MS", &mut config.send_period_cap_ms)?;
        load_env_var("REQUEST_TIMEOUT_MS", &mut config.request_timeout_ms)?;
        load_env_var("LOG_LEVEL", &mut config.log_level)?;
        load_env_var("LOG_FORMAT", &mut config.log_format)?;
        load_env_path_opt("CONFIG_FILE", &mut config.config_file);

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings handed to the sink.
    pub fn sink_settings(&self) -> SinkSettings {
        SinkSettings {
            gate_url: self.gate_url.clone(),
            api_key: self.api_key.clone(),
            initial_buffer_size: self.initial_buffer_size,
            max_buffer_size: self.max_buffer_size,
            max_record_size: self.max_record_size,
            max_request_size: self.max_request_size,
            max_memory: self.max_memory,
            send_period: Duration::from_millis(self.send_period_ms),
            send_period_cap: Duration::from_millis(self.send_period_cap_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..SinkSettings::default()
        }
    }
}
