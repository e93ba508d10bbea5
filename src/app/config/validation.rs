use super::{Config, ConfigError};
use url::Url;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.gate_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid gate URL '{}': {}", self.gate_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Gate URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.stream.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Stream name must not be empty".to_string(),
            ));
        }

        self.sink_settings().validate()?;
        Ok(())
    }
}
