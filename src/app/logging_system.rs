use super::config::{LogFormat, LogLevel};
use parking_lot::RwLock;
use std::sync::Once;
use thiserror::Error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },
    #[error("Failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Collects filter directives and installs the global tracing subscriber.
pub struct LoggingSystem {
    directives: RwLock<Vec<Directive>>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: RwLock::new(Vec::new()),
        }
    }

    pub fn add_directive(&self, directive: &str) -> Result<(), LoggingError> {
        let parsed = directive
            .parse::<Directive>()
            .map_err(|e| LoggingError::InvalidDirective {
                directive: directive.to_string(),
                reason: e.to_string(),
            })?;
        self.directives.write().push(parsed);
        Ok(())
    }

    /// Quiets the HTTP stack below `warn`.
    pub fn add_default_directives(&self) -> Result<(), LoggingError> {
        for directive in ["hyper=warn", "reqwest=warn", "h2=warn"] {
            self.add_directive(directive)?;
        }
        Ok(())
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        filter_parts.push(default_level.as_str().to_string());
        filter_parts.extend(directives.iter().map(ToString::to_string));
        filter_parts.join(",")
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }

    pub fn initialize_tracing(
        &self,
        default_level: LogLevel,
        format: LogFormat,
    ) -> Result<(), LoggingError> {
        let filter_string = self.build_filter_string(default_level);
        let env_filter = EnvFilter::try_new(&filter_string).map_err(|e| {
            LoggingError::InitFailed(format!("bad filter '{filter_string}': {e}"))
        })?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Compact => registry
                .with(fmt::layer().with_target(true).with_thread_ids(true).compact())
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
        };

        result.map_err(|e| LoggingError::InitFailed(e.to_string()))
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs logging once per process; later calls report whether the first
/// one succeeded.
pub fn setup_logging_safe(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    static INIT: Once = Once::new();
    static INIT_ERROR: RwLock<Option<String>> = RwLock::new(None);

    INIT.call_once(|| {
        let logging_system = LoggingSystem::new();
        let result = logging_system
            .add_default_directives()
            .and_then(|()| logging_system.initialize_tracing(level, format));

        if let Err(e) = result {
            *INIT_ERROR.write() = Some(e.to_string());
        }
    });

    match INIT_ERROR.read().as_ref() {
        Some(error) => Err(LoggingError::InitFailed(error.clone())),
        None => Ok(()),
    }
}
