pub mod config;
pub mod logging_system;
pub mod shutdown;
pub mod source;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging_system::{LoggingError, LoggingSystem, setup_logging_safe};
pub use source::{SourceSummary, forward_lines};

use crate::sink::{GateSink, SinkError};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Command line tool: forwards stdin lines to one gate stream.
pub struct App {
    config: Config,
    sink: GateSink,
}

impl App {
    pub fn from_config(config: Config) -> Result<Self, SinkError> {
        let sink = GateSink::new(config.sink_settings())?;
        Ok(Self { config, sink })
    }

    /// Loads the file named by `config_file`, if any, in place of `config`.
    pub fn resolve_config(config: Config) -> Result<Config, ConfigError> {
        match &config.config_file {
            Some(path) => Config::from_file(path),
            None => {
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn sink(&self) -> &GateSink {
        &self.sink
    }

    pub async fn run(self) -> anyhow::Result<SourceSummary> {
        info!(
            gate = %self.config.gate_url,
            stream = %self.config.stream,
            "Starting gate-sink v{}",
            env!("CARGO_PKG_VERSION")
        );

        let cancel = CancellationToken::new();
        shutdown::spawn_signal_handler(cancel.clone());

        let stdin = BufReader::new(tokio::io::stdin());
        let summary = forward_lines(stdin, &self.sink, &self.config.stream, &cancel).await?;
        cancel.cancel();

        self.sink.shutdown().await;

        let counters = self.sink.statistics();
        info!(
            lines = summary.lines,
            dropped = summary.dropped,
            sent = counters.sent_records,
            lost = counters.lost_records,
            stored = counters.stored_records,
            "gate-sink stopped"
        );
        println!("{}", serde_json::to_string_pretty(&counters)?);

        Ok(summary)
    }
}
