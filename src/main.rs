use clap::Parser;
use gate_sink::app::{App, Config, setup_logging_safe};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = App::resolve_config(Config::parse())?;
    setup_logging_safe(config.log_level, config.log_format)?;

    let app = App::from_config(config)?;
    if let Err(e) = app.run().await {
        error!("Application error: {}", e);
        process::exit(1);
    }

    // Stdin is read on a blocking thread that would otherwise keep the
    // runtime alive until the next line arrives.
    process::exit(0);
}
