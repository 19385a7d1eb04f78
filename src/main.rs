//! agentforge - agent processes, plugins and LLM-generated tools
//!
//! The same binary is the controller and every built-in agent process.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod agents;
mod app;
mod cli;
mod config;
mod error;
mod generator;
mod github;
mod llm;
mod logging;
mod plugins;
mod workshop;

use cli::Args;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug);

    info!("Starting agentforge v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let code = app::run(args.command, config, args.config.as_deref()).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Logs go to stderr so an agent's stdout carries only protocol lines
fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
