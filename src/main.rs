//! Control plane server entry point.
//!
//! A thin `#[tokio::main]` wrapper around [`pathwarden::startup::run`]: parse
//! the command line, load configuration, and run until ctrl-c.

use clap::Parser;
use pathwarden::errors::Result;
use pathwarden::startup::{load_config, run};
use pathwarden::{APP_NAME, VERSION};
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about = "Envoy xDS control plane core")]
struct Cli {
    /// Path to a YAML configuration file. Falls back to environment
    /// variables and built-in defaults when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    if let Err(e) = run(config, shutdown).await {
        error!(error = %e, "control plane exited with an error");
        std::process::exit(1);
    }

    Ok(())
}
