//! Developer-site console
//!
//! Command-line host for the session and request gateway crates:
//! 1. Loads configuration (API origin, optional account, route access flags)
//! 2. Restores the session from the refresh cookie, once
//! 3. Runs one command against the API through the gateway
//! 4. Maps an unrecoverable session loss to exit code 2
//!
//! Logs and `--metrics` output go to stderr; stdout carries only the
//! command's JSON output.

mod cli;
mod commands;
mod config;

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::commands::{Console, EXIT_SESSION_EXPIRED, ExitListener, exit_code};
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = Arc::new(ExitListener::default());
    match run(&cli, listener.clone()).await {
        Ok(()) if listener.expired() => ExitCode::from(EXIT_SESSION_EXPIRED),
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("command failed: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: &Cli, listener: Arc<ExitListener>) -> Result<()> {
    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = if cli.metrics {
        Some(install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        account = config.account.is_some(),
        routes = config.routes.len(),
        "configuration loaded"
    );

    let console = Console::new(config, listener)?;
    let output = console
        .run(&cli.command)
        .await
        .with_context(|| format!("{:?} failed", cli.command));

    let metrics = prometheus.map(|handle| handle.render());
    emit(
        output.as_ref().ok(),
        metrics.as_deref(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    )?;
    output.map(|_| ())
}

/// Write the command output to `stdout` and the metrics exposition to `stderr`.
fn emit(
    output: Option<&Value>,
    metrics: Option<&str>,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<()> {
    if let Some(output) = output {
        writeln!(stdout, "{}", serde_json::to_string_pretty(output)?)?;
    }
    if let Some(metrics) = metrics {
        write!(stderr, "{metrics}")?;
    }
    Ok(())
}

fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
