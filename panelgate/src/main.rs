mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "panelgate";

#[derive(Parser)]
#[command(name = "panelgate", version, about = "Browser gateway for a game-server panel API")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the gateway
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate a config file, then exit
    ValidateConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up logging: {0}")]
    Logging(String),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Server(#[from] relay::RelayServerError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: CliCommand) -> Result<(), CliError> {
    let port = std::env::var("PORT").ok();

    match command {
        CliCommand::ValidateConfig { config } => {
            Config::load(Some(&config), port.as_deref())?;
            println!("{} is valid", config.display());
            Ok(())
        }
        CliCommand::Run { config } => {
            let config = Config::load(config.as_deref(), port.as_deref())?;

            // Kept alive until the server exits so buffered events get flushed.
            let _sentry = init_logging(config.common.logging.as_ref())?;
            if let Some(metrics) = &config.common.metrics {
                init_metrics(metrics)?;
            }

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(relay::run(config.gateway))?;

            tracing::info!("stopped");
            Ok(())
        }
    }
}

fn init_logging(
    logging: Option<&LoggingConfig>,
) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let guard = match logging {
        Some(logging) => {
            let dsn: sentry::types::Dsn = logging
                .sentry_dsn
                .parse()
                .map_err(|e| CliError::Logging(format!("invalid sentry_dsn: {e}")))?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    Ok(guard)
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "reporting metrics to statsd"
    );
    Ok(())
}
