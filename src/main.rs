use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use snowdash_reporter::config::AppConfig;
use snowdash_reporter::pipeline::execute;
use snowdash_reporter::scheduler::RunScheduler;
use snowdash_reporter::utils::init_logging;
use snowdash_reporter::utils::metrics::install_exporter;

#[derive(Parser, Debug)]
#[command(name = "snowdash-reporter", version, about = "Collect store dashboard metrics and post chat reports")]
struct Cli {
    /// Configuration file layered over config/default
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    debug: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Collect every store once
    Run,
    /// Collect on a cron schedule until interrupted
    Schedule {
        /// Six-field cron expression, seconds first
        #[arg(long)]
        cron: Option<String>,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.debug {
        config.browser.headless = false;
    }

    let _guard = init_logging(&config.logging, cli.verbose).context("Failed to initialize logging")?;
    install_exporter(&config.metrics)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!(stores = config.stores.len(), "Starting Snowdash Reporter");
            let report = execute(config).await.inspect_err(|e| error!(error = %e, "Run aborted"))?;
            info!(
                run_id = %report.run_id,
                succeeded = report.summary.succeeded,
                failed = report.summary.failed,
                notifications = report.notifications_sent,
                "Run complete"
            );
        }
        Command::Schedule { cron } => {
            let cron = cron
                .or_else(|| config.schedule.clone())
                .context("No cron expression given and no schedule configured")?;
            let mut scheduler = RunScheduler::new(&cron).await?;
            scheduler.schedule(config).await?;
            scheduler.run_until_shutdown().await?;
            info!("Shutting down...");
        }
        Command::CheckConfig => {
            println!(
                "Configuration OK: {} store(s), session strategy {:?}",
                config.stores.len(),
                config.retry.session_strategy
            );
        }
    }

    Ok(())
}
