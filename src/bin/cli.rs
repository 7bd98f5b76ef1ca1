//! Injury Report CLI
//!
//! Runs the polling service with its HTTP API, or one-off fetch and parse
//! commands for inspecting a report.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use injury_report::{
    api,
    error::{AppError, Result},
    models::{Config, InjuryRecord},
    pipeline::{InjuryService, schedule},
    services::{FetchOutcome, PdfFetcher, ReportParser},
    utils::time::report_url,
};

/// NBA injury report watcher
#[derive(Parser, Debug)]
#[command(
    name = "injury-report",
    version,
    about = "Polls the NBA injury report and streams status changes"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "storage/config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the current report, then poll and serve the HTTP API
    Serve,

    /// Fetch and parse one report, printing the records as JSON
    Fetch {
        /// Report URL (default: the current slot's URL)
        #[arg(long)]
        url: Option<String>,
    },

    /// Parse a local report PDF, printing the records as JSON
    Parse {
        /// Path to the PDF file
        file: PathBuf,
    },

    /// Print the report URL for the current slot
    Url,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_records(records: &[InjuryRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    init_logging(cli.verbose, &config.logging.level);

    match loaded {
        Ok(_) => log::info!("Loaded configuration from {}", cli.config.display()),
        Err(e) => log::warn!(
            "Using default configuration, could not load {}: {}",
            cli.config.display(),
            e
        ),
    }

    match cli.command {
        Command::Serve => {
            config.validate()?;

            let service = Arc::new(InjuryService::from_config(&config)?);
            let outcome = service.initialize().await?;
            log::info!("Initial load finished at stage '{}'", outcome.stage());

            let scheduler = tokio::spawn(schedule::run(
                Arc::clone(&service),
                config.schedule.clone(),
            ));

            api::serve(service, &config.server).await?;
            scheduler.abort();
        }

        Command::Fetch { url } => {
            let tz = config.schedule.tz()?;
            let url = url.unwrap_or_else(|| {
                report_url(
                    &config.fetcher.url_template,
                    Utc::now(),
                    tz,
                    config.schedule.interval_minutes,
                )
            });
            log::info!("Fetching {}", url);

            let fetcher = PdfFetcher::from_config(&config.fetcher)?;
            match fetcher.fetch(&url).await {
                FetchOutcome::Document(bytes) => {
                    let records = ReportParser::new(config.layout.clone(), tz).parse(&bytes);
                    log::info!("Parsed {} record(s)", records.len());
                    print_records(&records)?;
                }
                FetchOutcome::NotPublished => {
                    log::warn!("Report not published yet");
                }
                FetchOutcome::Unavailable { attempts } => {
                    return Err(AppError::fetch(
                        url,
                        format!("unavailable after {attempts} attempt(s)"),
                    ));
                }
            }
        }

        Command::Parse { file } => {
            let bytes = std::fs::read(&file)?;
            let parser = ReportParser::new(config.layout.clone(), config.schedule.tz()?);
            let records = parser.parse(&bytes);
            log::info!("Parsed {} record(s) from {}", records.len(), file.display());
            print_records(&records)?;
        }

        Command::Url => {
            println!(
                "{}",
                report_url(
                    &config.fetcher.url_template,
                    Utc::now(),
                    config.schedule.tz()?,
                    config.schedule.interval_minutes,
                )
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
