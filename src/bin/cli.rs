//! Harvester CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use harvester::{
    error::{AppError, Result},
    models::{Config, SessionKey},
    pipeline,
    storage::{CursorStore, FileCursorStore},
};
use tokio_util::sync::CancellationToken;

/// Harvester - subject timeline and self-thread collector
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Harvest a subject's posts and self-threads with rotating sessions"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "harvest.toml")]
    config: PathBuf,

    /// Dotenv file with credentials and proxy settings
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest the configured subject, resuming from its saved cursor
    Harvest {
        /// Override the configured subject
        #[arg(long)]
        subject: Option<String>,

        /// Stop after this many output units (0 = unlimited)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Validate configuration and credentials
    Validate,

    /// Check that requests leave through the configured proxy
    VerifyProxy,

    /// Inspect or reset saved cursors
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },
}

#[derive(Subcommand, Debug)]
enum CursorAction {
    /// Show saved cursors
    Show {
        /// Only show this subject
        #[arg(long)]
        subject: Option<String>,
    },

    /// Forget the saved cursor of a subject
    Reset {
        #[arg(long)]
        subject: String,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load the TOML config, then overlay the environment.
fn load_config(cli: &Cli) -> Result<Config> {
    match dotenvy::from_path(&cli.env_file) {
        Ok(()) => log::info!("Loaded environment from {}", cli.env_file.display()),
        Err(e) if e.not_found() => {
            log::debug!("No env file at {}", cli.env_file.display())
        }
        Err(e) => log::warn!("Ignoring env file {}: {}", cli.env_file.display(), e),
    }

    let mut config = Config::load_if_present(&cli.config)?;
    config.apply_env();
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Harvest { subject, limit } => {
            if let Some(subject) = subject {
                config.harvest.subject = subject;
            }
            if let Some(limit) = limit {
                config.harvest.max_units = limit;
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, stopping after the current step...");
                    on_signal.cancel();
                }
            });

            let report = pipeline::run_harvest(&config, cancel).await?;

            log::info!(
                "Harvested {} units ({} threads) for {} in {}",
                report.units,
                report.threads,
                report.subject,
                pipeline::harvest::format_duration(report.elapsed)
            );
            log::info!("Output: {}", report.output_location);
            log::info!("Statistics: {}", report.stats_location);

            if !report.stop.is_clean() {
                return Err(AppError::fetch(
                    format!("harvest of {}", report.subject),
                    report.stop,
                ));
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK: subject {}, {} sessions, proxy {}",
                config.harvest.subject,
                config.credentials.len(),
                config
                    .proxy
                    .display_host()
                    .unwrap_or_else(|| "none".to_string())
            );
            for (i, credential) in config.credentials.iter().enumerate() {
                log::info!("  Session {}", SessionKey::new(i, credential));
            }
        }

        Command::VerifyProxy => {
            if config.proxy.url.is_none() {
                return Err(AppError::config("No proxy configured"));
            }
            config.proxy.validate()?;
            pipeline::prepare_client(&config).await?;
            log::info!("✓ Proxy egress verified");
        }

        Command::Cursor { action } => {
            let store = FileCursorStore::new(&config.paths.cursor_file);
            match action {
                CursorAction::Show { subject: Some(subject) } => {
                    let token = store.load(&subject).await?;
                    if token.is_empty() {
                        log::info!("{}: no saved cursor", subject);
                    } else {
                        log::info!("{}: {}", subject, token);
                    }
                }
                CursorAction::Show { subject: None } => {
                    let book = store.load_book().await?;
                    if book.is_empty() {
                        log::info!("No saved cursors in {}", store.path().display());
                    }
                    for (subject, token) in book.iter() {
                        log::info!("{}: {}", subject, token);
                    }
                }
                CursorAction::Reset { subject } => {
                    store.clear(&subject).await?;
                    log::info!("Cursor for {} reset", subject);
                }
            }
        }
    }

    Ok(())
}
