//! oaiharvest - batch harvester for OAI-PMH repositories
//!
//! Reads a catalog of repositories (and optional sets) and mirrors their
//! records into one folder per repository.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oaiharvest_core::{CancelToken, LogOptions, ProgressContext};

mod cmd;
mod config;

use config::Config;

/// Exit status of a run stopped by SIGINT/SIGTERM
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "oaiharvest")]
#[command(about = "Batch harvester for OAI-PMH repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./oaiharvest.toml or ~/.config/oaiharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append the log stream to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest every target listed in a catalog
    Harvest(cmd::harvest::HarvestArgs),
    /// Send Identify to one endpoint and show the answer
    Identify(cmd::identify::IdentifyArgs),
    /// Validate a catalog and list its targets
    Catalog(cmd::catalog::CatalogArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = ProgressContext::new();

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug or --quiet, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    oaiharvest_core::init_logging(
        LogOptions {
            quiet,
            debug: cli.debug,
            file: cli.log_file.as_deref(),
        },
        multi,
    )
    .context("Failed to initialize logging")?;

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Config file defaults, CLI overrides
    let http_config = config.http.to_http_config(cli.request_timeout);
    let request_timeout = http_config.request_timeout;
    oaiharvest_core::set_http_config(http_config);

    match cli.command {
        Command::Harvest(args) => {
            let cancel = CancelToken::new();
            install_signal_handlers(&cancel)?;
            cmd::harvest::run(args, &config, &progress, &cancel, request_timeout)
        }
        Command::Identify(args) => cmd::identify::run(args, request_timeout),
        Command::Catalog(args) => cmd::catalog::run(args, &config),
        Command::Config => {
            cmd::print_config(&config, request_timeout);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// First signal cancels the run gracefully; a second one exits immediately.
fn install_signal_handlers(cancel: &CancelToken) -> Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let flag = cancel.flag().clone();
        // SAFETY: the handler only swaps an atomic and calls the async-signal-safe _exit
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if flag.swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(i32::from(EXIT_INTERRUPTED));
                }
            })
        }
        .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}
