//! Harvest subcommand - run a catalog through the coordinator

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use oaiharvest_core::{CancelToken, ProgressContext, fmt_num};
use oaiharvest_pmh::{HarvestTarget, parse_catalog};

use crate::EXIT_INTERRUPTED;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Catalog file: name, URL, set, metadataPrefix (tab-separated)
    pub catalog: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum simultaneously open sessions
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Total passes over the catalog (1 disables the requeue pass)
    #[arg(long)]
    pub passes: Option<u32>,

    /// Seconds to wait before the first requeue pass
    #[arg(long)]
    pub requeue_pause: Option<u64>,

    /// Seconds allowed for each requeue pass
    #[arg(long)]
    pub requeue_timeout: Option<u64>,

    /// Metadata format for catalog lines that name none
    #[arg(short, long)]
    pub metadata_prefix: Option<String>,

    /// Only harvest targets whose name contains this text (case-insensitive)
    #[arg(long)]
    pub only: Option<String>,

    /// Maximum number of targets to harvest
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Do not write harvest_summary.json
    #[arg(long)]
    pub no_summary: bool,
}

impl HarvestArgs {
    fn to_config(&self, config: &Config, request_timeout: Duration) -> oaiharvest_pmh::Config {
        let concurrency = self
            .concurrency
            .unwrap_or(config.workers.concurrency)
            .clamp(1, config.workers.max.max(1));
        oaiharvest_pmh::Config {
            output_dir: self.output.clone().unwrap_or_else(|| config.output.dir.clone()),
            concurrency,
            max_passes: self.passes.unwrap_or(config.harvest.max_passes).max(1),
            requeue_pause: Duration::from_secs(
                self.requeue_pause.unwrap_or(config.harvest.requeue_pause),
            ),
            requeue_timeout: self
                .requeue_timeout
                .or(config.harvest.requeue_timeout)
                .map(Duration::from_secs),
            request_timeout,
            default_metadata_prefix: self
                .metadata_prefix
                .clone()
                .unwrap_or_else(|| config.harvest.metadata_prefix.clone()),
            write_summary: config.output.summary && !self.no_summary,
        }
    }

    fn select(&self, targets: Vec<HarvestTarget>) -> Vec<HarvestTarget> {
        let needle = self.only.as_deref().map(str::to_lowercase);
        targets
            .into_iter()
            .filter(|t| {
                needle
                    .as_deref()
                    .map_or(true, |n| t.display_name.to_lowercase().contains(n))
            })
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

pub fn run(
    args: HarvestArgs,
    config: &Config,
    progress: &ProgressContext,
    cancel: &CancelToken,
    request_timeout: Duration,
) -> Result<ExitCode> {
    let harvest_config = args.to_config(config, request_timeout);
    let catalog = parse_catalog(&args.catalog, &harvest_config.default_metadata_prefix)?;
    let targets = args.select(catalog.targets);
    if targets.is_empty() {
        anyhow::bail!("No targets to harvest in {}", args.catalog.display());
    }

    log::info!("Harvesting {} targets", targets.len());
    log::info!("  Output: {}", harvest_config.output_dir.display());
    log::info!(
        "  Concurrency: {}, passes: {}",
        harvest_config.concurrency,
        harvest_config.max_passes
    );

    let summary = oaiharvest_pmh::run(&harvest_config, targets, cancel, progress)?;

    eprintln!("\n{}", summary.format_table());
    if let Some(failures) = summary.format_failures() {
        eprintln!("\n{failures}");
    }
    eprintln!(
        "\n{} records ({} deleted) from {} targets in {:.1}s",
        fmt_num(summary.total_seen),
        fmt_num(summary.total_deleted),
        summary.outcomes.len(),
        summary.elapsed.as_secs_f64()
    );
    if !catalog.rejected.is_empty() {
        eprintln!(
            "{} catalog lines were skipped (see log)",
            catalog.rejected.len()
        );
    }

    if summary.cancelled {
        log::warn!("Harvest interrupted");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    let permanent = summary.permanent().len();
    let unresolved = summary.unresolved().len();
    if permanent + unresolved > 0 {
        anyhow::bail!("{permanent} targets failed permanently, {unresolved} unresolved");
    }
    Ok(ExitCode::SUCCESS)
}
