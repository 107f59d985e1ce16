//! oaiharvest PMH - OAI-PMH batch harvester
//!
//! Harvests the records of many independent OAI-PMH repositories into a
//! per-repository folder layout.
//!
//! # Features
//!
//! - Identify + paginated ListRecords per target (resumption tokens)
//! - Bounded worker pool; one slow repository never stalls the others
//! - Fault taxonomy deciding retry (requeue pass), abandon, or success
//! - Atomic output: a target's files are fully written or not at all
//!
//! # Example
//!
//! ```ignore
//! use oaiharvest_pmh::{Config, parse_catalog, run};
//!
//! let config = Config::default();
//! let catalog = parse_catalog("world_repositories".as_ref(), &config.default_metadata_prefix)?;
//! let summary = run(&config, catalog.targets, &CancelToken::new(), &ProgressContext::hidden())?;
//! println!("Harvested {} records", summary.total_seen);
//! ```

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod key;
pub mod metadata;
pub mod model;
pub mod parser;
pub mod session;
pub mod sink;
pub mod summary;
pub mod task;
pub mod transport;

use oaiharvest_core::{CancelToken, ProgressContext};

// Re-exports
pub use catalog::{Catalog, parse_catalog, parse_catalog_str};
pub use config::Config;
pub use coordinator::Coordinator;
pub use key::{StorageKey, normalize_key};
pub use model::{HarvestOutcome, HarvestRecord, HarvestStatus, HarvestTarget, RepositoryDescriptor};
pub use session::ProtocolSession;
pub use sink::RecordSink;
pub use summary::{PassSummary, RunSummary};
pub use transport::{HttpTransport, OaiRequest, Transport};

/// Harvest `targets` over HTTP and write the JSON summary if configured.
pub fn run(
    config: &Config,
    targets: Vec<HarvestTarget>,
    cancel: &CancelToken,
    progress: &ProgressContext,
) -> anyhow::Result<RunSummary> {
    let transport = HttpTransport::new(config.request_timeout);
    let summary = Coordinator::new(config, &transport, progress, cancel.clone()).run(targets)?;

    if config.write_summary && !summary.outcomes.is_empty() {
        match summary.write_json(&config.output_dir) {
            Ok(()) => log::info!(
                "Summary written to {}",
                config.output_dir.join(summary::SUMMARY_FILE).display()
            ),
            Err(e) => log::warn!("Could not write run summary: {e}"),
        }
    }
    Ok(summary)
}
