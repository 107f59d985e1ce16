//! Harvest run configuration

use std::path::PathBuf;
use std::time::Duration;

/// Metadata format requested when a catalog line names none
pub const DEFAULT_METADATA_PREFIX: &str = "oai_dc";

/// Runtime configuration for a harvest run
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for per-repository output folders
    pub output_dir: PathBuf,
    /// Maximum number of simultaneously open sessions
    pub concurrency: usize,
    /// Total passes over the worklist (1 = no requeue pass)
    pub max_passes: u32,
    /// Base wait before a requeue pass; doubles for every further pass
    pub requeue_pause: Duration,
    /// Wall-clock bound for each requeue pass
    pub requeue_timeout: Option<Duration>,
    /// Per-exchange HTTP timeout
    pub request_timeout: Duration,
    pub default_metadata_prefix: String,
    /// Write `harvest_summary.json` into `output_dir` after the run
    pub write_summary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("files"),
            concurrency: 4,
            max_passes: 2,
            requeue_pause: Duration::from_secs(5),
            requeue_timeout: None,
            request_timeout: Duration::from_secs(120),
            default_metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            write_summary: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("files"));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_passes, 2);
        assert_eq!(config.requeue_pause, Duration::from_secs(5));
        assert!(config.requeue_timeout.is_none());
        assert_eq!(config.default_metadata_prefix, "oai_dc");
    }
}
