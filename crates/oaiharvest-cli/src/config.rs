//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use oaiharvest_core::HttpConfig;
use serde::Deserialize;

/// Global configuration for oaiharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub workers: WorkersConfig,
    pub http: HttpSection,
    pub harvest: HarvestSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Write `harvest_summary.json` next to the harvested folders
    pub summary: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./files"),
            summary: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Simultaneously open sessions
    pub concurrency: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds, per exchange
    pub request_timeout: u64,
    /// Contact address appended to the User-Agent; `${VAR}` reads the environment
    #[serde(deserialize_with = "deserialize_env_var")]
    pub contact: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            request_timeout: 120,
            contact: std::env::var("OAIHARVEST_CONTACT").ok(),
        }
    }
}

impl HttpSection {
    /// Client settings; `request_timeout` overrides the file value.
    pub fn to_http_config(&self, request_timeout: Option<u64>) -> HttpConfig {
        let defaults = HttpConfig::default();
        let user_agent = match &self.contact {
            Some(contact) => format!("{} (mailto:{contact})", defaults.user_agent),
            None => defaults.user_agent,
        };
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(request_timeout.unwrap_or(self.request_timeout)),
            user_agent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    pub max_passes: u32,
    /// Seconds before the first requeue pass
    pub requeue_pause: u64,
    /// Seconds; bounds each requeue pass
    pub requeue_timeout: Option<u64>,
    pub metadata_prefix: String,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            max_passes: 2,
            requeue_pause: 5,
            requeue_timeout: None,
            metadata_prefix: oaiharvest_pmh::config::DEFAULT_METADATA_PREFIX.to_string(),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./oaiharvest.toml (current directory)
    /// 2. ~/.config/oaiharvest/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("oaiharvest.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "oaiharvest") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
