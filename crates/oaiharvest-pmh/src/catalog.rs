//! Target catalog loader
//!
//! One target per line, tab-separated:
//!
//! ```text
//! AUT University Doctoral Theses	http://aut.researchgateway.ac.nz/dspace-oai/request	set=col_10292_4	metadataPrefix=oai_dc
//! Biblioteca Digital	https://bd.example.br/oai/request	None	metadataPrefix=oai_dc
//! ```
//!
//! Blank lines and `#` comments are skipped. The `set=` and
//! `metadataPrefix=` prefixes are optional; `None` (or an empty column) means
//! no set, and a missing prefix column falls back to the configured default.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::escape::{resolve_html5_entity, unescape_with};

use crate::model::HarvestTarget;

/// A catalog line that could not be turned into a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based
    pub line_no: usize,
    pub reason: String,
}

impl fmt::Display for RejectedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_no, self.reason)
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub targets: Vec<HarvestTarget>,
    pub rejected: Vec<RejectedLine>,
}

/// Read and parse a catalog file.
pub fn parse_catalog(path: &Path, default_prefix: &str) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let catalog = parse_catalog_str(&content, default_prefix);
    log::info!(
        "Catalog {}: {} targets ({} lines rejected)",
        path.display(),
        catalog.targets.len(),
        catalog.rejected.len()
    );
    Ok(catalog)
}

/// Parse catalog text. Malformed lines are logged and collected, never fatal.
pub fn parse_catalog_str(content: &str, default_prefix: &str) -> Catalog {
    let mut catalog = Catalog::default();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed, default_prefix) {
            Ok(target) => catalog.targets.push(target),
            Err(reason) => {
                let rejected = RejectedLine {
                    line_no: idx + 1,
                    reason,
                };
                log::warn!("Skipping catalog {rejected}");
                catalog.rejected.push(rejected);
            }
        }
    }
    catalog
}

fn parse_line(line: &str, default_prefix: &str) -> Result<HarvestTarget, String> {
    let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
    if columns.len() < 2 {
        return Err("expected at least name and URL separated by a tab".to_string());
    }
    if columns.len() > 4 {
        return Err(format!("expected at most 4 columns, found {}", columns.len()));
    }

    let display_name = decode_entities(columns[0]).into_owned();
    if display_name.is_empty() {
        return Err("empty repository name".to_string());
    }

    let endpoint_url = columns[1];
    if !(endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://")) {
        return Err(format!("'{endpoint_url}' is not an http(s) URL"));
    }

    let set_spec = columns
        .get(2)
        .map(|c| strip_key(c, "set"))
        .filter(|s| !s.is_empty() && *s != "None")
        .map(String::from);

    let metadata_prefix = columns
        .get(3)
        .map(|c| strip_key(c, "metadataPrefix"))
        .filter(|p| !p.is_empty())
        .unwrap_or(default_prefix);

    Ok(HarvestTarget::new(
        display_name,
        endpoint_url,
        set_spec,
        metadata_prefix,
    ))
}

/// `key=value` → `value`; a bare value passes through.
fn strip_key<'a>(column: &'a str, key: &str) -> &'a str {
    column
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('='))
        .unwrap_or(column)
        .trim()
}

/// Decode HTML entities (`&eacute;`, `&#233;`, `&amp;`). Text with a stray
/// `&` that is not an entity is kept as written.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    match unescape_with(raw, resolve_html5_entity) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::debug!("Keeping '{raw}' undecoded: {e}");
            Cow::Borrowed(raw)
        }
    }
}
