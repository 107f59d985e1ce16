//! Filesystem-safe storage keys derived from repository names and sets

use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::HarvestTarget;

/// Longest key segment, in chars, leaving room for suffixes on 255-byte filesystems
const MAX_SEGMENT_CHARS: usize = 96;

/// Normalize a display name (or set spec) into a single path segment.
///
/// Path separators, reserved and control characters are dropped, whitespace
/// and underscore runs collapse into one `_`, the result is lowercased.
pub fn normalize_key(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.chars() {
        if c.is_whitespace() || c == '_' {
            pending_separator = true;
            continue;
        }
        if is_stripped(c) {
            continue;
        }
        if pending_separator && !out.is_empty() {
            out.push('_');
        }
        pending_separator = false;
        out.extend(c.to_lowercase());
    }

    let mut key: String = out
        .trim_matches(&['_', '.'][..])
        .chars()
        .take(MAX_SEGMENT_CHARS)
        .collect();
    // Truncation may expose a trailing separator again
    while key.ends_with(&['_', '.'][..]) {
        key.pop();
    }
    if key.is_empty() {
        return "unnamed".to_string();
    }
    if is_reserved_windows_name(&key) {
        key.push('_');
    }
    key
}

fn is_stripped(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '/' | '\\'
                | ':'
                | '*'
                | '?'
                | '"'
                | '<'
                | '>'
                | '|'
                | '['
                | ']'
                | ';'
                | ','
                | '&'
                | '%'
                | '='
                | '+'
                | '@'
                | '!'
                | '#'
                | '^'
                | '('
                | ')'
                | '\''
        )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Where one target's output lives: `<root>/<repository>/<repository>[_<set>].xml`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub repository: String,
    pub set: Option<String>,
}

impl StorageKey {
    pub fn new(display_name: &str, set_spec: Option<&str>) -> Self {
        Self {
            repository: normalize_key(display_name),
            set: set_spec.map(normalize_key),
        }
    }

    pub fn for_target(target: &HarvestTarget) -> Self {
        Self::new(&target.display_name, target.set_spec.as_deref())
    }

    pub fn dir_name(&self) -> &str {
        &self.repository
    }

    /// File name without extension, shared by records and metadata
    pub fn stem(&self) -> String {
        match &self.set {
            Some(set) => format!("{}_{set}", self.repository),
            None => self.repository.clone(),
        }
    }

    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    pub fn records_file(&self, root: &Path) -> PathBuf {
        self.dir(root).join(format!("{}.xml", self.stem()))
    }

    pub fn metadata_file(&self, root: &Path) -> PathBuf {
        self.dir(root).join(format!("{}.metadata.xml", self.stem()))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repository, self.stem())
    }
}
