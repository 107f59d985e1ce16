//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per worker (cleared on completion).
//! Non-TTY mode: hidden bars; the log stream is the progress indicator.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Width of the repository name column
const PREFIX_WIDTH: usize = 24;

/// Bounded bar, used once the server reports `completeListSize`
fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<24.dim} {bar:30.green/dim} {pos:>7}/{len:7} {eta:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Spinner with a running record count, shown while the list size is unknown
fn pending_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {prefix:<24.dim} {pos:>7} records {wide_msg:.dim}")
        .expect("invalid template")
}

/// Switch a worker bar from spinner to bounded bar.
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    if pb.length() != Some(total) {
        pb.set_length(total);
        pb.set_style(bar_style());
    }
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Context that never draws (library use, tests).
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Per-target worker bar. Hidden (no-op) off a TTY.
    pub fn target_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::no_length());
        pb.set_style(pending_style());
        pb.set_prefix(truncate(name, PREFIX_WIDTH));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Stage status line (spinner + message) for pass-level status.
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
                .expect("invalid template"),
        );
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate on a char boundary (repository names are rarely ASCII-only).
fn truncate(name: &str, max_chars: usize) -> String {
    match name.char_indices().nth(max_chars) {
        Some((idx, _)) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

/// Format number with thousand separators.
pub fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
