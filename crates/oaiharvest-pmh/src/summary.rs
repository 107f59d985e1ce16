//! Run and pass summaries.
//!
//! Every target appears exactly once in [`RunSummary::outcomes`], carrying the
//! outcome of the last pass that dispatched it.

use std::path::Path;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use oaiharvest_core::{fmt_num, write_atomic};
use serde::Serialize;

use crate::model::{HarvestOutcome, HarvestStatus, serialize_secs};

/// File name of the JSON summary inside the output directory
pub const SUMMARY_FILE: &str = "harvest_summary.json";

/// Counts for one pass over the worklist
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub pass: u32,
    pub dispatched: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub retryable: usize,
    pub permanent: usize,
    /// Targets that go on to the next pass (empty + retryable)
    pub requeued: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl PassSummary {
    pub fn from_outcomes(pass: u32, outcomes: &[HarvestOutcome], elapsed: Duration) -> Self {
        let mut summary = Self {
            pass,
            dispatched: outcomes.len(),
            elapsed,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.status {
                HarvestStatus::Success => summary.succeeded += 1,
                HarvestStatus::Empty => summary.empty += 1,
                HarvestStatus::Retryable => summary.retryable += 1,
                HarvestStatus::Permanent => summary.permanent += 1,
            }
        }
        summary.requeued = summary.empty + summary.retryable;
        summary
    }

    pub fn log(&self) {
        log::info!(
            "Pass {}: {} dispatched, {} succeeded, {} empty, {} retryable, {} permanent [{:.1}s]",
            self.pass,
            self.dispatched,
            self.succeeded,
            self.empty,
            self.retryable,
            self.permanent,
            self.elapsed.as_secs_f64()
        );
    }
}

/// Final result of a harvest run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<HarvestOutcome>,
    pub passes: Vec<PassSummary>,
    pub total_seen: u64,
    pub total_deleted: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// The run was cancelled before every pass finished
    pub cancelled: bool,
}

impl RunSummary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        outcomes: Vec<HarvestOutcome>,
        passes: Vec<PassSummary>,
        elapsed: Duration,
        cancelled: bool,
    ) -> Self {
        let total_seen = outcomes.iter().map(|o| o.records_seen).sum();
        let total_deleted = outcomes.iter().map(|o| o.records_deleted).sum();
        Self {
            outcomes,
            passes,
            total_seen,
            total_deleted,
            elapsed,
            cancelled,
        }
    }

    pub fn count(&self, status: HarvestStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Targets still `Empty` or `Retryable` after the final pass
    pub fn unresolved(&self) -> Vec<&HarvestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_requeueable())
            .collect()
    }

    pub fn permanent(&self) -> Vec<&HarvestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == HarvestStatus::Permanent)
            .collect()
    }

    /// Every target succeeded
    pub fn is_clean(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == HarvestStatus::Success)
    }

    /// Write the summary as pretty JSON to `<output_dir>/harvest_summary.json`.
    pub fn write_json(&self, output_dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        write_atomic(&output_dir.join(SUMMARY_FILE), &json)?;
        Ok(())
    }

    pub fn log(&self) {
        log::info!("=== Harvest Summary ===");
        log::info!(
            "Targets: {} ({} success, {} empty, {} retryable, {} permanent)",
            self.outcomes.len(),
            self.count(HarvestStatus::Success),
            self.count(HarvestStatus::Empty),
            self.count(HarvestStatus::Retryable),
            self.count(HarvestStatus::Permanent)
        );
        log::info!(
            "Records: {} ({} deleted)",
            fmt_num(self.total_seen),
            fmt_num(self.total_deleted)
        );
        log::info!(
            "Time: {:.1}s over {} passes",
            self.elapsed.as_secs_f64(),
            self.passes.len()
        );
        for outcome in self.permanent() {
            log::warn!(
                "Permanent: {} ({})",
                outcome.target,
                outcome.error_detail.as_deref().unwrap_or("-")
            );
        }
        for outcome in self.unresolved() {
            log::warn!(
                "Unresolved: {} ({})",
                outcome.target,
                outcome.error_detail.as_deref().unwrap_or("-")
            );
        }
        if self.cancelled {
            log::warn!("Run was cancelled");
        }
    }

    /// Format per-pass counts and totals as a table.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Harvest")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Dispatched").fg(Color::Cyan),
                Cell::new("Success").fg(Color::Cyan),
                Cell::new("Empty").fg(Color::Cyan),
                Cell::new("Retryable").fg(Color::Cyan),
                Cell::new("Permanent").fg(Color::Cyan),
                Cell::new("Time").fg(Color::Cyan),
            ]);

        for pass in &self.passes {
            table.add_row(vec![
                Cell::new(format!("Pass {}", pass.pass)),
                Cell::new(pass.dispatched),
                Cell::new(pass.succeeded),
                Cell::new(pass.empty),
                Cell::new(pass.retryable),
                Cell::new(pass.permanent),
                Cell::new(format!("{:.1}s", pass.elapsed.as_secs_f64())),
            ]);
        }

        table.add_row(vec![
            Cell::new("Final").fg(Color::Green),
            Cell::new(self.outcomes.len()).fg(Color::Green),
            Cell::new(self.count(HarvestStatus::Success)).fg(Color::Green),
            Cell::new(self.count(HarvestStatus::Empty)),
            Cell::new(self.count(HarvestStatus::Retryable)),
            Cell::new(self.count(HarvestStatus::Permanent)),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())).fg(Color::Green),
        ]);

        format!(
            "\n{table}\nRecords: {} ({} deleted)",
            fmt_num(self.total_seen),
            fmt_num(self.total_deleted)
        )
    }

    /// Format every target that did not end in success.
    pub fn format_failures(&self) -> Option<String> {
        let failed: Vec<_> = self
            .outcomes
            .iter()
            .filter(|o| o.status != HarvestStatus::Success)
            .collect();
        if failed.is_empty() {
            return None;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Target").fg(Color::Cyan),
                Cell::new("Status").fg(Color::Cyan),
                Cell::new("Pass").fg(Color::Cyan),
                Cell::new("Detail").fg(Color::Cyan),
            ]);
        for outcome in failed {
            let color = match outcome.status {
                HarvestStatus::Permanent => Color::Red,
                _ => Color::Yellow,
            };
            table.add_row(vec![
                Cell::new(&outcome.target),
                Cell::new(outcome.status).fg(color),
                Cell::new(outcome.pass),
                Cell::new(outcome.error_detail.as_deref().unwrap_or("")),
            ]);
        }
        Some(format!("\n{table}"))
    }
}
