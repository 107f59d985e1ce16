//! Harvest coordinator: bounded worker pool over the worklist, plus requeue passes

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use oaiharvest_core::{
    CancelToken, ProgressContext, WorkQueue, backoff_duration, cleanup_tmp_files, pause,
};

use crate::config::Config;
use crate::key::StorageKey;
use crate::model::{HarvestOutcome, HarvestStatus, HarvestTarget};
use crate::sink::RecordSink;
use crate::summary::{PassSummary, RunSummary};
use crate::task::{TaskContext, harvest_target};
use crate::transport::Transport;

/// Runs every target through one or more passes.
pub struct Coordinator<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
    progress: &'a ProgressContext,
    cancel: CancelToken,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        config: &'a Config,
        transport: &'a dyn Transport,
        progress: &'a ProgressContext,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            transport,
            progress,
            cancel,
        }
    }

    /// Harvest `targets`; each one ends with exactly one outcome in the summary.
    pub fn run(&self, targets: Vec<HarvestTarget>) -> Result<RunSummary> {
        let start = Instant::now();
        let targets = dedupe(targets);
        if targets.is_empty() {
            log::warn!("No targets to harvest");
            return Ok(RunSummary::empty());
        }
        warn_key_collisions(&targets);

        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.config.output_dir.display()
            )
        })?;
        self.cleanup_stale(&targets);

        let workers = self.config.concurrency.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("harvest-{i}"))
            .build()
            .context("Failed to build worker pool")?;
        log::info!(
            "Harvesting {} targets with {} workers (up to {} passes)",
            targets.len(),
            workers,
            self.config.max_passes.max(1)
        );

        let sink = RecordSink::new(&self.config.output_dir);
        let mut latest: Vec<Option<HarvestOutcome>> = vec![None; targets.len()];
        let mut pending: Vec<usize> = (0..targets.len()).collect();
        let mut passes = Vec::new();

        for pass in 1..=self.config.max_passes.max(1) {
            if pending.is_empty() {
                break;
            }

            let pass_cancel = if pass == 1 {
                self.cancel.child()
            } else {
                let wait = requeue_wait(self.config, pass);
                log::info!(
                    "Requeueing {} targets for pass {pass} in {:.1}s",
                    pending.len(),
                    wait.as_secs_f64()
                );
                if !pause(wait, &self.cancel) {
                    break;
                }
                match self.config.requeue_timeout {
                    Some(limit) => self.cancel.child_with_deadline(Instant::now() + limit),
                    None => self.cancel.child(),
                }
            };

            let pass_start = Instant::now();
            let outcomes = self.run_pass(&pool, &sink, &targets, &pending, pass, &pass_cancel);
            let ordered: Vec<HarvestOutcome> = outcomes.iter().map(|(_, o)| o.clone()).collect();
            let summary = PassSummary::from_outcomes(pass, &ordered, pass_start.elapsed());
            summary.log();
            passes.push(summary);

            pending.clear();
            for (idx, outcome) in outcomes {
                let outcome = match latest[idx].take() {
                    Some(previous) => outcome.after(previous),
                    None => outcome,
                };
                if outcome.status.is_requeueable() {
                    pending.push(idx);
                }
                latest[idx] = Some(outcome);
            }
            pending.sort_unstable();

            if self.cancel.is_cancelled() {
                log::warn!("Run cancelled after pass {pass}");
                break;
            }
        }

        let outcomes = latest
            .into_iter()
            .zip(&targets)
            .map(|(outcome, target)| {
                outcome.unwrap_or_else(|| HarvestOutcome::not_attempted(target.clone(), 1))
            })
            .collect();
        let summary = RunSummary::new(
            outcomes,
            passes,
            start.elapsed(),
            self.cancel.is_cancelled(),
        );
        summary.log();
        Ok(summary)
    }

    /// One pass: every index in `pending` is dispatched to exactly one task.
    ///
    /// Targets sharing a storage key land in different waves, and each wave
    /// drains before the next starts.
    fn run_pass(
        &self,
        pool: &rayon::ThreadPool,
        sink: &RecordSink,
        targets: &[HarvestTarget],
        pending: &[usize],
        pass: u32,
        cancel: &CancelToken,
    ) -> Vec<(usize, HarvestOutcome)> {
        let total = pending.len();
        let collected: Mutex<Vec<(usize, HarvestOutcome)>> = Mutex::new(Vec::with_capacity(total));
        let stage = self.progress.stage_line(&format!("pass {pass}"));
        stage.set_length(total as u64);

        for wave in key_waves(targets, pending) {
            let queue = WorkQueue::new(wave);
            let workers = pool.current_num_threads().min(queue.total()).max(1);
            pool.scope(|s| {
                for _ in 0..workers {
                    s.spawn(|_| {
                        while let Some((_, &idx)) = queue.claim() {
                            let target = &targets[idx];
                            let outcome = if cancel.is_cancelled() {
                                HarvestOutcome::not_attempted(target.clone(), pass)
                            } else {
                                let ctx = TaskContext {
                                    transport: self.transport,
                                    sink,
                                    cancel,
                                    pass,
                                };
                                let pb = self.progress.target_bar(&target.display_name);
                                run_guarded(target, ctx, pb)
                            };
                            stage.inc(1);
                            stage.set_message(format!("{}/{total} targets", stage.position()));
                            collected
                                .lock()
                                .expect("worker thread panicked")
                                .push((idx, outcome));
                        }
                    });
                }
            });
        }
        stage.finish_and_clear();

        let mut outcomes = collected.into_inner().expect("worker thread panicked");
        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes
    }

    /// Remove `*.tmp` leftovers of a crashed run before anything is in flight.
    fn cleanup_stale(&self, targets: &[HarvestTarget]) {
        let dirs: HashSet<_> = targets
            .iter()
            .map(|t| StorageKey::for_target(t).dir(&self.config.output_dir))
            .collect();
        for dir in dirs.into_iter().filter(|d| d.is_dir()) {
            match cleanup_tmp_files(&dir) {
                Ok(0) => {}
                Ok(n) => log::info!("Removed {n} stale tmp files from {}", dir.display()),
                Err(e) => log::warn!("Could not clean {}: {e}", dir.display()),
            }
        }
    }
}

/// Run one task, turning a panic into a permanent outcome.
fn run_guarded(target: &HarvestTarget, ctx: TaskContext<'_>, pb: ProgressBar) -> HarvestOutcome {
    let start = Instant::now();
    let guard_pb = pb.clone();
    match catch_unwind(AssertUnwindSafe(|| harvest_target(target, ctx, pb))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            guard_pb.finish_and_clear();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!("{target}: task panicked: {message}");
            HarvestOutcome {
                target: target.clone(),
                status: HarvestStatus::Permanent,
                records_seen: 0,
                records_deleted: 0,
                pages_fetched: 0,
                pass: ctx.pass,
                elapsed: start.elapsed(),
                error_detail: Some(format!("unexpected error: task panicked: {message}")),
                fault_kind: Some("unknown"),
            }
        }
    }
}

/// Drop exact duplicates, keeping first occurrence order.
fn dedupe(targets: Vec<HarvestTarget>) -> Vec<HarvestTarget> {
    let mut seen = HashSet::with_capacity(targets.len());
    targets
        .into_iter()
        .filter(|t| {
            let fresh = seen.insert(t.clone());
            if !fresh {
                log::warn!("Dropping duplicate target {t} ({})", t.endpoint_url);
            }
            fresh
        })
        .collect()
}

/// Split `pending` into waves holding at most one target per storage key.
///
/// The n-th target of a key goes to wave n, so catalog order decides which
/// harvest is written last.
fn key_waves(targets: &[HarvestTarget], pending: &[usize]) -> Vec<Vec<usize>> {
    let mut seen: HashMap<StorageKey, usize> = HashMap::new();
    let mut waves: Vec<Vec<usize>> = Vec::new();
    for &idx in pending {
        let slot = seen.entry(StorageKey::for_target(&targets[idx])).or_insert(0);
        if *slot == waves.len() {
            waves.push(Vec::new());
        }
        waves[*slot].push(idx);
        *slot += 1;
    }
    waves
}

/// Distinct targets writing to the same files overwrite each other.
fn warn_key_collisions(targets: &[HarvestTarget]) {
    let mut by_key: HashMap<StorageKey, &HarvestTarget> = HashMap::new();
    for target in targets {
        let key = StorageKey::for_target(target);
        if let Some(previous) = by_key.get(&key) {
            log::warn!(
                "{target} and {previous} share storage key {key}; \
                 they run one after the other and the later one in catalog order wins"
            );
        } else {
            by_key.insert(key, target);
        }
    }
}

/// Base wait before pass `pass` (pass 2 waits `requeue_pause`, pass 3 twice that, ...)
pub fn requeue_wait(config: &Config, pass: u32) -> Duration {
    if pass <= 1 {
        Duration::ZERO
    } else {
        backoff_duration(config.requeue_pause, pass - 1)
    }
}
