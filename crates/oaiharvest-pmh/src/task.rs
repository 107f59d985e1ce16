//! Harvest task: one target through Identify, ListRecords and the sink

use std::time::Instant;

use indicatif::ProgressBar;
use oaiharvest_core::progress::upgrade_to_bar;
use oaiharvest_core::{CancelToken, Fault};

use crate::key::StorageKey;
use crate::metadata::{Completeness, MetadataDocument};
use crate::model::{HarvestOutcome, HarvestStatus, HarvestTarget, RepositoryDescriptor};
use crate::session::{Completion, ProtocolSession};
use crate::sink::{RecordSink, SinkHandle};
use crate::transport::Transport;

/// Everything a task needs besides its target
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub transport: &'a dyn Transport,
    pub sink: &'a RecordSink,
    pub cancel: &'a CancelToken,
    /// 1-based pass number, recorded in the outcome
    pub pass: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    seen: u64,
    deleted: u64,
    pages: u64,
}

/// Harvest one target. Never fails: every fault ends up in the outcome.
pub fn harvest_target(
    target: &HarvestTarget,
    ctx: TaskContext<'_>,
    pb: ProgressBar,
) -> HarvestOutcome {
    let start = Instant::now();
    log::info!(
        "Opening session for {target} ({}, {})",
        target.endpoint_url,
        target.metadata_prefix
    );

    let session = ProtocolSession::new(ctx.transport, target, ctx.cancel.clone());
    let (status, tally, fault) = run(&session, ctx.sink, &pb);
    pb.finish_and_clear();

    let outcome = HarvestOutcome {
        target: target.clone(),
        status,
        records_seen: tally.seen,
        records_deleted: tally.deleted,
        pages_fetched: tally.pages,
        pass: ctx.pass,
        elapsed: start.elapsed(),
        error_detail: match (&status, &fault) {
            (HarvestStatus::Success, _) => None,
            (HarvestStatus::Empty, _) => Some("noRecordsMatch".to_string()),
            (_, Some(fault)) => Some(fault.to_string()),
            (_, None) => Some("unknown failure".to_string()),
        },
        fault_kind: fault.as_ref().map(Fault::kind),
    };
    log_outcome(&outcome, fault.as_ref());
    outcome
}

fn run(
    session: &ProtocolSession<'_>,
    sink: &RecordSink,
    pb: &ProgressBar,
) -> (HarvestStatus, Tally, Option<Fault>) {
    let target = session.target();
    let mut tally = Tally::default();

    let descriptor = match session.identify() {
        Ok(descriptor) => descriptor,
        Err(fault) => return (status_for(&fault), tally, Some(fault)),
    };
    log::info!(
        "{target}: identified '{}' (protocol {}, granularity {}, deletedRecord {})",
        descriptor.repository_name,
        descriptor.protocol_version,
        descriptor.granularity,
        descriptor.deleted_record_policy.as_str()
    );

    let key = StorageKey::for_target(target);
    let mut handle = match sink.ensure_storage(&key) {
        Ok(handle) => handle,
        Err(fault) => return (HarvestStatus::Permanent, tally, Some(fault)),
    };

    let mut stream = session.list_records();
    let mut fault = None;
    while let Some(item) = stream.next() {
        let record = match item {
            Ok(record) => record,
            Err(f) => {
                fault = Some(f);
                break;
            }
        };
        tally.seen += 1;
        if record.is_deleted {
            tally.deleted += 1;
        }
        if let Err(f) = handle.append_record(&record) {
            fault = Some(f);
            break;
        }
        if let Some(total) = stream.complete_list_size() {
            upgrade_to_bar(pb, total);
        }
        pb.inc(1);
    }
    tally.pages = stream.pages_fetched();
    let completion = stream.completion();

    match (fault, completion) {
        (None, Some(Completion::NoRecords)) => {
            // Keep whatever an earlier run harvested for this key
            handle.discard();
            (HarvestStatus::Empty, tally, None)
        }
        (Some(fault @ Fault::Storage(_)), _) => {
            handle.discard();
            (HarvestStatus::Permanent, tally, Some(fault))
        }
        (Some(fault), _) if handle.records_appended() == 0 => {
            handle.discard();
            (status_for(&fault), tally, Some(fault))
        }
        (Some(fault), _) => {
            let status = status_for(&fault);
            match persist(handle, &descriptor, target, tally, Completeness::Partial) {
                Ok(()) => (status, tally, Some(fault)),
                Err(storage) => {
                    log::warn!("{target}: could not persist partial harvest after '{fault}'");
                    (HarvestStatus::Permanent, tally, Some(storage))
                }
            }
        }
        (None, _) => match persist(handle, &descriptor, target, tally, Completeness::Complete) {
            Ok(()) => (HarvestStatus::Success, tally, None),
            Err(storage) => (HarvestStatus::Permanent, tally, Some(storage)),
        },
    }
}

fn persist(
    mut handle: SinkHandle,
    descriptor: &RepositoryDescriptor,
    target: &HarvestTarget,
    tally: Tally,
    completeness: Completeness,
) -> Result<(), Fault> {
    let document = MetadataDocument::new(descriptor, target, tally.seen, tally.deleted, completeness);
    handle.write_metadata(&document)?;
    handle.finalize()?;
    Ok(())
}

/// Transport faults and cancellation get another pass; everything else is final.
fn status_for(fault: &Fault) -> HarvestStatus {
    if fault.is_retryable() {
        HarvestStatus::Retryable
    } else {
        HarvestStatus::Permanent
    }
}

fn log_outcome(outcome: &HarvestOutcome, fault: Option<&Fault>) {
    let target = &outcome.target;
    let counts = format!(
        "{} records ({} deleted), {} pages in {:.1}s",
        outcome.records_seen,
        outcome.records_deleted,
        outcome.pages_fetched,
        outcome.elapsed.as_secs_f64()
    );
    match (outcome.status, fault) {
        (HarvestStatus::Success, _) => log::info!("{target}: success, {counts}"),
        (HarvestStatus::Empty, _) => log::warn!("{target}: no records match"),
        (_, Some(fault)) if matches!(fault, Fault::Unknown(_)) => {
            log::error!("{target}: {} after {counts}: {fault:?}", outcome.status)
        }
        (status, Some(fault)) => log::warn!("{target}: {status} ({fault}) after {counts}"),
        (status, None) => log::warn!("{target}: {status} after {counts}"),
    }
}
