//! Single-target harvests against a scripted transport

mod common;

use std::fs;

use common::*;
use indicatif::ProgressBar;
use oaiharvest_core::{CancelToken, Fault};
use oaiharvest_pmh::task::{TaskContext, harvest_target};
use oaiharvest_pmh::{
    HarvestOutcome, HarvestStatus, HarvestTarget, OaiRequest, ProtocolSession, RecordSink,
    StorageKey,
};
use tempfile::TempDir;

const ENDPOINT: &str = "http://repo.example.org/oai";

fn harvest(stub: &StubTransport, sink: &RecordSink, target: &HarvestTarget) -> HarvestOutcome {
    let cancel = CancelToken::new();
    let ctx = TaskContext {
        transport: stub,
        sink,
        cancel: &cancel,
        pass: 1,
    };
    harvest_target(target, ctx, ProgressBar::hidden())
}

fn records_file(dir: &TempDir, target: &HarvestTarget) -> String {
    fs::read_to_string(StorageKey::for_target(target).records_file(dir.path())).unwrap()
}

fn metadata_file(dir: &TempDir, target: &HarvestTarget) -> String {
    fs::read_to_string(StorageKey::for_target(target).metadata_file(dir.path())).unwrap()
}

#[test]
fn paginates_until_token_runs_out() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Paged Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(
        &target,
        "Paged Repo",
        &[records(&["A", "B"]), records(&["C"]), records(&["D"])],
    );

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Success);
    assert_eq!(outcome.records_seen, 4);
    assert_eq!(outcome.pages_fetched, 3);
    assert!(outcome.error_detail.is_none());
    assert_eq!(identifiers_in(&records_file(&dir, &target)), vec!["A", "B", "C", "D"]);
    assert!(metadata_file(&dir, &target).contains("<harvest_status>complete</harvest_status>"));

    // Follow-up pages carry the token only
    let verbs: Vec<_> = stub.requests().into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        verbs,
        vec![
            OaiRequest::Identify,
            first_page(&target),
            resume("t1"),
            resume("t2"),
        ]
    );
}

#[test]
fn sample_repo_end_to_end() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Sample Repo", ENDPOINT, Some("col_10292_4"));
    let stub = StubTransport::new();
    stub.repository(
        &target,
        "Sample Repo",
        &[vec![
            record_xml("oai:repo:1", false),
            record_xml("oai:repo:2", false),
            record_xml("oai:repo:3", true),
        ]],
    );

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Success);
    assert_eq!(outcome.records_seen, 3);
    assert_eq!(outcome.records_deleted, 1);

    let key = StorageKey::for_target(&target);
    assert_eq!(key.dir(dir.path()), dir.path().join("sample_repo"));
    let records = records_file(&dir, &target);
    assert_eq!(records.lines().count(), 3);
    assert!(records.contains(r#"<header status="deleted">"#));

    let metadata = metadata_file(&dir, &target);
    assert!(metadata.contains("<repository_name>Sample Repo</repository_name>"));
    assert!(metadata.contains("<set_spec>col_10292_4</set_spec>"));
    assert!(metadata.contains("<metadata_prefix>oai_dc</metadata_prefix>"));
    assert!(metadata.contains("<records_number>3</records_number>"));
    assert!(metadata.contains("<deleted_number>1</deleted_number>"));
    assert!(metadata.contains("<deleted_record>persistent</deleted_record>"));
}

#[test]
fn no_records_match_is_empty() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Quiet Repo", ENDPOINT, Some("nothing"));
    let stub = StubTransport::new();
    stub.body(ENDPOINT, OaiRequest::Identify, identify_xml("Quiet Repo"));
    stub.body(ENDPOINT, first_page(&target), error_xml("noRecordsMatch"));

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Empty);
    assert_eq!(outcome.records_seen, 0);
    assert_eq!(outcome.error_detail.as_deref(), Some("noRecordsMatch"));
    assert!(!StorageKey::for_target(&target).records_file(dir.path()).exists());
}

#[test]
fn empty_answer_keeps_previous_harvest() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Stable Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(&target, "Stable Repo", &[records(&["A", "B"])]);
    assert_eq!(harvest(&stub, &sink, &target).status, HarvestStatus::Success);

    stub.body(ENDPOINT, first_page(&target), error_xml("noRecordsMatch"));
    assert_eq!(harvest(&stub, &sink, &target).status, HarvestStatus::Empty);

    assert_eq!(identifiers_in(&records_file(&dir, &target)), vec!["A", "B"]);
    assert!(metadata_file(&dir, &target).contains("<records_number>2</records_number>"));
}

#[test]
fn rerun_replaces_previous_output() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Growing Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(&target, "Growing Repo", &[records(&["A", "B", "C"])]);
    harvest(&stub, &sink, &target);

    stub.repository(&target, "Growing Repo", &[records(&["D"])]);
    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Success);
    assert_eq!(identifiers_in(&records_file(&dir, &target)), vec!["D"]);
    assert!(metadata_file(&dir, &target).contains("<records_number>1</records_number>"));
}

#[test]
fn transport_fault_mid_walk_keeps_partial_output() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Flaky Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.body(ENDPOINT, OaiRequest::Identify, identify_xml("Flaky Repo"));
    stub.body(
        ENDPOINT,
        first_page(&target),
        list_records_xml(&records(&["A", "B"]), Some("t1")),
    );
    stub.route(
        ENDPOINT,
        resume("t1"),
        vec![Reply::Transport("connection reset by peer".to_string())],
    );

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Retryable);
    assert_eq!(outcome.records_seen, 2);
    assert_eq!(outcome.fault_kind, Some("transport"));
    assert!(outcome.error_detail.unwrap().contains("connection reset"));
    assert_eq!(identifiers_in(&records_file(&dir, &target)), vec!["A", "B"]);
    let metadata = metadata_file(&dir, &target);
    assert!(metadata.contains("<harvest_status>partial</harvest_status>"));
    assert!(metadata.contains("<records_number>2</records_number>"));
}

#[test]
fn fault_on_first_page_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Down Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.body(ENDPOINT, OaiRequest::Identify, identify_xml("Down Repo"));
    stub.route(
        ENDPOINT,
        first_page(&target),
        vec![Reply::Transport("timed out".to_string())],
    );

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Retryable);
    let key = StorageKey::for_target(&target);
    assert!(!key.records_file(dir.path()).exists());
    assert!(!key.metadata_file(dir.path()).exists());
}

#[test]
fn fault_before_first_record_keeps_previous_harvest() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Flaky Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(&target, "Flaky Repo", &[records(&["A", "B"])]);
    assert_eq!(harvest(&stub, &sink, &target).status, HarvestStatus::Success);
    let records_before = records_file(&dir, &target);
    let metadata_before = metadata_file(&dir, &target);

    stub.route(
        ENDPOINT,
        first_page(&target),
        vec![Reply::Transport("timed out".to_string())],
    );
    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Retryable);
    assert_eq!(outcome.records_seen, 0);
    assert_eq!(records_file(&dir, &target), records_before);
    assert_eq!(metadata_file(&dir, &target), metadata_before);
}

#[test]
fn identify_error_is_permanent_and_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Broken Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.body(ENDPOINT, OaiRequest::Identify, error_xml("badVerb"));

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Permanent);
    assert_eq!(outcome.fault_kind, Some("protocol"));
    assert_eq!(stub.count(ENDPOINT, "ListRecords"), 0);
    assert!(!StorageKey::for_target(&target).dir(dir.path()).exists());
}

#[test]
fn unrecognised_error_code_is_permanent_unknown() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Odd Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.body(ENDPOINT, OaiRequest::Identify, identify_xml("Odd Repo"));
    stub.body(ENDPOINT, first_page(&target), error_xml("serverOnFire"));

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Permanent);
    assert_eq!(outcome.fault_kind, Some("unknown"));
}

#[test]
fn repeated_token_is_protocol_fault() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Looping Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.body(ENDPOINT, OaiRequest::Identify, identify_xml("Looping Repo"));
    stub.body(
        ENDPOINT,
        first_page(&target),
        list_records_xml(&records(&["A"]), Some("same")),
    );
    stub.body(
        ENDPOINT,
        resume("same"),
        list_records_xml(&records(&["B"]), Some("same")),
    );

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Permanent);
    assert_eq!(outcome.fault_kind, Some("protocol"));
    assert!(outcome.error_detail.unwrap().contains("repeated resumption token"));
    assert_eq!(stub.count(ENDPOINT, "ListRecords"), 2);
}

#[test]
fn empty_page_with_token_is_skipped() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Sparse Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(
        &target,
        "Sparse Repo",
        &[records(&["A"]), Vec::new(), records(&["B"])],
    );

    let outcome = harvest(&stub, &sink, &target);

    assert_eq!(outcome.status, HarvestStatus::Success);
    assert_eq!(outcome.records_seen, 2);
    assert_eq!(outcome.pages_fetched, 3);
    assert_eq!(identifiers_in(&records_file(&dir, &target)), vec!["A", "B"]);
}

#[test]
fn cancellation_stops_the_stream_between_pages() {
    let target = target("Long Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(
        &target,
        "Long Repo",
        &[records(&["A", "B"]), records(&["C"])],
    );
    let cancel = CancelToken::new();
    let session = ProtocolSession::new(&stub, &target, cancel.clone());

    let mut stream = session.list_records();
    assert_eq!(stream.next().unwrap().unwrap().identifier, "A");
    cancel.cancel();
    // Already-fetched records still drain
    assert_eq!(stream.next().unwrap().unwrap().identifier, "B");
    assert!(matches!(stream.next(), Some(Err(Fault::Cancelled))));
    assert!(stream.next().is_none());

    assert_eq!(stub.count(ENDPOINT, "ListRecords"), 1);
}

#[test]
fn cancelled_before_start_is_retryable() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let target = target("Late Repo", ENDPOINT, None);
    let stub = StubTransport::new();
    stub.repository(&target, "Late Repo", &[records(&["A"])]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let ctx = TaskContext {
        transport: &stub,
        sink: &sink,
        cancel: &cancel,
        pass: 1,
    };

    let outcome = harvest_target(&target, ctx, ProgressBar::hidden());

    assert_eq!(outcome.status, HarvestStatus::Retryable);
    assert_eq!(outcome.fault_kind, Some("cancelled"));
    assert!(!StorageKey::for_target(&target).dir(dir.path()).exists());
}

#[test]
fn sets_of_one_repository_share_a_folder() {
    let dir = TempDir::new().unwrap();
    let sink = RecordSink::new(dir.path());
    let theses = target("Shared Repo", ENDPOINT, Some("theses"));
    let articles = target("Shared Repo", ENDPOINT, Some("articles"));
    let stub = StubTransport::new();
    stub.repository(&theses, "Shared Repo", &[records(&["T1"])]);
    stub.body(
        ENDPOINT,
        first_page(&articles),
        list_records_xml(&records(&["A1", "A2"]), None),
    );

    assert_eq!(harvest(&stub, &sink, &theses).status, HarvestStatus::Success);
    assert_eq!(harvest(&stub, &sink, &articles).status, HarvestStatus::Success);

    let folder = dir.path().join("shared_repo");
    let mut names: Vec<_> = fs::read_dir(&folder)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "shared_repo_articles.metadata.xml",
            "shared_repo_articles.xml",
            "shared_repo_theses.metadata.xml",
            "shared_repo_theses.xml",
        ]
    );
}
