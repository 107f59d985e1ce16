//! Shared fixtures: a scripted in-memory transport and OAI-PMH document builders
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use oaiharvest_core::{CancelToken, Fault, pause};
use oaiharvest_pmh::{HarvestTarget, OaiRequest, Transport};

/// Scripted answer to one request
#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Transport(String),
    Panic,
}

/// Transport answering from per-request scripts.
///
/// Replies are consumed in order; the last one repeats forever.
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<(String, OaiRequest), VecDeque<Reply>>>,
    log: Mutex<Vec<(String, OaiRequest)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every exchange open for `delay` (cut short by cancellation)
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn route(&self, endpoint: &str, request: OaiRequest, replies: Vec<Reply>) {
        assert!(!replies.is_empty(), "a route needs at least one reply");
        self.routes
            .lock()
            .unwrap()
            .insert((endpoint.to_string(), request), replies.into());
    }

    pub fn body(&self, endpoint: &str, request: OaiRequest, body: String) {
        self.route(endpoint, request, vec![Reply::Body(body)]);
    }

    /// Identify plus a ListRecords walk over `pages` (tokens `t1`, `t2`, ...).
    pub fn repository(&self, target: &HarvestTarget, name: &str, pages: &[Vec<String>]) {
        let endpoint = target.endpoint_url.as_str();
        self.body(endpoint, OaiRequest::Identify, identify_xml(name));
        for (i, records) in pages.iter().enumerate() {
            let request = if i == 0 {
                first_page(target)
            } else {
                resume(&format!("t{i}"))
            };
            let next = (i + 1 < pages.len()).then(|| format!("t{}", i + 1));
            self.body(endpoint, request, list_records_xml(records, next.as_deref()));
        }
    }

    pub fn requests(&self) -> Vec<(String, OaiRequest)> {
        self.log.lock().unwrap().clone()
    }

    /// Number of exchanges sent to `endpoint` with `verb`
    pub fn count(&self, endpoint: &str, verb: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, r)| e == endpoint && r.verb() == verb)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, endpoint: &str, request: &OaiRequest) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(endpoint.to_string(), request.clone()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Transport for StubTransport {
    fn send(
        &self,
        endpoint: &str,
        request: &OaiRequest,
        cancel: &CancelToken,
    ) -> Result<String, Fault> {
        self.log
            .lock()
            .unwrap()
            .push((endpoint.to_string(), request.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let completed = pause(self.delay, cancel);
        let reply = self.next_reply(endpoint, request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !completed {
            return Err(Fault::Cancelled);
        }
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Transport(message)) => Err(Fault::transport(message)),
            Some(Reply::Panic) => panic!("scripted panic for {request:?}"),
            None => Err(Fault::transport(format!("no route for {endpoint} {request:?}"))),
        }
    }
}

pub fn target(name: &str, endpoint: &str, set: Option<&str>) -> HarvestTarget {
    HarvestTarget::new(name, endpoint, set.map(String::from), "oai_dc")
}

pub fn first_page(target: &HarvestTarget) -> OaiRequest {
    OaiRequest::ListRecords {
        metadata_prefix: target.metadata_prefix.clone(),
        set: target.set_spec.clone(),
    }
}

pub fn resume(token: &str) -> OaiRequest {
    OaiRequest::Resume {
        token: token.to_string(),
    }
}

const ENVELOPE_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2024-03-01T12:00:00Z</responseDate>
  <request>http://repo.example.org/oai</request>"#;

pub fn identify_xml(name: &str) -> String {
    format!(
        r#"{ENVELOPE_OPEN}
  <Identify>
    <repositoryName>{name}</repositoryName>
    <baseURL>http://repo.example.org/oai</baseURL>
    <protocolVersion>2.0</protocolVersion>
    <adminEmail>admin@repo.example.org</adminEmail>
    <earliestDatestamp>2005-01-01</earliestDatestamp>
    <deletedRecord>persistent</deletedRecord>
    <granularity>YYYY-MM-DDThh:mm:ssZ</granularity>
  </Identify>
</OAI-PMH>"#
    )
}

pub fn record_xml(id: &str, deleted: bool) -> String {
    if deleted {
        format!(
            r#"<record><header status="deleted"><identifier>{id}</identifier><datestamp>2023-01-01T00:00:00Z</datestamp></header></record>"#
        )
    } else {
        format!(
            r#"<record><header><identifier>{id}</identifier><datestamp>2022-06-15T08:30:00Z</datestamp><setSpec>col_10292_4</setSpec></header><metadata><oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Record {id}</dc:title></oai_dc:dc></metadata></record>"#
        )
    }
}

/// Live records with the given identifiers
pub fn records(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| record_xml(id, false)).collect()
}

pub fn list_records_xml(records: &[String], token: Option<&str>) -> String {
    let token = match token {
        Some(token) => format!("<resumptionToken>{token}</resumptionToken>"),
        None => String::new(),
    };
    format!(
        "{ENVELOPE_OPEN}\n  <ListRecords>\n{}\n{token}\n  </ListRecords>\n</OAI-PMH>",
        records.join("\n")
    )
}

pub fn error_xml(code: &str) -> String {
    format!(r#"{ENVELOPE_OPEN}<error code="{code}">scripted {code}</error></OAI-PMH>"#)
}

/// Identifiers in a records file, in file order
pub fn identifiers_in(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| {
            let start = line.find("<identifier>")? + "<identifier>".len();
            let end = line[start..].find("</identifier>")? + start;
            Some(line[start..end].to_string())
        })
        .collect()
}
