//! Protocol session: Identify, then paginated ListRecords for one target
//!
//! Pagination is a pull-based iterator. The next page is requested only when
//! the consumer has drained the current one, so stopping early never costs
//! another round trip.

use std::collections::VecDeque;

use oaiharvest_core::{CancelToken, Fault};

use crate::model::{HarvestRecord, HarvestTarget, RepositoryDescriptor};
use crate::parser::{ListRecordsResponse, parse_identify, parse_list_records};
use crate::transport::{OaiRequest, Transport};

/// OAI-PMH conversation with one (endpoint, set, metadataPrefix) tuple.
pub struct ProtocolSession<'a> {
    transport: &'a dyn Transport,
    target: &'a HarvestTarget,
    cancel: CancelToken,
}

impl<'a> ProtocolSession<'a> {
    pub fn new(transport: &'a dyn Transport, target: &'a HarvestTarget, cancel: CancelToken) -> Self {
        Self {
            transport,
            target,
            cancel,
        }
    }

    pub fn target(&self) -> &HarvestTarget {
        self.target
    }

    /// Single Identify exchange.
    pub fn identify(&self) -> Result<RepositoryDescriptor, Fault> {
        let body = self.exchange(&OaiRequest::Identify)?;
        parse_identify(&body)
    }

    /// Lazy record sequence for this target's set and metadata format.
    pub fn list_records(&self) -> RecordStream<'_> {
        RecordStream {
            session: self,
            state: StreamState::Requesting,
            buffer: VecDeque::new(),
            pages_fetched: 0,
            complete_list_size: None,
            last_token: None,
        }
    }

    fn exchange(&self, request: &OaiRequest) -> Result<String, Fault> {
        log::debug!(
            "{} -> {} {}",
            self.target.display_name,
            request.verb(),
            self.target.endpoint_url
        );
        self.transport
            .send(&self.target.endpoint_url, request, &self.cancel)
    }
}

/// How a record stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Last page had no resumption token
    Exhausted,
    /// First request answered `noRecordsMatch`
    NoRecords,
    /// A fault was yielded as the final item
    Failed,
}

#[derive(Debug)]
enum StreamState {
    Requesting,
    Paginating(String),
    Done(Completion),
}

/// Records of one ListRecords walk, in server order.
///
/// Yields `Err` at most once, as the last item; records yielded before it
/// remain valid.
pub struct RecordStream<'s> {
    session: &'s ProtocolSession<'s>,
    state: StreamState,
    buffer: VecDeque<HarvestRecord>,
    pages_fetched: u64,
    complete_list_size: Option<u64>,
    last_token: Option<String>,
}

impl RecordStream<'_> {
    /// `None` while pages remain to be fetched
    pub fn completion(&self) -> Option<Completion> {
        match self.state {
            StreamState::Done(completion) if self.buffer.is_empty() => Some(completion),
            _ => None,
        }
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Most recent `completeListSize` reported by the server
    pub fn complete_list_size(&self) -> Option<u64> {
        self.complete_list_size
    }

    fn fail(&mut self, fault: Fault) -> Option<Result<HarvestRecord, Fault>> {
        self.state = StreamState::Done(Completion::Failed);
        Some(Err(fault))
    }
}

impl Iterator for RecordStream<'_> {
    type Item = Result<HarvestRecord, Fault>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }

            let target = self.session.target;
            let request = match &self.state {
                StreamState::Done(_) => return None,
                StreamState::Requesting => OaiRequest::ListRecords {
                    metadata_prefix: target.metadata_prefix.clone(),
                    set: target.set_spec.clone(),
                },
                StreamState::Paginating(token) => OaiRequest::Resume {
                    token: token.clone(),
                },
            };
            let first_page = matches!(self.state, StreamState::Requesting);

            if self.session.cancel.is_cancelled() {
                return self.fail(Fault::Cancelled);
            }

            let response = match self
                .session
                .exchange(&request)
                .and_then(|body| parse_list_records(&body))
            {
                Ok(response) => response,
                Err(fault) => return self.fail(fault),
            };

            let page = match response {
                ListRecordsResponse::NoRecords if first_page => {
                    self.state = StreamState::Done(Completion::NoRecords);
                    return None;
                }
                ListRecordsResponse::NoRecords => {
                    log::debug!(
                        "{}: noRecordsMatch on a resumed page, treating as end of list",
                        target.display_name
                    );
                    self.state = StreamState::Done(Completion::Exhausted);
                    return None;
                }
                ListRecordsResponse::Page(page) => page,
            };

            self.pages_fetched += 1;
            if page.complete_list_size.is_some() {
                self.complete_list_size = page.complete_list_size;
            }
            log::debug!(
                "{}: page {} with {} records{}",
                target.display_name,
                self.pages_fetched,
                page.records.len(),
                if page.resumption.is_some() { ", more to come" } else { "" }
            );

            match page.resumption {
                Some(next) if self.last_token.as_deref() == Some(next.token.as_str()) => {
                    return self.fail(Fault::protocol(format!(
                        "server repeated resumption token '{}'",
                        next.token
                    )));
                }
                Some(next) => {
                    self.last_token = Some(next.token.clone());
                    self.state = StreamState::Paginating(next.token);
                }
                None => self.state = StreamState::Done(Completion::Exhausted),
            }
            // An empty page with a token just moves on to the next one
            self.buffer.extend(page.records);
        }
    }
}
