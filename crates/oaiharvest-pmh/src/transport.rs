//! OAI-PMH request transport

use std::time::Duration;

use oaiharvest_core::{CancelToken, Fault, get_text};

/// Longest body excerpt carried in a transport fault
const BODY_EXCERPT_CHARS: usize = 200;

/// One OAI-PMH request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OaiRequest {
    Identify,
    /// First ListRecords page
    ListRecords {
        metadata_prefix: String,
        set: Option<String>,
    },
    /// Follow-up page: carries only the verb and the token
    Resume { token: String },
}

impl OaiRequest {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::ListRecords { .. } | Self::Resume { .. } => "ListRecords",
        }
    }

    /// Query parameters, `verb` first. An absent set is omitted, never sent as a literal.
    pub fn query(&self) -> Vec<(&str, &str)> {
        let mut query = vec![("verb", self.verb())];
        match self {
            Self::Identify => {}
            Self::ListRecords {
                metadata_prefix,
                set,
            } => {
                query.push(("metadataPrefix", metadata_prefix.as_str()));
                if let Some(set) = set {
                    query.push(("set", set.as_str()));
                }
            }
            Self::Resume { token } => query.push(("resumptionToken", token.as_str())),
        }
        query
    }
}

/// Sends OAI-PMH requests and returns the raw response document.
///
/// Implementations map network failures to [`Fault::Transport`] and
/// cancellation to [`Fault::Cancelled`]; interpreting the document is the
/// parser's job.
pub trait Transport: Send + Sync {
    fn send(&self, endpoint: &str, request: &OaiRequest, cancel: &CancelToken)
    -> Result<String, Fault>;
}

/// HTTP GET transport over the shared client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(oaiharvest_core::http_config().request_timeout)
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        endpoint: &str,
        request: &OaiRequest,
        cancel: &CancelToken,
    ) -> Result<String, Fault> {
        let response = get_text(endpoint, &request.query(), self.timeout, cancel)?;
        if response.is_success() {
            return Ok(response.body);
        }
        if looks_like_oai(&response.body) {
            // Some servers send OAI errors with 4xx/5xx; the error code decides
            log::debug!(
                "{endpoint}: HTTP {} carrying an OAI-PMH document",
                response.status
            );
            return Ok(response.body);
        }
        Err(Fault::Transport {
            status: Some(response.status),
            message: excerpt(&response.body),
        })
    }
}

fn looks_like_oai(body: &str) -> bool {
    body.contains("<OAI-PMH") || body.contains(":OAI-PMH")
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    if out.len() < trimmed.len() {
        out.push_str("...");
    }
    out
}
