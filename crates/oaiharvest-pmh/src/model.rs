//! OAI-PMH harvest data model

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// One repository/set to harvest, as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HarvestTarget {
    /// Human-readable repository name (entities already decoded)
    pub display_name: String,
    /// OAI-PMH base URL
    pub endpoint_url: String,
    /// `None` harvests the unqualified record stream
    pub set_spec: Option<String>,
    pub metadata_prefix: String,
}

impl HarvestTarget {
    pub fn new(
        display_name: impl Into<String>,
        endpoint_url: impl Into<String>,
        set_spec: Option<String>,
        metadata_prefix: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            endpoint_url: endpoint_url.into(),
            set_spec,
            metadata_prefix: metadata_prefix.into(),
        }
    }
}

impl fmt::Display for HarvestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.set_spec {
            Some(set) => write!(f, "{} [{set}]", self.display_name),
            None => write!(f, "{}", self.display_name),
        }
    }
}

/// `deletedRecord` support declared by Identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedRecordPolicy {
    #[default]
    No,
    Transient,
    Persistent,
}

impl DeletedRecordPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "no" => Some(Self::No),
            "transient" => Some(Self::Transient),
            "persistent" => Some(Self::Persistent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Transient => "transient",
            Self::Persistent => "persistent",
        }
    }
}

/// Identify response, derived once per attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub repository_name: String,
    pub base_url: String,
    pub protocol_version: String,
    pub granularity: String,
    /// Supported encodings, possibly empty
    pub compression: Vec<String>,
    pub deleted_record_policy: DeletedRecordPolicy,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: Option<String>,
}

/// One record from a ListRecords page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRecord {
    pub identifier: String,
    /// `status="deleted"` on the header
    pub is_deleted: bool,
    pub datestamp: Option<String>,
    pub set_specs: Vec<String>,
    /// Raw `<record>` element exactly as served
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestStatus {
    Success,
    /// Server answered `noRecordsMatch`
    Empty,
    /// Transient fault; worth another pass
    Retryable,
    Permanent,
}

impl HarvestStatus {
    /// Whether the target goes back on the worklist for the next pass
    pub fn is_requeueable(&self) -> bool {
        matches!(self, Self::Empty | Self::Retryable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Empty => "empty",
            Self::Retryable => "retryable",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one harvest attempt for one target.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestOutcome {
    pub target: HarvestTarget,
    pub status: HarvestStatus,
    pub records_seen: u64,
    pub records_deleted: u64,
    pub pages_fetched: u64,
    /// 1-based pass that produced this outcome
    pub pass: u32,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Present iff `status != Success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_kind: Option<&'static str>,
}

const NOT_ATTEMPTED: &str = "not attempted";

impl HarvestOutcome {
    /// Outcome for a target that never got a session in its pass.
    pub fn not_attempted(target: HarvestTarget, pass: u32) -> Self {
        Self {
            target,
            status: HarvestStatus::Retryable,
            records_seen: 0,
            records_deleted: 0,
            pages_fetched: 0,
            pass,
            elapsed: Duration::ZERO,
            error_detail: Some(NOT_ATTEMPTED.to_string()),
            fault_kind: Some("cancelled"),
        }
    }

    pub fn was_attempted(&self) -> bool {
        self.error_detail.as_deref() != Some(NOT_ATTEMPTED)
    }

    /// Fold this requeue-pass outcome into the one `previous` pass left.
    ///
    /// A target skipped by its pass keeps the earlier outcome whole. A requeued
    /// attempt that kept no records leaves the earlier output on disk, so the
    /// earlier counts still describe it.
    pub fn after(self, previous: HarvestOutcome) -> HarvestOutcome {
        if !self.was_attempted() {
            return previous;
        }
        if self.status.is_requeueable() && self.records_seen == 0 {
            return HarvestOutcome {
                records_seen: previous.records_seen,
                records_deleted: previous.records_deleted,
                ..self
            };
        }
        self
    }
}

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((d.as_secs_f64() * 1000.0).round() / 1000.0)
}
