//! Per-target metadata document (`<stem>.metadata.xml`)

use std::fmt::Display;
use std::io::Cursor;

use chrono::{DateTime, SecondsFormat, Utc};
use oaiharvest_core::Fault;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::model::{HarvestTarget, RepositoryDescriptor};

/// Whether the record collection next to the document is the whole list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Complete,
    /// The walk stopped on a fault or cancellation
    Partial,
}

impl Completeness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
        }
    }
}

/// Repository descriptor plus harvest counts, one XML element per field.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    pub repository_name: String,
    pub base_url: String,
    /// Endpoint actually harvested (may differ from the advertised base URL)
    pub latest_url: String,
    pub protocol_version: String,
    pub granularity: String,
    pub compression: Vec<String>,
    pub deleted_record: String,
    pub earliest_datestamp: Option<String>,
    pub admin_emails: Vec<String>,
    pub set_spec: Option<String>,
    pub metadata_prefix: String,
    pub records_number: u64,
    pub deleted_number: u64,
    pub harvest_status: Completeness,
    pub harvested_at: DateTime<Utc>,
}

impl MetadataDocument {
    pub fn new(
        descriptor: &RepositoryDescriptor,
        target: &HarvestTarget,
        records_number: u64,
        deleted_number: u64,
        harvest_status: Completeness,
    ) -> Self {
        Self {
            repository_name: descriptor.repository_name.clone(),
            base_url: descriptor.base_url.clone(),
            latest_url: target.endpoint_url.clone(),
            protocol_version: descriptor.protocol_version.clone(),
            granularity: descriptor.granularity.clone(),
            compression: descriptor.compression.clone(),
            deleted_record: descriptor.deleted_record_policy.as_str().to_string(),
            earliest_datestamp: descriptor.earliest_datestamp.clone(),
            admin_emails: descriptor.admin_emails.clone(),
            set_spec: target.set_spec.clone(),
            metadata_prefix: target.metadata_prefix.clone(),
            records_number,
            deleted_number,
            harvest_status,
            harvested_at: Utc::now(),
        }
    }

    /// Render as an indented UTF-8 XML document.
    pub fn render(&self) -> Result<Vec<u8>, Fault> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(render_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("metadata")))
            .map_err(render_error)?;

        let records = self.records_number.to_string();
        let deleted = self.deleted_number.to_string();
        let harvested_at = self.harvested_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let compression = self.compression.join(", ");

        let mut fields: Vec<(&str, &str)> = vec![
            ("repository_name", self.repository_name.as_str()),
            ("base_url", self.base_url.as_str()),
            ("latest_url", self.latest_url.as_str()),
            ("protocol_version", self.protocol_version.as_str()),
            ("granularity", self.granularity.as_str()),
            ("compression", compression.as_str()),
            ("deleted_record", self.deleted_record.as_str()),
            (
                "earliest_datestamp",
                self.earliest_datestamp.as_deref().unwrap_or_default(),
            ),
        ];
        if self.admin_emails.is_empty() {
            fields.push(("admin_email", ""));
        }
        for email in &self.admin_emails {
            fields.push(("admin_email", email.as_str()));
        }
        fields.extend([
            ("set_spec", self.set_spec.as_deref().unwrap_or_default()),
            ("metadata_prefix", self.metadata_prefix.as_str()),
            ("records_number", records.as_str()),
            ("deleted_number", deleted.as_str()),
            ("harvest_status", self.harvest_status.as_str()),
            ("harvested_at", harvested_at.as_str()),
        ]);

        for (tag, value) in fields {
            write_field(&mut writer, tag, value)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("metadata")))
            .map_err(render_error)?;
        let mut bytes = writer.into_inner().into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn write_field(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, value: &str) -> Result<(), Fault> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(render_error)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(render_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(render_error)
}

fn render_error(e: impl Display) -> Fault {
    Fault::Unknown(format!("rendering metadata document: {e}"))
}
