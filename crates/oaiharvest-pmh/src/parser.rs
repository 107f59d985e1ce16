//! OAI-PMH response parser using quick-xml
//!
//! Elements are matched on their local name so any namespace prefix works.
//! `<record>` payloads are sliced out of the input by byte position, so they
//! are passed through exactly as the server sent them.

use std::borrow::Cow;
use std::fmt::Display;

use oaiharvest_core::Fault;
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::model::{DeletedRecordPolicy, HarvestRecord, RepositoryDescriptor};

/// OAI error codes that mean the request itself can never succeed
const PROTOCOL_ERROR_CODES: &[&str] = &[
    "badVerb",
    "badArgument",
    "badResumptionToken",
    "cannotDisseminateFormat",
    "noSetHierarchy",
    "noMetadataFormats",
    "idDoesNotExist",
];

const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// `<error code="...">message</error>` from an OAI-PMH response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OaiError {
    pub code: String,
    pub message: String,
}

impl OaiError {
    /// Map a server-reported error onto the fault taxonomy.
    pub fn into_fault(self) -> Fault {
        let detail = if self.message.is_empty() {
            self.code.clone()
        } else {
            format!("{}: {}", self.code, self.message)
        };
        if PROTOCOL_ERROR_CODES.contains(&self.code.as_str()) {
            Fault::Protocol(detail)
        } else {
            Fault::Unknown(format!("unrecognised OAI error {detail}"))
        }
    }
}

/// `<resumptionToken>` of a ListRecords page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumptionToken {
    pub token: String,
    pub complete_list_size: Option<u64>,
    pub cursor: Option<u64>,
}

/// One ListRecords page
#[derive(Debug, Default)]
pub struct RecordPage {
    pub records: Vec<HarvestRecord>,
    /// `None` (or an empty token element) ends the list
    pub resumption: Option<ResumptionToken>,
    /// Reported on the token element, even on the final (empty-token) page
    pub complete_list_size: Option<u64>,
}

/// Parsed ListRecords response.
#[derive(Debug)]
pub enum ListRecordsResponse {
    Page(RecordPage),
    /// Server answered `noRecordsMatch`
    NoRecords,
}

fn malformed(e: impl Display) -> Fault {
    Fault::protocol(format!("malformed XML: {e}"))
}

fn local_name(e: &BytesStart<'_>) -> Vec<u8> {
    e.local_name().as_ref().to_vec()
}

fn decode_text(raw: Cow<'_, str>) -> Result<String, Fault> {
    Ok(unescape(&raw).map_err(malformed)?.trim().to_string())
}

fn read_element_text(reader: &mut Reader<&[u8]>, e: &BytesStart<'_>) -> Result<String, Fault> {
    let raw = reader.read_text(e.name()).map_err(malformed)?;
    decode_text(raw)
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, Fault> {
    match e.try_get_attribute(name).map_err(malformed)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(malformed)?.into_owned())),
        None => Ok(None),
    }
}

/// Check the document root; every response must be an `<OAI-PMH>` element.
fn check_root(e: &BytesStart<'_>) -> Result<(), Fault> {
    let name = e.local_name();
    if name.as_ref() == b"OAI-PMH" {
        Ok(())
    } else {
        Err(Fault::protocol(format!(
            "not an OAI-PMH document (root <{}>)",
            String::from_utf8_lossy(name.as_ref())
        )))
    }
}

fn read_error(reader: &mut Reader<&[u8]>, e: &BytesStart<'_>, empty: bool) -> Result<OaiError, Fault> {
    let code = attribute(e, "code")?.unwrap_or_default();
    let message = if empty {
        String::new()
    } else {
        read_element_text(reader, e)?
    };
    Ok(OaiError { code, message })
}

/// Parse an Identify response.
pub fn parse_identify(xml: &str) -> Result<RepositoryDescriptor, Fault> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut descriptor = RepositoryDescriptor::default();
    let mut seen_root = false;
    let mut seen_identify = false;
    let mut seen_name = false;
    let mut errors = Vec::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) if !seen_root => {
                check_root(&e)?;
                seen_root = true;
            }
            Event::Start(e) => match local_name(&e).as_slice() {
                b"error" => errors.push(read_error(&mut reader, &e, false)?),
                b"Identify" => seen_identify = true,
                b"repositoryName" => {
                    descriptor.repository_name = read_element_text(&mut reader, &e)?;
                    seen_name = true;
                }
                b"baseURL" => descriptor.base_url = read_element_text(&mut reader, &e)?,
                b"protocolVersion" => {
                    descriptor.protocol_version = read_element_text(&mut reader, &e)?
                }
                b"granularity" => descriptor.granularity = read_element_text(&mut reader, &e)?,
                b"earliestDatestamp" => {
                    let value = read_element_text(&mut reader, &e)?;
                    if !value.is_empty() {
                        descriptor.earliest_datestamp = Some(value);
                    }
                }
                b"deletedRecord" => {
                    let value = read_element_text(&mut reader, &e)?;
                    match DeletedRecordPolicy::parse(&value) {
                        Some(policy) => descriptor.deleted_record_policy = policy,
                        None => log::warn!("Unknown deletedRecord value '{value}', assuming 'no'"),
                    }
                }
                b"adminEmail" => {
                    let value = read_element_text(&mut reader, &e)?;
                    if !value.is_empty() {
                        descriptor.admin_emails.push(value);
                    }
                }
                b"compression" => {
                    let value = read_element_text(&mut reader, &e)?;
                    if !value.is_empty() {
                        descriptor.compression.push(value);
                    }
                }
                // Free-form containers; their children reuse common names
                b"description" => {
                    reader.read_to_end(e.name()).map_err(malformed)?;
                }
                _ => {}
            },
            Event::Empty(e) if !seen_root => {
                check_root(&e)?;
                seen_root = true;
            }
            Event::Empty(e) if local_name(&e) == b"error" => {
                errors.push(read_error(&mut reader, &e, true)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(Fault::protocol("empty response, not an OAI-PMH document"));
    }
    if let Some(error) = errors.into_iter().next() {
        if error.code == NO_RECORDS_MATCH {
            return Err(Fault::protocol("noRecordsMatch in reply to Identify"));
        }
        return Err(error.into_fault());
    }
    if !seen_identify {
        return Err(Fault::protocol("response has no <Identify> element"));
    }
    if !seen_name {
        return Err(Fault::protocol("Identify response has no <repositoryName>"));
    }
    Ok(descriptor)
}

/// Parse a ListRecords response (first page or a resumed page).
pub fn parse_list_records(xml: &str) -> Result<ListRecordsResponse, Fault> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = RecordPage::default();
    let mut seen_root = false;
    let mut seen_list = false;
    let mut errors: Vec<OaiError> = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) if !seen_root => {
                check_root(&e)?;
                seen_root = true;
            }
            Event::Start(e) => match local_name(&e).as_slice() {
                b"error" => errors.push(read_error(&mut reader, &e, false)?),
                b"ListRecords" => seen_list = true,
                b"record" => page.records.push(parse_record(&mut reader, xml, start)?),
                b"resumptionToken" => {
                    let (size, cursor) = token_attributes(&e)?;
                    page.complete_list_size = size;
                    let token = read_element_text(&mut reader, &e)?;
                    if !token.is_empty() {
                        page.resumption = Some(ResumptionToken {
                            token,
                            complete_list_size: size,
                            cursor,
                        });
                    }
                }
                _ => {}
            },
            Event::Empty(e) if !seen_root => {
                check_root(&e)?;
                seen_root = true;
            }
            Event::Empty(e) => match local_name(&e).as_slice() {
                b"error" => errors.push(read_error(&mut reader, &e, true)?),
                b"ListRecords" => seen_list = true,
                b"resumptionToken" => page.complete_list_size = token_attributes(&e)?.0,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(Fault::protocol("empty response, not an OAI-PMH document"));
    }
    if errors.iter().any(|e| e.code == NO_RECORDS_MATCH) {
        return Ok(ListRecordsResponse::NoRecords);
    }
    if let Some(error) = errors.into_iter().next() {
        return Err(error.into_fault());
    }
    if !seen_list {
        return Err(Fault::protocol("response has no <ListRecords> element"));
    }
    Ok(ListRecordsResponse::Page(page))
}

fn token_attributes(e: &BytesStart<'_>) -> Result<(Option<u64>, Option<u64>), Fault> {
    // Servers put all sorts of junk here; an unparseable size is just unknown
    let size = attribute(e, "completeListSize")?.and_then(|v| v.trim().parse().ok());
    let cursor = attribute(e, "cursor")?.and_then(|v| v.trim().parse().ok());
    Ok((size, cursor))
}

/// Parse one `<record>`; `start` is the byte offset where its start tag begins.
fn parse_record(reader: &mut Reader<&[u8]>, xml: &str, start: usize) -> Result<HarvestRecord, Fault> {
    let mut identifier = None;
    let mut is_deleted = false;
    let mut datestamp = None;
    let mut set_specs = Vec::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => match local_name(&e).as_slice() {
                b"header" => is_deleted = header_is_deleted(&e)?,
                b"identifier" => identifier = Some(read_element_text(reader, &e)?),
                b"datestamp" => datestamp = Some(read_element_text(reader, &e)?),
                b"setSpec" => set_specs.push(read_element_text(reader, &e)?),
                // Payload content is opaque; dc:identifier etc. must not leak into the header
                b"metadata" | b"about" => {
                    reader.read_to_end(e.name()).map_err(malformed)?;
                }
                _ => {}
            },
            Event::Empty(e) if local_name(&e) == b"header" => {
                is_deleted = header_is_deleted(&e)?;
            }
            Event::End(e) if e.local_name().as_ref() == b"record" => break,
            Event::Eof => return Err(Fault::protocol("document ends inside <record>")),
            _ => {}
        }
    }

    let end = reader.buffer_position() as usize;
    let payload = xml
        .get(start..end)
        .ok_or_else(|| Fault::protocol("record offsets out of range"))?
        .trim()
        .to_string();
    let identifier = identifier
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Fault::protocol("record header without <identifier>"))?;

    Ok(HarvestRecord {
        identifier,
        is_deleted,
        datestamp,
        set_specs,
        payload,
    })
}

fn header_is_deleted(e: &BytesStart<'_>) -> Result<bool, Fault> {
    Ok(attribute(e, "status")?.is_some_and(|s| s == "deleted"))
}
