//! Identify subcommand - probe one endpoint

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use oaiharvest_core::CancelToken;
use oaiharvest_pmh::config::DEFAULT_METADATA_PREFIX;
use oaiharvest_pmh::{HarvestTarget, HttpTransport, ProtocolSession};

use super::key_value_table;

#[derive(Args, Debug)]
pub struct IdentifyArgs {
    /// OAI-PMH base URL
    pub url: String,
}

pub fn run(args: IdentifyArgs, request_timeout: Duration) -> Result<ExitCode> {
    let target = HarvestTarget::new(
        args.url.clone(),
        args.url.clone(),
        None,
        DEFAULT_METADATA_PREFIX,
    );
    let transport = HttpTransport::new(request_timeout);
    let session = ProtocolSession::new(&transport, &target, CancelToken::new());
    let descriptor = session
        .identify()
        .with_context(|| format!("Identify failed for {}", args.url))?;

    let emails = if descriptor.admin_emails.is_empty() {
        "-".to_string()
    } else {
        descriptor.admin_emails.join(", ")
    };
    let table = key_value_table(
        "Identify",
        &[
            ("Repository", descriptor.repository_name),
            ("Base URL", descriptor.base_url),
            ("Protocol", descriptor.protocol_version),
            ("Granularity", descriptor.granularity),
            (
                "Earliest datestamp",
                descriptor.earliest_datestamp.unwrap_or_else(|| "-".to_string()),
            ),
            (
                "Deleted records",
                descriptor.deleted_record_policy.as_str().to_string(),
            ),
            ("Compression", descriptor.compression.join(", ")),
            ("Admin email", emails),
        ],
    );
    println!("{table}");
    Ok(ExitCode::SUCCESS)
}
