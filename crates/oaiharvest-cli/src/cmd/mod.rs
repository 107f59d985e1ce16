//! Subcommands

pub mod catalog;
pub mod harvest;
pub mod identify;

use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

/// Two-column table with a cyan header, as every subcommand prints it
pub(crate) fn key_value_table(title: &str, rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    table
}

pub fn print_config(config: &Config, request_timeout: Duration) {
    let http = config.http.to_http_config(Some(request_timeout.as_secs()));
    let table = key_value_table(
        "Setting",
        &[
            ("Output directory", config.output.dir.display().to_string()),
            (
                "Run summary",
                if config.output.summary { "written" } else { "off" }.to_string(),
            ),
            (
                "Concurrency",
                format!("{} (max: {})", config.workers.concurrency, config.workers.max),
            ),
            ("Max passes", config.harvest.max_passes.to_string()),
            ("Requeue pause", format!("{}s", config.harvest.requeue_pause)),
            (
                "Requeue timeout",
                config
                    .harvest
                    .requeue_timeout
                    .map_or_else(|| "none".to_string(), |s| format!("{s}s")),
            ),
            ("Metadata prefix", config.harvest.metadata_prefix.clone()),
            ("Connect timeout", format!("{}s", config.http.connect_timeout)),
            ("Request timeout", format!("{}s", request_timeout.as_secs())),
            ("User agent", http.user_agent),
        ],
    );
    eprintln!("\n{table}");
}
