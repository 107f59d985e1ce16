//! Catalog subcommand - parse a catalog without harvesting

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use oaiharvest_pmh::{Catalog, StorageKey, parse_catalog};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Catalog file to check
    pub file: PathBuf,

    /// Metadata format for lines that name none
    #[arg(short, long)]
    pub metadata_prefix: Option<String>,
}

pub fn run(args: CatalogArgs, config: &Config) -> Result<ExitCode> {
    let prefix = args
        .metadata_prefix
        .as_deref()
        .unwrap_or(&config.harvest.metadata_prefix);
    let catalog = parse_catalog(&args.file, prefix)?;

    println!("{}", targets_table(&catalog));
    for rejected in &catalog.rejected {
        eprintln!("skipped {rejected}");
    }
    eprintln!(
        "{} targets, {} lines skipped",
        catalog.targets.len(),
        catalog.rejected.len()
    );

    Ok(if catalog.rejected.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn targets_table(catalog: &Catalog) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Repository").fg(Color::Cyan),
            Cell::new("Set").fg(Color::Cyan),
            Cell::new("Prefix").fg(Color::Cyan),
            Cell::new("Output").fg(Color::Cyan),
        ]);
    for target in &catalog.targets {
        let key = StorageKey::for_target(target);
        table.add_row(vec![
            Cell::new(&target.display_name),
            Cell::new(target.set_spec.as_deref().unwrap_or("-")),
            Cell::new(&target.metadata_prefix),
            Cell::new(format!("{}/{}.xml", key.dir_name(), key.stem())),
        ]);
    }
    table
}
