//! List command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::Path;
use tally_shared::MetricInfo;

use crate::output;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print the catalog as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ListArgs, config_path: Option<&Path>) -> Result<()> {
    let (_device, catalog) = super::open_device(config_path)?;
    let infos = catalog.infos().context("Failed to describe metrics")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &infos).context("Failed to serialize catalog")?;
        writeln!(out)?;
        return Ok(());
    }

    output::header(&format!(
        "{} metrics for {}",
        infos.len(),
        catalog.gfx_level()
    ));
    write_table(&mut out, &infos)?;
    Ok(())
}

fn write_table<W: Write>(out: &mut W, infos: &[MetricInfo]) -> Result<()> {
    writeln!(
        out,
        "{:>5}  {:<26} {:<20} {:<10} DESCRIPTION",
        "INDEX", "NAME", "CATEGORY", "UNIT"
    )?;
    for info in infos {
        writeln!(
            out,
            "{:>5}  {:<26} {:<20} {:<10} {}",
            info.index, info.name, info.category, info.unit, info.description
        )?;
    }
    Ok(())
}
