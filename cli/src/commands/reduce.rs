//! Reduce command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tally_shared::protocol::capture::Capture;
use tally_shared::QueryReport;
use tracing::info;

use crate::output;

#[derive(Args, Debug)]
pub struct ReduceArgs {
    /// Capture file holding a read-back result slot
    pub capture: PathBuf,

    /// Also write the report as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

pub fn run(args: ReduceArgs, config_path: Option<&Path>) -> Result<()> {
    let capture = Capture::read_from(&args.capture)?;
    let (device, catalog) = super::open_device(config_path)?;
    super::check_indices(&catalog, &capture.metric_indices)?;

    let pool = device
        .create_query_pool(&capture.metric_indices)
        .context("Failed to create query pool")?;

    if pool.stride() != capture.stride || pool.pass_count() != capture.pass_count {
        anyhow::bail!(
            "Capture layout ({} passes, stride {}) does not match this device ({} passes, stride {})",
            capture.pass_count,
            capture.stride,
            pool.pass_count(),
            pool.stride()
        );
    }

    let report = pool.report(&capture.data).context("Failed to compute results")?;
    if !report.available {
        output::warning("Not every pass completed; values are partial");
    }

    for value in &report.values {
        println!(
            "{:>5}  {:<26} {}",
            value.index,
            value.name,
            output::format_value(value.value, value.unit)
        );
    }

    if let Some(path) = &args.json {
        write_json(&report, path)?;
        output::success(&format!("Report written to {}", path.display()));
    }
    Ok(())
}

fn write_json(report: &QueryReport, path: &Path) -> Result<()> {
    info!("Writing JSON report: {}", path.display());

    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report).context("Failed to serialize report to JSON")?;
    Ok(())
}
