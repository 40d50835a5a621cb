//! Plan command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::Path;
use tally_gpu::QueryPool;

use crate::output;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Metric indices (e.g., "0,3,5-7")
    pub indices: String,
}

pub fn run(args: PlanArgs, config_path: Option<&Path>) -> Result<()> {
    let indices = tally_shared::utils::parse_index_list(&args.indices)?;
    let (device, catalog) = super::open_device(config_path)?;
    super::check_indices(&catalog, &indices)?;

    let pool = device
        .create_query_pool(&indices)
        .context("Failed to create query pool")?;

    output::info(&format!(
        "{} metrics, {} registers, {} pass(es), stride {} bytes",
        indices.len(),
        pool.registers().len(),
        pool.pass_count(),
        pool.stride()
    ));

    let stdout = std::io::stdout();
    write_layout(&mut stdout.lock(), &pool)?;
    Ok(())
}

fn write_layout<W: Write>(out: &mut W, pool: &QueryPool) -> Result<()> {
    let schedule = pool.schedule();
    writeln!(
        out,
        "{:<6} {:>8} {:>8} {:>9} {:>4}",
        "BLOCK", "SELECT", "OFFSET", "INSTANCES", "PASS"
    )?;
    for slot in schedule.slots() {
        let pass = schedule.pass_of(&slot.reg).unwrap_or(0);
        writeln!(
            out,
            "{:<6} {:>#8x} {:>8} {:>9} {:>4}",
            slot.reg.block, slot.reg.selector, slot.offset, slot.instances, pass
        )?;
    }
    for pass in 0..schedule.pass_count() {
        writeln!(
            out,
            "{:<6} {:>8} {:>8} {:>9} {:>4}",
            "FLAG",
            "-",
            schedule.completion_flag_offset(pass),
            "-",
            pass
        )?;
    }
    Ok(())
}
