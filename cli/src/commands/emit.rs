//! Emit command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::Path;
use tally_gpu::cmdstream::parse_packets;

use crate::output;

#[derive(Args, Debug)]
pub struct EmitArgs {
    /// Metric indices (e.g., "0,3,5-7")
    pub indices: String,

    /// GPU address of the query's result slot
    #[arg(long, default_value = "0x200000000", value_parser = tally_shared::utils::parse_address)]
    pub va: u64,

    /// Also dump each pass's lock and unlock streams
    #[arg(long)]
    pub pass_preambles: bool,
}

pub fn run(args: EmitArgs, config_path: Option<&Path>) -> Result<()> {
    let indices = tally_shared::utils::parse_index_list(&args.indices)?;
    let (device, catalog) = super::open_device(config_path)?;
    super::check_indices(&catalog, &indices)?;

    let pool = device
        .create_query_pool(&indices)
        .context("Failed to create query pool")?;

    let mut begin = device.new_stream();
    pool.begin(&mut begin, args.va)
        .context("Failed to record query begin")?;
    let mut end = device.new_stream();
    pool.end(&mut end, args.va)
        .context("Failed to record query end")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_packets(&mut out, "begin", begin.dwords())?;
    write_packets(&mut out, "end", end.dwords())?;

    if args.pass_preambles {
        for pass in 0..pool.pass_count() {
            let streams = device
                .pass_streams(pass)
                .with_context(|| format!("No lock stream cached for pass {}", pass))?;
            write_packets(&mut out, &format!("lock pass {}", pass), &streams.lock)?;
            write_packets(&mut out, &format!("unlock pass {}", pass), &streams.unlock)?;
        }
    }

    output::success(&format!(
        "Recorded {} + {} dwords for {} pass(es)",
        begin.len(),
        end.len(),
        pool.pass_count()
    ));
    Ok(())
}

/// Dump a stream one packet per line: offset, name, header and body dwords
fn write_packets<W: Write>(out: &mut W, title: &str, dwords: &[u32]) -> Result<()> {
    writeln!(out, "# {} ({} dwords)", title, dwords.len())?;
    let mut offset = 0;
    for packet in parse_packets(dwords) {
        let body: Vec<String> = packet.body.iter().map(|d| format!("{:08x}", d)).collect();
        writeln!(
            out,
            "{:04x}  {:<16} {:08x} {}",
            offset,
            packet.name(),
            dwords[offset],
            body.join(" ")
        )?;
        offset += packet.body.len() + 1;
    }
    if offset != dwords.len() {
        writeln!(out, "{:04x}  <{} undecoded dwords>", offset, dwords.len() - offset)?;
    }
    Ok(())
}
