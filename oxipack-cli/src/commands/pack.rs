//! Pack command implementation.

use super::{CmdResult, GlobalOptions};
use crate::utils::{BarSink, print_stats};
use std::path::Path;

pub fn cmd_pack(
    global: &GlobalOptions,
    source: &Path,
    artifact: &Path,
    keep_existing: bool,
    json: bool,
) -> CmdResult {
    let archiver = global.archiver()?;

    if keep_existing && artifact.exists() {
        tracing::info!(artifact = %artifact.display(), "artifact exists, not regenerating");
        if !json {
            println!("Keeping existing {}", artifact.display());
        }
        return Ok(());
    }

    let mut sink = BarSink::new("packing", global.progress && !json);
    let result = archiver.pack(source, artifact, &mut sink);
    sink.finish();
    let stats = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats("Packed", &stats);
    }
    Ok(())
}
