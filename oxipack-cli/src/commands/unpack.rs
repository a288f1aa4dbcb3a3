//! Unpack command implementation.

use super::{CmdResult, GlobalOptions};
use crate::utils::{BarSink, print_stats};
use oxipack_archive::UnpackOptions;
use std::path::Path;

pub fn cmd_unpack(
    global: &GlobalOptions,
    artifact: &Path,
    dest: &Path,
    optional: bool,
    remove_artifact: bool,
    json: bool,
) -> CmdResult {
    let archiver = global.archiver()?;

    if optional && !artifact.exists() {
        tracing::info!(artifact = %artifact.display(), "optional artifact absent, skipping");
        if !json {
            println!("Skipping {}: not present", artifact.display());
        }
        return Ok(());
    }

    let options = UnpackOptions { remove_artifact };
    let mut sink = BarSink::new("unpacking", global.progress && !json);
    let result = archiver.unpack_with(artifact, dest, &mut sink, &options);
    sink.finish();
    let stats = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats("Unpacked", &stats);
    }
    Ok(())
}
