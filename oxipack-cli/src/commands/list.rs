//! List command implementation.

use super::{CmdResult, GlobalOptions};
use crate::utils::print_entries;
use oxipack_archive::EntrySummary;
use serde::Serialize;
use std::path::Path;

/// JSON output for an artifact listing.
#[derive(Debug, Serialize)]
struct ArtifactListJson<'a> {
    artifact: String,
    strategy: &'static str,
    entries: &'a [EntrySummary],
}

pub fn cmd_list(global: &GlobalOptions, artifact: &Path, json: bool) -> CmdResult {
    let archiver = global.archiver()?;
    let entries = archiver.list(artifact)?;

    if json {
        let listing = ArtifactListJson {
            artifact: artifact.display().to_string(),
            strategy: archiver.strategy().tag(),
            entries: &entries,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Artifact: {}", artifact.display());
    println!();
    print_entries(&entries);
    Ok(())
}
