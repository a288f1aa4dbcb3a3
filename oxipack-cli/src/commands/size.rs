//! Size command implementation.

use super::CmdResult;
use oxipack_archive::{DirectorySize, measure};
use std::path::Path;

/// `NAME_SIZE=<bytes>` line consumed by installer builds.
fn size_property(name: &str, size: &DirectorySize) -> String {
    format!("{}_SIZE={}", name.to_ascii_uppercase(), size.bytes)
}

pub fn cmd_size(source: &Path, name: Option<&str>, json: bool) -> CmdResult {
    let size = measure(source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&size)?);
    } else if let Some(name) = name {
        println!("{}", size_property(name, &size));
    } else {
        println!("{} files, {} bytes", size.files, size.bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_property() {
        let size = DirectorySize {
            files: 3,
            bytes: 1024,
        };
        assert_eq!(size_property("app", &size), "APP_SIZE=1024");
    }
}
