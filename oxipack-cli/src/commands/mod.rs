//! Command implementations for OxiPack CLI.

pub mod list;
pub mod pack;
pub mod size;
pub mod unpack;

pub use list::cmd_list;
pub use pack::cmd_pack;
pub use size::cmd_size;
pub use unpack::cmd_unpack;

use oxipack_archive::{ArchiveConfig, Archiver};
use std::path::{Path, PathBuf};

/// Result type for command handlers.
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub strategy: Option<String>,
    pub level: Option<u8>,
    pub progress: bool,
}

impl GlobalOptions {
    /// Configuration file first, then command-line overrides.
    pub fn archive_config(&self) -> Result<ArchiveConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ArchiveConfig::default(),
        };
        if let Some(strategy) = &self.strategy {
            config.strategy = strategy.clone();
        }
        if let Some(level) = self.level {
            config.level = level;
        }
        Ok(config)
    }

    /// Build the archiver, rejecting bad settings before any work starts.
    pub fn archiver(&self) -> Result<Archiver, Box<dyn std::error::Error>> {
        let config = self.archive_config()?;
        tracing::debug!(?config, "archive configuration");
        Ok(Archiver::new(&config)?)
    }
}

fn load_config(path: &Path) -> Result<ArchiveConfig, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
    let config = toml::from_str(&text)
        .map_err(|e| format!("invalid config {}: {}", path.display(), e))?;
    Ok(config)
}
