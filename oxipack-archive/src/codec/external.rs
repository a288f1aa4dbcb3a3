//! External compressor tool (7-Zip by default).
//!
//! The tool is run once per operation with an argument template in which
//! `{archive}`, `{source}` and `{dest}` are replaced by paths. Its exit status
//! decides success; stdout and stderr are captured and attached to the error
//! when it fails.

use super::DirectoryCompressor;
use crate::config::ExternalToolConfig;
use oxipack_core::error::{ArchiveError, Result};
use std::io;
use std::path::Path;
use std::process::{Command, Output};

/// A compressor that shells out to an external program.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: String,
    compress_args: Vec<String>,
    extract_args: Vec<String>,
}

/// Paths substituted into an argument template.
struct Placeholders<'a> {
    archive: &'a Path,
    source: Option<&'a Path>,
    dest: Option<&'a Path>,
}

fn path_str<'a>(path: &'a Path, what: &str) -> Result<&'a str> {
    path.to_str().ok_or_else(|| {
        ArchiveError::encoding(format!(
            "{} path is not valid UTF-8: {}",
            what,
            path.display()
        ))
    })
}

impl Placeholders<'_> {
    fn expand(&self, template: &str) -> Result<String> {
        let mut arg = template.replace("{archive}", path_str(self.archive, "archive")?);
        if let Some(source) = self.source {
            arg = arg.replace("{source}", path_str(source, "source")?);
        }
        if let Some(dest) = self.dest {
            arg = arg.replace("{dest}", path_str(dest, "destination")?);
        }
        Ok(arg)
    }
}

impl ExternalTool {
    /// Create a tool from its configuration.
    ///
    /// Fails with [`ArchiveError::Configuration`] if the program is empty or a
    /// template lacks the placeholders it needs.
    pub fn new(config: &ExternalToolConfig) -> Result<Self> {
        if config.program.trim().is_empty() {
            return Err(ArchiveError::configuration("external tool program is empty"));
        }
        require_placeholders(&config.compress_args, &["{archive}", "{source}"], "compress_args")?;
        require_placeholders(&config.extract_args, &["{archive}", "{dest}"], "extract_args")?;

        Ok(Self {
            program: config.program.clone(),
            compress_args: config.compress_args.clone(),
            extract_args: config.extract_args.clone(),
        })
    }

    /// Program that will be run.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, template: &[String], paths: Placeholders<'_>) -> Result<Output> {
        let args = template
            .iter()
            .map(|t| paths.expand(t))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(program = %self.program, ?args, "running external compressor");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ArchiveError::configuration(format!(
                    "external compressor '{}' not found",
                    self.program
                )),
                _ => ArchiveError::Io(e),
            })?;

        if !output.status.success() {
            return Err(ArchiveError::Io(io::Error::other(format!(
                "'{}' failed with {}\nstdout:\n{}\nstderr:\n{}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stdout).trim_end(),
                String::from_utf8_lossy(&output.stderr).trim_end(),
            ))));
        }

        Ok(output)
    }
}

fn require_placeholders(args: &[String], required: &[&str], field: &str) -> Result<()> {
    for placeholder in required {
        if !args.iter().any(|a| a.contains(placeholder)) {
            return Err(ArchiveError::configuration(format!(
                "external tool {} must contain {}",
                field, placeholder
            )));
        }
    }
    Ok(())
}

impl DirectoryCompressor for ExternalTool {
    fn name(&self) -> &str {
        &self.program
    }

    fn compress_dir(&self, source: &Path, artifact: &Path) -> Result<()> {
        self.run(
            &self.compress_args,
            Placeholders {
                archive: artifact,
                source: Some(source),
                dest: None,
            },
        )?;
        if !artifact.is_file() {
            return Err(ArchiveError::Io(io::Error::other(format!(
                "'{}' succeeded but did not create {}",
                self.program,
                artifact.display()
            ))));
        }
        Ok(())
    }

    fn decompress_dir(&self, artifact: &Path, dest: &Path) -> Result<()> {
        self.run(
            &self.extract_args,
            Placeholders {
                archive: artifact,
                source: None,
                dest: Some(dest),
            },
        )?;
        Ok(())
    }
}
