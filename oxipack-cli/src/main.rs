//! OxiPack CLI - directory trees in one compressed file
//!
//! Packs a directory into an artifact and unpacks it again, the way an
//! installer ships and restores its payload.

mod commands;
mod utils;

use clap::{ArgAction, Parser, Subcommand};
use commands::{GlobalOptions, cmd_list, cmd_pack, cmd_size, cmd_unpack};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "oxipack")]
#[command(
    author,
    version,
    about = "Pack directory trees into LZMA artifacts and unpack them"
)]
#[command(long_about = "
OxiPack stores a whole directory tree in a single compressed artifact and
restores it byte for byte.

Examples:
  oxipack pack dist app.COMPRESSED
  oxipack unpack app.COMPRESSED /opt/app
  oxipack list app.COMPRESSED --json
  oxipack size dist --name APP
  oxipack --strategy 7z pack dist app.7z
")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Strategy tag (lzma, in-process, managed, external, 7z)
    #[arg(short, long, global = true)]
    strategy: Option<String>,

    /// LZMA level 0-9
    #[arg(short = 'L', long, global = true, value_parser = clap::value_parser!(u8).range(0..=9))]
    level: Option<u8>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pack a directory into an artifact
    #[command(alias = "p")]
    Pack {
        /// Directory to pack
        source: PathBuf,

        /// Artifact to create
        artifact: PathBuf,

        /// Leave an existing artifact alone instead of regenerating it
        #[arg(long)]
        keep_existing: bool,

        /// Print statistics as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Unpack an artifact into a directory, replacing its contents
    #[command(alias = "x")]
    Unpack {
        /// Artifact to unpack
        artifact: PathBuf,

        /// Destination directory
        dest: PathBuf,

        /// Succeed without doing anything if the artifact does not exist
        #[arg(long)]
        optional: bool,

        /// Delete the artifact after a successful unpack
        #[arg(long)]
        remove_artifact: bool,

        /// Print statistics as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the entries of an artifact
    #[command(alias = "l")]
    List {
        /// Artifact to list
        artifact: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Count the files and bytes a pack would record
    Size {
        /// Directory to measure
        source: PathBuf,

        /// Print as NAME_SIZE=<bytes>
        #[arg(short, long)]
        name: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let env_filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!("parsed arguments: {:?}", cli);

    let global = GlobalOptions {
        config: cli.config,
        strategy: cli.strategy,
        level: cli.level,
        progress: !cli.quiet,
    };

    let result = match cli.command {
        Commands::Pack {
            source,
            artifact,
            keep_existing,
            json,
        } => cmd_pack(&global, &source, &artifact, keep_existing, json),
        Commands::Unpack {
            artifact,
            dest,
            optional,
            remove_artifact,
            json,
        } => cmd_unpack(&global, &artifact, &dest, optional, remove_artifact, json),
        Commands::List { artifact, json } => cmd_list(&global, &artifact, json),
        Commands::Size { source, name, json } => cmd_size(&source, name.as_deref(), json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "oxipack", "pack", "dist", "out.pack", "--strategy", "7z", "-L", "9", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.strategy.as_deref(), Some("7z"));
        assert_eq!(cli.level, Some(9));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Pack { keep_existing: false, .. }));
    }

    #[test]
    fn test_level_out_of_range() {
        assert!(Cli::try_parse_from(["oxipack", "-L", "12", "size", "dist"]).is_err());
    }

    #[test]
    fn test_unpack_flags() {
        let cli = Cli::try_parse_from([
            "oxipack",
            "unpack",
            "app.COMPRESSED",
            "/opt/app",
            "--optional",
            "--remove-artifact",
        ])
        .unwrap();
        match cli.command {
            Commands::Unpack {
                optional,
                remove_artifact,
                json,
                ..
            } => {
                assert!(optional);
                assert!(remove_artifact);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
