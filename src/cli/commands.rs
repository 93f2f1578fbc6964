//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ENV_SCRATCH_DIR;

/// nodestate - Desired-state enforcement for a single filesystem node.
#[derive(Parser, Debug)]
#[command(name = "nodestate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format on stderr (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Directory where replaced nodes are retained.
    #[arg(long, global = true, env = ENV_SCRATCH_DIR)]
    pub scratch_dir: Option<PathBuf>,

    /// Delete replaced nodes instead of retaining them (not undoable).
    #[arg(long, global = true)]
    pub no_retain: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the steps needed to reach the manifest's state.
    Plan {
        /// Path to the YAML manifest.
        manifest: PathBuf,
    },

    /// Apply the manifest's state.
    Apply {
        /// Path to the YAML manifest.
        manifest: PathBuf,

        /// Write the undo log to this file.
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Undo a transaction from its undo log.
    ///
    /// The log is rewritten as a redo log on success.
    Undo {
        /// Undo log written by `apply` or `redo`.
        #[arg(short, long)]
        log: PathBuf,
    },

    /// Redo an undone transaction from its redo log.
    ///
    /// The log is rewritten as an undo log on success.
    Redo {
        /// Redo log written by `undo`.
        #[arg(short, long)]
        log: PathBuf,
    },

    /// Show the observed state of a path.
    Probe {
        /// Absolute path to inspect.
        path: PathBuf,

        /// Follow a symlink at the path.
        #[arg(long)]
        follow_symlinks: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_with_log() {
        let cli = Cli::try_parse_from([
            "nodestate",
            "--output",
            "json",
            "apply",
            "node.yaml",
            "--log",
            "undo.json",
        ])
        .expect("parse failed");

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Apply { manifest, log } => {
                assert_eq!(manifest, PathBuf::from("node.yaml"));
                assert_eq!(log, Some(PathBuf::from("undo.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_undo_requires_log() {
        assert!(Cli::try_parse_from(["nodestate", "undo"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nodestate", "probe", "/tmp", "--no-retain", "-v"])
            .expect("parse failed");
        assert!(cli.verbose);
        assert!(cli.no_retain);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_log_format_is_independent_of_output() {
        let cli = Cli::try_parse_from(["nodestate", "plan", "node.yaml", "--log-format", "json"])
            .expect("parse failed");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.output, OutputFormat::Text);

        assert!(Cli::try_parse_from(["nodestate", "--log-format", "xml", "plan", "node.yaml"]).is_err());
    }
}
