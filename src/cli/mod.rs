//! CLI module for the nodestate tool.
//!
//! This module provides the command-line interface for planning, applying,
//! undoing and redoing changes to a single filesystem node.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
