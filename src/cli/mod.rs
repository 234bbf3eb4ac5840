//! CLI module for the hostplane tool.
//!
//! This module provides the command-line interface for planning and
//! converging container stacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
