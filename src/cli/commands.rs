//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hostplane - declarative container stacks on the hosting control plane.
#[derive(Parser, Debug)]
#[command(name = "hostplane")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "HOSTPLANE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the provider configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the changes `apply` would send.
    Plan {
        /// Only plan this stack (defaults to every configured stack).
        #[arg(short, long)]
        stack: Option<String>,

        /// Show field-level changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Converge stacks to the configuration and wait until they run.
    Apply {
        /// Only apply this stack (defaults to every configured stack).
        #[arg(short, long)]
        stack: Option<String>,

        /// Give up after this many seconds (overrides `polling.timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the managed services of each stack.
    Status {
        /// Only show this stack (defaults to every configured stack).
        #[arg(short, long)]
        stack: Option<String>,
    },

    /// Remove managed services and volumes from stacks.
    Destroy {
        /// Only destroy this stack (defaults to every configured stack).
        #[arg(short, long)]
        stack: Option<String>,

        /// Give up after this many seconds (overrides `polling.timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Move an application installation to a version and wait until it runs.
    AppVersion {
        /// Installation identifier.
        installation: String,

        /// Version to run.
        #[arg(id = "target_version", value_name = "VERSION")]
        version: String,

        /// Give up after this many seconds (overrides `polling.timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Place an order and wait until it is executed.
    Order {
        /// Kind of order (for example `projectHosting`).
        order_type: String,

        /// Order payload as a JSON document.
        #[arg(long, default_value = "{}")]
        data: String,

        /// Give up after this many seconds (overrides `polling.timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
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

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
