//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sendify CLI - issue HTTP requests with retries and rate limiting
///
/// Sends one request through the sendify client pipeline and prints the
/// status line and body. The exit code reflects how the request failed.
#[derive(Parser, Debug)]
#[command(
    name = "sendify",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "SENDIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single HTTP request
    Request(RequestArgs),
}

/// Arguments for the request command
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// Request path, joined onto the base URL
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Base URL (overrides the config file and SENDIFY_BASE_URL)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header, may be repeated
    #[arg(short = 'H', long = "header", value_name = "'K: V'")]
    pub headers: Vec<String>,

    /// Query parameter, may be repeated
    #[arg(short = 'q', long = "query", value_name = "K=V")]
    pub query: Vec<String>,

    /// Request body
    #[arg(short = 'd', long = "data", value_name = "BODY")]
    pub data: Option<String>,

    /// Send the body as JSON and pretty-print a JSON response
    #[arg(long)]
    pub json: bool,

    /// Total attempts, including the first
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Client-side rate limit
    #[arg(long, value_name = "N/SECS")]
    pub rate_limit: Option<String>,

    /// Timeout for the whole request, retries included
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
