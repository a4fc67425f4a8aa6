//! Sendify CLI - send HTTP requests through the sendify client pipeline
//!
//! This is the main entry point for the `sendify` binary. Configuration is
//! read from a TOML file and the environment, then overridden by flags.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;

use cli::{Cli, Commands};
use error::Result;
use handlers::OutputOptions;
use logging::LoggingConfig;
use std::process;
use tracing::instrument;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Initialize logging
    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => {
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}", error::format_error(&e));

            if e.should_show_help() {
                eprintln!("\nFor more information, try '--help'");
            }

            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
#[instrument(skip(cli), fields(command = ?cli.command))]
async fn run(cli: Cli) -> Result<()> {
    tracing::debug!("Loading configuration");
    let config = config::load_with_file(cli.config.as_deref())?;

    let options = OutputOptions {
        quiet: cli.quiet,
        verbosity: cli.verbosity_level(),
    };

    match cli.command {
        Commands::Request(args) => handlers::handle_request(args, config, options).await,
    }
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<()> {
    // Create logging configuration from CLI args and environment
    let mut logging_config = LoggingConfig::from_verbosity(cli.verbosity_level());

    // Apply environment overrides
    logging_config.merge_with_env();

    // If quiet mode, only log errors
    if cli.quiet {
        logging_config.level = "error".to_string();
        logging_config.console = false;
    }

    logging::init_logging(logging_config)
}
