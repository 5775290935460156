// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flakeloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flakeloop",
    version,
    about = "Run a test command over and over until it fails.",
    long_about = None
)]
pub struct CliArgs {
    /// Regular expression selecting tests by full name.
    ///
    /// Passed to the test runner anchored as `^FILTER$`. Omit to run all
    /// tests.
    #[arg(value_name = "FILTER")]
    pub filter: Option<String>,

    /// Path to a config file (TOML).
    ///
    /// Default: `flakeloop.toml` in the current directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Per-round time budget, e.g. `30s` or `2m`.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Where to publish the last completed round's output.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Print every internal step of each round.
    #[arg(short, long)]
    pub verbose: bool,

    /// Diagnostic logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLAKELOOP_LOG` or `warn` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the resolved command and settings without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
