// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod filter;
pub mod logging;
pub mod markers;
pub mod report;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{Settings, parse_duration};
use crate::engine::RoundDriver;
use crate::errors::{FlakeError, Result};
use crate::exec::ProcessRoundExecutor;
use crate::exec::persist::swap_path;
use crate::filter::TestFilter;
use crate::markers::Matcher;
use crate::report::{ConsoleReporter, Reporter};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - filter and settings resolution
/// - the process-backed round executor
/// - the round driver
/// - Ctrl-C handling
///
/// Returns only when a round fails (or on a usage/config error).
pub async fn run(args: CliArgs) -> Result<()> {
    let filter = TestFilter::new(args.filter.clone().unwrap_or_default())?;
    let settings = resolve_settings(&args)?;

    if args.dry_run {
        print_dry_run(&settings, &filter);
        return Ok(());
    }

    info!(
        command = %settings.command.display(&filter),
        log = %settings.log_path.display(),
        timeout_ms = settings.round_timeout.as_millis() as u64,
        "starting flakeloop"
    );

    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::verbose(args.verbose));
    let executor = ProcessRoundExecutor::new(&settings, Arc::clone(&reporter));
    let mut driver = RoundDriver::new(executor, reporter, filter, settings.round_timeout);

    // Ctrl-C → interrupt the current round and stop.
    {
        let shutdown = driver.shutdown_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            debug!("Ctrl+C received");
            shutdown.cancel();
        });
    }

    let failure = driver.run().await;
    Err(FlakeError::Round(failure))
}

/// Config file (or defaults) with CLI overrides applied.
pub fn resolve_settings(args: &CliArgs) -> Result<Settings> {
    let mut settings = config::resolve(args.config.as_deref())?;

    if let Some(ref raw) = args.timeout {
        let timeout = parse_duration(raw)
            .map_err(|e| FlakeError::Usage(format!("invalid --timeout: {e}")))?;
        if timeout.is_zero() {
            return Err(FlakeError::Usage(
                "--timeout must be greater than zero".to_string(),
            ));
        }
        settings.round_timeout = timeout;
    }

    if let Some(ref path) = args.log_file {
        if path.file_name().is_none() {
            return Err(FlakeError::Usage(format!(
                "--log-file must name a file (got {})",
                path.display()
            )));
        }
        settings.log_path = path.clone();
    }

    Ok(settings)
}

fn print_dry_run(settings: &Settings, filter: &TestFilter) {
    println!("flakeloop dry-run");
    println!("  filter: {filter}");
    println!("  command: {}", settings.command.display(filter));
    if let Some(dir) = settings.command.working_dir_path() {
        println!("  working_dir: {}", dir.display());
    }
    println!("  round timeout: {:?}", settings.round_timeout);
    println!("  drain grace: {:?}", settings.drain_grace);
    println!("  kill grace: {:?}", settings.kill_grace);
    println!("  log: {}", settings.log_path.display());
    println!("  swap: {}", swap_path(&settings.log_path).display());
    println!();

    println!("markers ({}):", settings.markers.len());
    for marker in settings.markers.iter() {
        let matcher = match &marker.matcher {
            Matcher::Contains(s) => format!("contains {s:?}"),
            Matcher::Regex(re) => format!("regex {:?}", re.as_str()),
        };
        match &marker.announce {
            Some(text) => println!("  - {}: {matcher} -> {text:?}", marker.label),
            None => println!("  - {}: {matcher}", marker.label),
        }
    }
}
