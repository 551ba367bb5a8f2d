//! s3-consistency runner entry point

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use s3_consistency::config::Config;
use s3_consistency::probe::ProbeContext;
use s3_consistency::report::{CsvReport, ResultRecorder};
use s3_consistency::scenario::run_scenario;
use s3_consistency::storage::s3::S3Store;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: s3-consistency <config.yaml>");
    eprintln!();
    eprintln!("s3-consistency - measure read-after-write consistency of an S3-compatible store");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  s3-consistency ./consistency.yaml");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("s3-consistency starting");
    info!("Loaded configuration from {:?}", config_path);

    // Stop between scenarios on Ctrl+C; a running validation finishes its rounds
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping after the current scenario");
        r.store(false, Ordering::SeqCst);
    })?;

    let store = S3Store::new(&config.storage).await?;
    let ctx = ProbeContext::new(Arc::new(store)).with_timeout(config.storage.request_timeout);

    let report = config.report.as_ref().map(|r| CsvReport::new(&r.path));
    if let Some(report) = &report {
        info!("Appending results to {:?}", report.path());
    }
    let recorder = report.as_ref().map(|r| r as &dyn ResultRecorder);

    let profile = config.storage.profile_label();
    let mut failed = Vec::new();

    for scenario in &config.scenarios {
        if !running.load(Ordering::SeqCst) {
            warn!("Skipping scenario {} after shutdown signal", scenario.name);
            continue;
        }

        match run_scenario(&ctx, scenario, &profile, recorder).await {
            Ok(outcome) if outcome.succeeded() => {
                info!("Scenario {} consistent", scenario.name);
            }
            Ok(_) => {
                error!("Scenario {} did not reach consistency", scenario.name);
                failed.push(scenario.name.clone());
            }
            Err(e) => {
                error!("Scenario {} aborted: {}", scenario.name, e);
                failed.push(scenario.name.clone());
            }
        }
    }

    if !failed.is_empty() {
        error!("{} scenario(s) failed: {}", failed.len(), failed.join(", "));
        std::process::exit(1);
    }

    info!("All scenarios consistent, exiting");
    Ok(())
}
