mod commands;
mod logging;

use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ScanArgs, WatchArgs};
use crossbeam_channel::bounded;
use dotenv::dotenv;
use live_duper::analysis::SweepResult;
use live_duper::scanner::ScanResult;
use live_duper::storage::SqliteStore;
use live_duper::{AppConfig, ProgressReporter, ScanCoordinator};
use tracing::{error, info};

/// Console summaries for finished scans and sweeps.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_scan_complete(&self, result: &ScanResult) {
        let roots: Vec<String> = result.roots.iter().map(|r| r.display().to_string()).collect();
        match &result.error {
            None => eprintln!(
                "  {} Scan of {} complete: {} processed, {} skipped in {}",
                "✓".green(),
                roots.join(", "),
                format!("{}", result.processed).green(),
                format!("{}", result.skipped).yellow(),
                format!("{:.2}s", result.duration.as_secs_f64()).green(),
            ),
            Some(err) => eprintln!(
                "  {} Scan of {} failed: {}",
                "✗".red(),
                roots.join(", "),
                err.red()
            ),
        }
    }

    fn on_sweep_complete(&self, result: &SweepResult) {
        if result.groups == 0 {
            return;
        }
        eprintln!(
            "  {} Sweep: {} groups, {} duplicates, {} deleted, {} bytes freed",
            "✓".green(),
            format!("{}", result.groups).cyan(),
            format!("{}", result.duplicates).red(),
            format!("{}", result.deleted).red(),
            format!("{}", result.bytes_freed).red(),
        );
    }
}

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match live_duper::config::load_configuration_from(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let outcome = match args.command {
        Some(Commands::Scan(scan_args)) => run_scan(config, scan_args),
        Some(Commands::Watch(watch_args)) => run_watch(config, watch_args),
        Some(Commands::Sweep) => run_sweep(config),
        Some(Commands::Stats) => run_stats(config),
        Some(Commands::PrintConfig) => print_config(config),
        Some(Commands::TruncateDb) => truncate_db(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_coordinator(config: AppConfig) -> anyhow::Result<ScanCoordinator> {
    config.validate()?;
    let store = Arc::new(
        SqliteStore::open(&config.database.path)
            .with_context(|| format!("opening database {}", config.database.path))?,
    );
    Ok(ScanCoordinator::with_reporter(
        config,
        store,
        Arc::new(ConsoleReporter),
    )?)
}

fn run_scan(config: AppConfig, args: ScanArgs) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;
    let result = scan(&coordinator, args.path.as_deref())?;
    coordinator.flush();

    if args.sweep {
        coordinator.detect_duplicates()?;
    }
    print_summary(&coordinator)?;
    coordinator.shutdown();

    if let Some(err) = result.error {
        bail!("scan finished with errors: {}", err);
    }
    Ok(())
}

fn run_watch(config: AppConfig, args: WatchArgs) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;

    if !args.no_scan {
        scan(&coordinator, args.path.as_deref())?;
    }

    let watched = match &args.path {
        Some(path) => {
            coordinator.watch_path(path)?;
            1
        }
        None => coordinator.watch_all()?,
    };
    coordinator.start_scheduled_sweeps()?;
    info!(
        "Watching {} root(s); press {} to stop",
        format!("{}", watched).cyan(),
        "Ctrl-C".yellow()
    );

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;
    let _ = stop_rx.recv();

    coordinator.shutdown();
    print_summary(&coordinator)?;
    Ok(())
}

fn run_sweep(config: AppConfig) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;
    let result = coordinator.detect_duplicates()?;
    info!(
        "Sweep finished in {}",
        format!("{:.2}s", result.duration.as_secs_f64()).green()
    );
    coordinator.shutdown();
    Ok(())
}

fn run_stats(config: AppConfig) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;
    let status = coordinator.status()?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    coordinator.shutdown();
    Ok(())
}

fn print_config(config: AppConfig) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn truncate_db(config: &AppConfig) -> anyhow::Result<()> {
    let confirmed = prompt_confirm(
        "Are you SURE you want to COMPLETELY DELETE the Database?",
        Some(false),
    )?;
    if !confirmed {
        return Ok(());
    }
    let db = live_duper::storage::Database::open(&config.database.path)?;
    db.truncate_all()?;
    println!("All records deleted");
    Ok(())
}

fn scan(coordinator: &ScanCoordinator, path: Option<&Path>) -> anyhow::Result<ScanResult> {
    let result = match path {
        Some(path) => coordinator.scan_path(path)?.wait(),
        None => coordinator.scan_all()?,
    };
    Ok(result)
}

fn print_summary(coordinator: &ScanCoordinator) -> anyhow::Result<()> {
    let stats = coordinator.statistics();
    let dupes = coordinator.duplicate_statistics()?;
    info!(
        "Processed: {}, skipped: {}, persisted: {}, dropped: {}",
        format!("{}", stats.total_processed).green(),
        format!("{}", stats.total_skipped).yellow(),
        format!("{}", stats.persisted).green(),
        format!("{}", stats.dropped).red(),
    );
    info!(
        "{} files indexed, {} duplicate groups, {} bytes reclaimable, {} bytes reclaimed",
        format!("{}", dupes.total_files).cyan(),
        format!("{}", dupes.duplicate_hash_groups).red(),
        format!("{}", dupes.potential_savings).red(),
        format!("{}", dupes.space_reclaimed).green(),
    );
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
