use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "live-duper")]
#[command(about = "Continuously index files and remove duplicate content", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./Config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory, or every configured root, and wait for it to finish
    Scan(ScanArgs),
    /// Scan, then watch the roots for changes until interrupted
    Watch(WatchArgs),
    /// Run one duplicate sweep over the whole index
    Sweep,
    /// Print scanner, duplicate and filter statistics as JSON
    Stats,
    /// Print the effective configuration as TOML
    PrintConfig,
    /// Delete every indexed record
    TruncateDb,
}

#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    /// Directory to scan instead of the configured roots
    pub path: Option<PathBuf>,

    /// Run a duplicate sweep once the scan completes
    #[arg(long)]
    pub sweep: bool,
}

#[derive(Debug, clap::Args)]
pub struct WatchArgs {
    /// Directory to watch instead of the configured roots
    pub path: Option<PathBuf>,

    /// Skip the initial full scan
    #[arg(long)]
    pub no_scan: bool,
}
