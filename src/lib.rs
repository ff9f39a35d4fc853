pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod storage;
pub mod watcher;

pub use config::AppConfig;
pub use engine::{ScanCoordinator, ScanStatistics, SystemStatus};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
