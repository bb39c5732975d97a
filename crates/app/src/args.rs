pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ssss")]
#[command(about = "Store secrets encrypted in account data and manage the keys that protect them")]
pub struct Args {
    /// Path to the ssss state directory (defaults to ~/.ssss)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level, overriding the configured one (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
