// CLI modules
mod args;
mod keyring;
mod op;
mod ops;
mod provider;
mod state;
mod version;

use std::str::FromStr;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Get, Init, IsStored, Key, RecoveryKey, Store, Version};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

command_enum! {
    (Init, Init),
    (Key, Key),
    (Store, Store),
    (Get, Get),
    (IsStored, IsStored),
    (RecoveryKey, RecoveryKey),
    (Version, Version),
}

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Log to stderr so command output on stdout stays clean
fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = Level::from_str(level)
        .map_err(|_| anyhow::anyhow!("invalid log level: {}", level))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = op::OpContext::new(args.config_path);

    // an uninitialized directory is fine here, `init` has not run yet
    let configured_level = ctx.state().ok().map(|state| state.config.log_level);
    let log_level = args
        .log_level
        .or(configured_level)
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    if let Err(e) = init_logging(&log_level) {
        eprintln!("Error: Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
