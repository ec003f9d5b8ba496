//! Netlag CLI - Command-line interface
//!
//! Samples delay distributions, probes real endpoints through the
//! interception layer and serves a local echo endpoint to probe against.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use netlag_core::tracing_setup::{CliLogLevel, LogSettings, init_tracing};

#[derive(Parser)]
#[command(name = "netlag")]
#[command(about = "Inject latency and errors into outbound HTTP calls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full debug log
    #[arg(long, default_value = "logs", global = true)]
    logs_dir: PathBuf,

    /// Hide per-call simulation messages on the console
    #[arg(long, global = true)]
    quiet_calls: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&LogSettings {
        console_level: cli.log_level.as_tracing_level(),
        logs_dir: cli.logs_dir,
        show_call_events: !cli.quiet_calls,
    })?;

    commands::handle_command(cli.command).await
}
