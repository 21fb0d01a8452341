//! Fedgate CLI - entrypoint for the connector server

mod commands;

use clap::{Parser, Subcommand};
use commands::ServeCommand;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FEDGATE_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the connector server
    Serve(ServeCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Serve(cmd) => cmd.run(),
    }
}

/// If RUST_LOG is set, use it directly; otherwise default all fedgate
/// crates to the requested level and quiet the noisy dependencies.
fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "fedgate_cli={level},\
             fedgate_server={level},\
             fedgate_streaming={level},\
             fedgate_rdbms={level},\
             fedgate_paging={level},\
             fedgate_clickhouse={level},\
             fedgate_postgres={level},\
             fedgate_core={level},\
             hyper=warn,\
             h2=warn,\
             tower=warn,\
             reqwest=warn",
            level = level
        ))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    Ok(())
}
