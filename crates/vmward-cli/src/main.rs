//! `vmward` -- agent-facing VM control over MCP.
//!
//! Provides the following subcommands:
//!
//! - `vmward serve` -- Serve the VM tools over stdio (JSON-RPC, one message per line).
//! - `vmward status` -- Show balance, runway and tracked VMs.
//! - `vmward config` -- Inspect the resolved settings.

use clap::{Parser, Subcommand};

mod commands;

/// vmward VM lifecycle tools for agents.
#[derive(Parser)]
#[command(
    name = "vmward",
    about = "VM lifecycle tools for agents on a decentralized compute network",
    version
)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the VM tools to an agent over stdin/stdout.
    Serve(commands::serve::ServeArgs),

    /// Show balance, runway and tracked VMs.
    Status(commands::status::StatusArgs),

    /// Inspect the resolved settings.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

/// Subcommands for `vmward config`.
#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the full resolved settings as JSON.
    Show,

    /// Show a single setting by field name.
    Get {
        /// Field name (e.g., "ledger_path", "cost_threshold").
        name: String,
    },

    /// List the environment variables read at startup.
    Vars,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries protocol traffic in `serve`, so logs go to stderr.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await?,
        Commands::Status(args) => commands::status::run(args).await?,
        Commands::Config { action } => match action {
            ConfigCmd::Show => {
                let settings = commands::load_settings()?;
                commands::config_cmd::config_show(&settings);
            }
            ConfigCmd::Get { name } => {
                let settings = commands::load_settings()?;
                if !commands::config_cmd::config_get(&settings, &name) {
                    std::process::exit(1);
                }
            }
            ConfigCmd::Vars => commands::config_cmd::config_vars(),
        },
    }

    Ok(())
}
