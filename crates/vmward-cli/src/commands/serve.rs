//! `vmward serve` -- serve the VM tools over stdio.
//!
//! Reads JSON-RPC requests from stdin, one per line, and writes responses
//! to stdout. Logs go to stderr so they never interleave with protocol
//! traffic.
//!
//! # Lifecycle
//!
//! ```text
//! 1. Load settings, signer identity and gateway client
//! 2. Build the orchestrator and a fresh session
//! 3. Build the middleware pipeline (allowlist when read-only, audit)
//! 4. Run McpServerShell on stdin/stdout until EOF
//! ```

use std::sync::Arc;

use clap::Args;
use tracing::info;

use vmward_core::Session;
use vmward_services::VmToolProvider;
use vmward_services::mcp::middleware::ToolAllowlist;
use vmward_services::mcp::{AuditLog, McpServerShell, Middleware, ToolProvider};
use vmward_services::tools::READ_ONLY_TOOLS;

use super::{build_orchestrator, load_settings};

/// Arguments for the `vmward serve` subcommand.
#[derive(Args)]
pub struct ServeArgs {
    /// Expose only tools that never spend credits or change state.
    #[arg(long)]
    pub read_only: bool,
}

/// Run the MCP server until stdin closes.
pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    info!("starting vmward serve");

    let settings = load_settings()?;
    let orchestrator = build_orchestrator(settings)?;
    info!(
        ledger = %orchestrator.ledger().path().display(),
        signer = orchestrator.identity().address(),
        "orchestrator ready"
    );

    // One session per server process: its spend and orphan check live
    // exactly as long as the agent's connection.
    let provider = Arc::new(VmToolProvider::new(
        Arc::new(orchestrator),
        Arc::new(Session::new()),
    ));
    let tool_names: Vec<String> = provider.list_tools().into_iter().map(|t| t.name).collect();

    let mut middlewares: Vec<Box<dyn Middleware>> = Vec::new();
    if args.read_only {
        middlewares.push(Box::new(ToolAllowlist::new(READ_ONLY_TOOLS.iter().copied())));
    }
    middlewares.push(Box::new(AuditLog));

    let mut shell = McpServerShell::new(provider);
    for mw in middlewares {
        shell.add_middleware(mw);
    }

    info!(
        names = ?tool_names,
        read_only = args.read_only,
        "MCP server ready, reading from stdin"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    shell.run(stdin, stdout).await?;

    info!("stdin closed, MCP server shutting down");
    Ok(())
}
