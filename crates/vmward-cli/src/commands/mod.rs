//! CLI command implementations for `vmward`.
//!
//! - [`serve`] -- MCP server over stdio.
//! - [`status`] -- Balance and inventory summary.
//! - [`config_cmd`] -- Settings inspection.

pub mod config_cmd;
pub mod serve;
pub mod status;

use std::sync::Arc;

use anyhow::Context;
use vmward_core::{Identity, Orchestrator};
use vmward_services::GatewayClient;
use vmward_types::config::Settings;

/// Load settings from the `VMWARD_*` environment variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    vmward_core::settings::load_from_process().context("failed to load settings")
}

/// Wire the gateway client and signer identity into an orchestrator.
pub fn build_orchestrator(settings: Settings) -> anyhow::Result<Orchestrator> {
    let identity = Identity::load(&settings.identity_path).context("failed to load identity")?;
    let gateway = GatewayClient::from_settings(&settings)
        .with_context(|| format!("failed to build gateway client for {}", settings.gateway_url))?;
    tracing::debug!(
        gateway = %gateway.base_url(),
        signer = identity.address(),
        "orchestrator configured"
    );
    Ok(Orchestrator::new(settings, Arc::new(gateway), identity))
}
