//! Settings schema.
//!
//! Every field has a default, so an empty environment yields a usable
//! configuration. Paths are stored as written; `~` expansion and
//! absolutization happen in the loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tier::OsImage;

/// Runtime settings for the lifecycle tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Address whose credits pay for VMs. `None` means the signer pays.
    #[serde(default)]
    pub payer_address: Option<String>,

    /// File holding the signer's public address.
    #[serde(default = "default_identity_path")]
    pub identity_path: PathBuf,

    /// SSH public key installed on new VMs.
    #[serde(default = "default_ssh_pubkey_path")]
    pub ssh_pubkey_path: PathBuf,

    /// Local VM ledger.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Base URL of the network gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Per-request timeout for gateway calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_vms")]
    pub max_concurrent_vms: usize,

    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: f64,

    #[serde(default = "default_max_ttl_hours")]
    pub max_ttl_hours: f64,

    /// Share of the current balance that must remain after a spend, in percent.
    #[serde(default = "default_balance_guard_percent")]
    pub balance_guard_percent: f64,

    /// Estimated costs above this need explicit confirmation.
    #[serde(default = "default_cost_threshold")]
    pub cost_threshold: f64,

    /// Cap on estimated spend per session. `None` disables the cap.
    #[serde(default)]
    pub max_session_spend: Option<f64>,

    #[serde(default = "default_os_image")]
    pub default_os_image: OsImage,

    /// Networking lookups after creation.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Delay between networking lookups, in seconds.
    #[serde(default = "default_poll_delay_secs")]
    pub poll_delay_secs: f64,
}

fn default_identity_path() -> PathBuf {
    PathBuf::from("~/.vmward/identity")
}
fn default_ssh_pubkey_path() -> PathBuf {
    PathBuf::from("~/.ssh/id_ed25519.pub")
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from("~/.vmward/inventory.json")
}
fn default_gateway_url() -> String {
    "http://127.0.0.1:4021".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_vms() -> usize {
    3
}
fn default_ttl_hours() -> f64 {
    4.0
}
fn default_max_ttl_hours() -> f64 {
    24.0
}
fn default_balance_guard_percent() -> f64 {
    20.0
}
fn default_cost_threshold() -> f64 {
    10.0
}
fn default_os_image() -> OsImage {
    OsImage::Ubuntu22
}
fn default_poll_attempts() -> u32 {
    10
}
fn default_poll_delay_secs() -> f64 {
    3.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            payer_address: None,
            identity_path: default_identity_path(),
            ssh_pubkey_path: default_ssh_pubkey_path(),
            ledger_path: default_ledger_path(),
            gateway_url: default_gateway_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_vms: default_max_concurrent_vms(),
            default_ttl_hours: default_ttl_hours(),
            max_ttl_hours: default_max_ttl_hours(),
            balance_guard_percent: default_balance_guard_percent(),
            cost_threshold: default_cost_threshold(),
            max_session_spend: None,
            default_os_image: default_os_image(),
            poll_attempts: default_poll_attempts(),
            poll_delay_secs: default_poll_delay_secs(),
        }
    }
}
