//! Ledger records and network descriptors.
//!
//! [`VmRecord`] is the unit persisted in the local ledger. Field names
//! renamed over time keep their old spelling as serde aliases so ledgers
//! written by earlier releases still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_ssh_user() -> String {
    "root".into()
}

fn default_compute_units() -> u32 {
    1
}

/// Local ledger entry for a provisioned VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Content-addressed identifier assigned by the network at creation.
    pub item_hash: String,

    /// Display name given at provisioning time.
    #[serde(default)]
    pub name: String,

    /// Identifier of the node hosting the VM.
    #[serde(default, alias = "crn_hash")]
    pub node_hash: String,

    /// Network address (URL) of the hosting node.
    #[serde(default, alias = "crn_url")]
    pub node_url: String,

    /// Allocated compute units.
    #[serde(default = "default_compute_units")]
    pub compute_units: u32,

    /// When the VM was created.
    pub created_at: DateTime<Utc>,

    /// Locally tracked expiry. `None` means no expiry is tracked.
    #[serde(default)]
    pub ttl_expires_at: Option<DateTime<Utc>>,

    /// Credits per hour, fixed at creation and never recomputed.
    #[serde(default, alias = "estimated_hourly_cost")]
    pub hourly_cost: f64,

    /// Address of the identity that created the VM.
    #[serde(default)]
    pub signing_address: Option<String>,

    /// Free-text reason the VM exists.
    #[serde(default)]
    pub purpose: Option<String>,

    /// SSH login user.
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    /// Public IPv4 host for SSH, once known.
    #[serde(default)]
    pub ipv4_host: Option<String>,

    /// Mapped SSH port, once known.
    #[serde(default, alias = "ssh_port_mapped")]
    pub ssh_port: Option<u16>,

    /// IPv6 address, once known.
    #[serde(default)]
    pub ipv6: Option<String>,
}

impl VmRecord {
    /// Copy networking fields onto the record.
    pub fn apply_networking(&mut self, info: &NetworkingInfo) {
        self.ipv4_host = info.ipv4_host.clone();
        self.ssh_port = info.ssh_port;
        self.ipv6 = info.ipv6.clone();
    }

    /// Ready-to-paste SSH command, if host and port are known.
    pub fn ssh_command(&self) -> Option<String> {
        ssh_command(self.ipv4_host.as_deref(), self.ssh_port, &self.ssh_user)
    }

    /// Minutes elapsed between creation and `now`.
    pub fn uptime_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 60_000.0
    }

    /// Credits consumed over `uptime_minutes` at the fixed hourly rate.
    pub fn cost_for_minutes(&self, uptime_minutes: f64) -> f64 {
        self.hourly_cost * uptime_minutes / 60.0
    }

    /// Whether the tracked TTL has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl_expires_at.is_some_and(|at| at <= now)
    }
}

/// Build an SSH command line for a host/port pair.
pub fn ssh_command(host: Option<&str>, port: Option<u16>, user: &str) -> Option<String> {
    match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() => Some(format!(
            "ssh -o StrictHostKeyChecking=no {user}@{host} -p {port}"
        )),
        _ => None,
    }
}

/// Connection details reported by the network for an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingInfo {
    #[serde(default)]
    pub ipv4_host: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    #[serde(default)]
    pub ipv6: Option<String>,
}

impl NetworkingInfo {
    /// True when neither an IPv4 host nor an SSH port is known yet.
    pub fn is_empty(&self) -> bool {
        self.ipv4_host.is_none() && self.ssh_port.is_none()
    }
}

/// A compute node advertised by the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identifier.
    pub hash: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Node API address.
    pub url: String,
    /// Network-assigned reliability score.
    #[serde(default)]
    pub score: f64,
    /// Node software version.
    #[serde(default)]
    pub version: Option<String>,
    /// Whether the node exposes GPUs.
    #[serde(default)]
    pub has_gpu: bool,
    /// Reference to the node's terms-and-conditions document.
    #[serde(default)]
    pub terms_and_conditions: Option<String>,
}
