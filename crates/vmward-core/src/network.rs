//! The compute-network boundary.
//!
//! [`ComputeNetwork`] is everything the lifecycle engine needs from the
//! remote side. Signing happens behind the implementation; this process
//! only ever holds the signer's public address ([`Identity`]).

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vmward_types::{ConfigError, NetworkError, NetworkingInfo, NodeInfo, OsImage};

/// The signer whose key creates and destroys VMs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    address: String,
}

#[derive(Deserialize)]
struct IdentityFile {
    address: String,
}

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Read the signer address from `path`.
    ///
    /// Accepts either a JSON object with an `address` field or a plain
    /// text file whose first non-empty line is the address.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).ok_or_else(|| ConfigError::EmptyIdentity {
            path: path.to_path_buf(),
        })
    }

    fn parse(content: &str) -> Option<Self> {
        let trimmed = content.trim();
        if trimmed.starts_with('{') {
            let file: IdentityFile = serde_json::from_str(trimmed).ok()?;
            let address = file.address.trim();
            return (!address.is_empty()).then(|| Self::new(address));
        }
        trimmed
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(Self::new)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Case-insensitive address comparison.
    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

/// Parameters for creating an instance on a specific node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub node_hash: String,
    pub node_url: String,
    pub ssh_public_key: String,
    pub compute_units: u32,
    pub vcpus: u32,
    pub memory_mib: u32,
    pub disk_mib: u32,
    pub os_image: OsImage,
    pub name: String,
    /// Pays for the instance instead of the signer, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_and_conditions: Option<String>,
}

/// What the network returns for a new instance.
///
/// Networking fields may still be empty; the caller polls for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedInstance {
    pub item_hash: String,
    #[serde(flatten)]
    pub networking: NetworkingInfo,
}

/// Remote operations on the compute network.
///
/// Implementations must be cheap to share; the engine holds one behind an
/// `Arc` for the life of the process.
#[async_trait]
pub trait ComputeNetwork: Send + Sync {
    /// Credit balance of `payer`.
    async fn get_balance(&self, payer: &str) -> Result<f64, NetworkError>;

    /// Credits per compute-unit-hour for instances.
    async fn get_unit_price(&self) -> Result<f64, NetworkError>;

    /// Active nodes able to host at least `min_compute_units`.
    async fn list_available_nodes(
        &self,
        min_compute_units: u32,
        gpu: bool,
    ) -> Result<Vec<NodeInfo>, NetworkError>;

    /// An active node by identifier, or `None` if unknown or inactive.
    async fn find_node(&self, node_hash: &str) -> Result<Option<NodeInfo>, NetworkError>;

    async fn create_instance(
        &self,
        identity: &Identity,
        request: &CreateInstanceRequest,
    ) -> Result<CreatedInstance, NetworkError>;

    async fn destroy_instance(
        &self,
        identity: &Identity,
        item_hash: &str,
        node_url: &str,
    ) -> Result<(), NetworkError>;

    /// Identifiers of every instance the network attributes to `owner`.
    async fn list_identifier_set(&self, owner: &str) -> Result<HashSet<String>, NetworkError>;

    /// Current networking details for an instance, if it has any yet.
    async fn networking_info(
        &self,
        owner: &str,
        item_hash: &str,
    ) -> Result<Option<NetworkingInfo>, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_from_plain_text() {
        let id = Identity::parse("\n  0xAbC123  \nignored\n").unwrap();
        assert_eq!(id.address(), "0xAbC123");
    }

    #[test]
    fn identity_from_json() {
        let id = Identity::parse(r#"{"address": "0xdef", "label": "agent"}"#).unwrap();
        assert_eq!(id.address(), "0xdef");
    }

    #[test]
    fn identity_rejects_empty() {
        assert!(Identity::parse("   \n\n").is_none());
        assert!(Identity::parse(r#"{"address": "  "}"#).is_none());
        assert!(Identity::parse(r#"{"name": "x"}"#).is_none());
    }

    #[test]
    fn identity_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            Identity::load(&missing),
            Err(ConfigError::Unreadable { .. })
        ));

        let empty = dir.path().join("empty");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(
            Identity::load(&empty),
            Err(ConfigError::EmptyIdentity { .. })
        ));

        let ok = dir.path().join("identity");
        std::fs::write(&ok, "0x1234\n").unwrap();
        assert_eq!(Identity::load(&ok).unwrap().address(), "0x1234");
    }

    #[test]
    fn identity_matches_ignoring_case() {
        let id = Identity::new("0xABCdef");
        assert!(id.matches("0xabcDEF"));
        assert!(!id.matches("0xabcde0"));
    }

    #[test]
    fn created_instance_flattens_networking() {
        let json = r#"{"item_hash": "h1", "ipv4_host": "1.2.3.4", "ssh_port": 24001}"#;
        let created: CreatedInstance = serde_json::from_str(json).unwrap();
        assert_eq!(created.item_hash, "h1");
        assert_eq!(created.networking.ssh_port, Some(24001));
        assert!(created.networking.ipv6.is_none());

        let bare: CreatedInstance = serde_json::from_str(r#"{"item_hash": "h2"}"#).unwrap();
        assert!(bare.networking.is_empty());
    }
}
