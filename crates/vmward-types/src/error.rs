//! Error types for vmward.
//!
//! [`WardenError`] is what every orchestrator operation returns. Its
//! `Display` output is the reason string handed back to the agent, so the
//! agent-facing variants render without a prefix.
//!
//! Safety-gate failures that only ask for confirmation are not errors at
//! all; they come back as a regular report with `requires_confirmation`
//! set.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for lifecycle operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WardenError {
    /// Bad input shape (unknown OS image, invalid tier, non-positive hours).
    #[error("{0}")]
    Validation(String),

    /// A hard safety gate refused the operation.
    #[error("{0}")]
    SafetyBlocked(String),

    /// The VM is not present in the local ledger.
    #[error("VM {0} not found in local inventory.")]
    NotFound(String),

    /// The requested node is unknown to the network or inactive.
    #[error("Node {0} not found or inactive.")]
    NodeNotFound(String),

    /// The loaded identity is not the one that created the VM.
    #[error(
        "Key mismatch: this VM was created by {recorded}, but the current key signs as {current}. Load the original key to destroy this VM."
    )]
    KeyMismatch {
        /// Address stored on the record.
        recorded: String,
        /// Address of the identity currently loaded.
        current: String,
    },

    /// The primary remote call failed.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The local ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Settings, identity or key material could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures talking to the compute network.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NetworkError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(String),

    /// The remote side answered with a non-success status.
    #[error("gateway returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The network rejected the operation.
    #[error("{0}")]
    Rejected(String),
}

/// Ledger persistence failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LedgerError {
    /// Reading, writing or locking the ledger file failed.
    #[error("ledger io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not parse as a record list.
    #[error("ledger at {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The records could not be serialized.
    #[error("ledger serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The blocking storage task panicked or was cancelled.
    #[error("ledger task failed: {0}")]
    Task(String),
}

/// Configuration and key-material failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// An environment variable held a value that does not parse.
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },

    /// The home directory could not be determined for `~` expansion.
    #[error("cannot resolve home directory")]
    NoHomeDir,

    /// A file the configuration points at could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The identity file does not contain a usable address.
    #[error("no signer address in identity file {}", path.display())]
    EmptyIdentity { path: PathBuf },
}

/// Convenience alias for lifecycle results.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_facing_messages_have_no_prefix() {
        let err = WardenError::Validation("TTL must be positive.".into());
        assert_eq!(err.to_string(), "TTL must be positive.");

        let err = WardenError::NotFound("abc".into());
        assert_eq!(err.to_string(), "VM abc not found in local inventory.");

        let err = WardenError::NodeNotFound("n1".into());
        assert_eq!(err.to_string(), "Node n1 not found or inactive.");

        let err = WardenError::KeyMismatch {
            recorded: "0xAAA".into(),
            current: "0xBBB".into(),
        };
        assert_eq!(
            err.to_string(),
            "Key mismatch: this VM was created by 0xAAA, but the current key signs as 0xBBB. \
             Load the original key to destroy this VM."
        );
    }

    #[test]
    fn network_error_display() {
        let err = NetworkError::Status {
            status: 503,
            body: "down".into(),
        };
        assert_eq!(err.to_string(), "gateway returned 503: down");

        let err: WardenError = NetworkError::Request("connection refused".into()).into();
        assert_eq!(err.to_string(), "network error: request failed: connection refused");
    }

    #[test]
    fn ledger_corrupt_display() {
        let source = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err = LedgerError::Corrupt {
            path: PathBuf::from("/tmp/inventory.json"),
            source,
        };
        assert!(err.to_string().starts_with("ledger at /tmp/inventory.json is corrupt:"));

        let err: WardenError = err.into();
        assert!(matches!(err, WardenError::Ledger(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid {
            var: "VMWARD_MAX_TTL_HOURS".into(),
            value: "lots".into(),
            reason: "invalid float literal".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for VMWARD_MAX_TTL_HOURS: 'lots' (invalid float literal)"
        );
        assert_eq!(ConfigError::NoHomeDir.to_string(), "cannot resolve home directory");
    }
}
