//! Core types for vmward.
//!
//! Everything the other crates exchange lives here: the persisted
//! [`VmRecord`](record::VmRecord), compute tiers and OS images, the
//! agent-visible report shapes, the [`Settings`](config::Settings) schema,
//! and the shared error enums.

pub mod config;
pub mod error;
pub mod record;
pub mod report;
pub mod tier;

pub use error::{ConfigError, LedgerError, NetworkError, Result, WardenError};
pub use record::{NetworkingInfo, NodeInfo, VmRecord};
pub use report::{
    Advised, BalanceReport, CostEstimate, DestroyReport, ExtendReport, ProvisionReport,
    SafetyCheckResult, VmListing, VmStatus, VmSummary, round_to,
};
pub use tier::{ComputeTier, OsImage};
