//! Lifecycle engine for vmward.
//!
//! Spending operations flow through [`orchestrator::Orchestrator`]: it
//! estimates with [`cost`], gates with [`safety`], calls the
//! [`network::ComputeNetwork`], and records results in the [`ledger`] and
//! the caller's [`session::Session`]. [`reconcile`] compares the ledger
//! against what the network reports.

pub mod cost;
pub mod env;
pub mod ledger;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod network;
pub mod orchestrator;
pub mod poll;
pub mod reconcile;
pub mod safety;
pub mod session;
pub mod settings;

pub use ledger::{Ledger, RecordUpdate};
pub use network::{ComputeNetwork, CreateInstanceRequest, CreatedInstance, Identity};
pub use orchestrator::{Orchestrator, ProvisionRequest};
pub use session::Session;
