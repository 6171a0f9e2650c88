//! Services for vmward.
//!
//! - [`mcp`]: the JSON-RPC server shell, tool provider trait and middleware.
//! - [`tools`]: the six VM tools backed by the lifecycle orchestrator.
//! - [`gateway`]: the HTTP [`ComputeNetwork`](vmward_core::ComputeNetwork)
//!   client used in production.

pub mod error;
pub mod gateway;
pub mod mcp;
pub mod tools;

pub use error::{Result, ServiceError};
pub use gateway::GatewayClient;
pub use tools::VmToolProvider;
