//! The agent-facing VM tools.
//!
//! Each tool parses its JSON arguments, runs one orchestrator workflow and
//! returns the report as pretty-printed JSON. Any failure, including bad
//! arguments, comes back as `{"error": reason}` with `isError` set.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::info;
use vmward_core::{Orchestrator, ProvisionRequest, Session};
use vmward_types::{OsImage, WardenError};

use crate::error::ServiceError;
use crate::mcp::{CallToolResult, ToolDefinition, ToolError, ToolProvider};

pub const CHECK_BALANCE: &str = "check_balance";
pub const LIST_NODES: &str = "list_nodes";
pub const CREATE_VM: &str = "create_vm";
pub const DESTROY_VM: &str = "destroy_vm";
pub const LIST_MY_VMS: &str = "list_my_vms";
pub const EXTEND_VM: &str = "extend_vm";

/// Tools that never spend credits or change state.
pub const READ_ONLY_TOOLS: &[&str] = &[CHECK_BALANCE, LIST_NODES, LIST_MY_VMS];

mod args {
    use serde::Deserialize;

    fn one() -> u32 {
        1
    }

    #[derive(Debug, Deserialize)]
    pub struct ListNodes {
        #[serde(default = "one")]
        pub min_compute_units: u32,
        #[serde(default)]
        pub gpu: bool,
    }

    #[derive(Debug, Deserialize)]
    pub struct CreateVm {
        pub name: String,
        #[serde(alias = "crn_hash")]
        pub node_hash: String,
        #[serde(default = "one")]
        pub compute_units: u32,
        #[serde(default)]
        pub ttl_hours: Option<f64>,
        #[serde(default)]
        pub os_image: Option<String>,
        #[serde(default)]
        pub dry_run: bool,
        #[serde(default)]
        pub purpose: Option<String>,
        #[serde(default)]
        pub confirmed: bool,
    }

    #[derive(Debug, Deserialize)]
    pub struct DestroyVm {
        pub item_hash: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ExtendVm {
        pub item_hash: String,
        pub additional_hours: f64,
    }
}

/// Serves the VM tools from one orchestrator and one session.
pub struct VmToolProvider {
    orchestrator: Arc<Orchestrator>,
    session: Arc<Session>,
}

impl VmToolProvider {
    pub fn new(orchestrator: Arc<Orchestrator>, session: Arc<Session>) -> Self {
        Self {
            orchestrator,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<Value, WardenError> {
        match name {
            CHECK_BALANCE => to_json(self.orchestrator.check_balance(&self.session).await?),
            LIST_NODES => {
                let args: args::ListNodes = parse(name, args)?;
                to_json(
                    self.orchestrator
                        .list_nodes(args.min_compute_units, args.gpu)
                        .await?,
                )
            }
            CREATE_VM => {
                let args: args::CreateVm = parse(name, args)?;
                let request = ProvisionRequest {
                    name: args.name,
                    node_hash: args.node_hash,
                    compute_units: args.compute_units,
                    ttl_hours: args.ttl_hours,
                    os_image: args.os_image,
                    confirmed: args.confirmed,
                    dry_run: args.dry_run,
                    purpose: args.purpose,
                };
                to_json(self.orchestrator.provision(&self.session, request).await?)
            }
            DESTROY_VM => {
                let args: args::DestroyVm = parse(name, args)?;
                to_json(self.orchestrator.destroy(&args.item_hash).await?)
            }
            LIST_MY_VMS => to_json(self.orchestrator.list_vms().await?),
            EXTEND_VM => {
                let args: args::ExtendVm = parse(name, args)?;
                to_json(
                    self.orchestrator
                        .extend(&self.session, &args.item_hash, args.additional_hours)
                        .await?,
                )
            }
            // Filtered out by `call_tool` before dispatch.
            other => Err(WardenError::Validation(format!("Unknown tool {other}."))),
        }
    }
}

fn parse<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, WardenError> {
    serde_json::from_value(args)
        .map_err(|e| WardenError::Validation(format!("Invalid arguments for {tool}: {e}")))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, WardenError> {
    serde_json::to_value(value)
        .map_err(|e| WardenError::Validation(format!("Could not encode result: {e}")))
}

fn render(value: &Value) -> Result<String, ServiceError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// The `{"error": reason}` payload returned for every failed call.
pub fn error_payload(reason: impl Into<String>) -> Value {
    json!({ "error": reason.into() })
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Definitions for every tool, in a stable order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let images: Vec<&str> = OsImage::ALL.iter().map(|i| i.as_str()).collect();
    let tiers = vmward_types::tier::VALID_COMPUTE_UNITS;
    vec![
        ToolDefinition {
            name: CHECK_BALANCE.into(),
            description: "Check credit balance, burn rate, runway and active VMs. \
                The first call of a session also reports orphaned and stale VMs."
                .into(),
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: LIST_NODES.into(),
            description: "List active compute nodes that can host a VM.".into(),
            input_schema: object_schema(
                json!({
                    "min_compute_units": {
                        "type": "integer",
                        "enum": tiers,
                        "default": 1,
                        "description": "Minimum compute units the node must support."
                    },
                    "gpu": {
                        "type": "boolean",
                        "default": false,
                        "description": "Only return nodes with GPUs."
                    }
                }),
                &[],
            ),
        },
        ToolDefinition {
            name: CREATE_VM.into(),
            description: "Provision a new VM. Spending is gated by balance, concurrency and \
                session limits; large estimates require `confirmed: true`."
                .into(),
            input_schema: object_schema(
                json!({
                    "name": { "type": "string", "description": "Human-readable VM name." },
                    "node_hash": {
                        "type": "string",
                        "description": "Node to deploy on, from list_nodes."
                    },
                    "compute_units": {
                        "type": "integer",
                        "enum": tiers,
                        "default": 1,
                        "description": "1 CU = 1 vCPU, 2 GiB RAM, 20 GiB disk."
                    },
                    "ttl_hours": {
                        "type": "number",
                        "exclusiveMinimum": 0,
                        "description": "Hours until the VM should be destroyed."
                    },
                    "os_image": { "type": "string", "enum": images },
                    "dry_run": {
                        "type": "boolean",
                        "default": false,
                        "description": "Only estimate the cost."
                    },
                    "purpose": { "type": "string", "description": "Why this VM is needed." },
                    "confirmed": {
                        "type": "boolean",
                        "default": false,
                        "description": "Accept a cost above the confirmation threshold."
                    }
                }),
                &["name", "node_hash"],
            ),
        },
        ToolDefinition {
            name: DESTROY_VM.into(),
            description: "Destroy a VM and remove it from the local inventory.".into(),
            input_schema: object_schema(
                json!({
                    "item_hash": {
                        "type": "string",
                        "description": "From create_vm or list_my_vms."
                    }
                }),
                &["item_hash"],
            ),
        },
        ToolDefinition {
            name: LIST_MY_VMS.into(),
            description: "List tracked VMs reconciled with the network, flagging expired, \
                stale and orphaned ones."
                .into(),
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: EXTEND_VM.into(),
            description: "Extend a VM's tracked time-to-live.".into(),
            input_schema: object_schema(
                json!({
                    "item_hash": { "type": "string" },
                    "additional_hours": { "type": "number", "exclusiveMinimum": 0 }
                }),
                &["item_hash", "additional_hours"],
            ),
        },
    ]
}

#[async_trait]
impl ToolProvider for VmToolProvider {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, ToolError> {
        if !tool_definitions().iter().any(|t| t.name == name) {
            return Err(ToolError::NotFound(name.to_string()));
        }

        let (payload, is_error) = match self.dispatch(name, args).await {
            Ok(value) => (value, false),
            Err(e) => {
                info!(tool = name, error = %e, "tool call failed");
                (error_payload(e.to_string()), true)
            }
        };
        let text = render(&payload).map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(if is_error {
            CallToolResult::error(text)
        } else {
            CallToolResult::text(text)
        })
    }
}
