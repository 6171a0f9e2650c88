//! In-memory [`ComputeNetwork`] test double, built only for tests and the
//! `test-utils` feature.
//!
//! Keeps balances, nodes and instances in a mutex-guarded map, records
//! every call by name, and can be told to fail individual operations.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use vmward_types::{NetworkError, NetworkingInfo, NodeInfo};

use crate::network::{ComputeNetwork, CreateInstanceRequest, CreatedInstance, Identity};

#[derive(Debug, Clone)]
struct Instance {
    owner: String,
    networking: NetworkingInfo,
    /// Networking lookups that return nothing before details appear.
    pending_lookups: u32,
}

#[derive(Debug, Default)]
struct State {
    balance: f64,
    unit_price: f64,
    nodes: Vec<NodeInfo>,
    instances: BTreeMap<String, Instance>,
    calls: Vec<&'static str>,
    failing: HashSet<&'static str>,
    networking_delay: u32,
    next_id: u64,
}

/// A scripted compute network.
#[derive(Debug, Default)]
pub struct InMemoryNetwork {
    state: Mutex<State>,
}

impl InMemoryNetwork {
    pub fn new(balance: f64, unit_price: f64) -> Self {
        Self {
            state: Mutex::new(State {
                balance,
                unit_price,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an active node.
    pub fn with_node(self, node: NodeInfo) -> Self {
        self.state().nodes.push(node);
        self
    }

    pub fn set_balance(&self, balance: f64) {
        self.state().balance = balance;
    }

    /// Make every call to `operation` fail with a request error.
    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    /// New instances report no networking for this many lookups.
    pub fn delay_networking(&self, lookups: u32) {
        self.state().networking_delay = lookups;
    }

    /// Add an instance the ledger knows nothing about.
    pub fn insert_instance(&self, owner: &str, item_hash: &str) {
        self.state().instances.insert(
            item_hash.to_owned(),
            Instance {
                owner: owner.to_owned(),
                networking: NetworkingInfo::default(),
                pending_lookups: 0,
            },
        );
    }

    /// Drop an instance without going through destroy.
    pub fn forget_instance(&self, item_hash: &str) {
        self.state().instances.remove(item_hash);
    }

    pub fn has_instance(&self, item_hash: &str) -> bool {
        self.state().instances.contains_key(item_hash)
    }

    /// Names of the operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == operation).count()
    }

    fn enter(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, NetworkError> {
        let mut state = self.state();
        state.calls.push(operation);
        if state.failing.contains(operation) {
            return Err(NetworkError::Request(format!("{operation} unavailable")));
        }
        Ok(state)
    }
}

#[async_trait]
impl ComputeNetwork for InMemoryNetwork {
    async fn get_balance(&self, _payer: &str) -> Result<f64, NetworkError> {
        Ok(self.enter("get_balance")?.balance)
    }

    async fn get_unit_price(&self) -> Result<f64, NetworkError> {
        Ok(self.enter("get_unit_price")?.unit_price)
    }

    async fn list_available_nodes(
        &self,
        _min_compute_units: u32,
        _gpu: bool,
    ) -> Result<Vec<NodeInfo>, NetworkError> {
        Ok(self.enter("list_available_nodes")?.nodes.clone())
    }

    async fn find_node(&self, node_hash: &str) -> Result<Option<NodeInfo>, NetworkError> {
        let state = self.enter("find_node")?;
        Ok(state.nodes.iter().find(|n| n.hash == node_hash).cloned())
    }

    async fn create_instance(
        &self,
        identity: &Identity,
        request: &CreateInstanceRequest,
    ) -> Result<CreatedInstance, NetworkError> {
        let mut state = self.enter("create_instance")?;
        state.next_id += 1;
        let id = state.next_id;
        let item_hash = format!("{id:064x}");
        let networking = NetworkingInfo {
            ipv4_host: Some(format!("10.0.0.{id}")),
            ssh_port: Some(24_000 + u16::try_from(id % 1000).unwrap_or(0)),
            ipv6: Some(format!("2001:db8::{id:x}")),
        };
        let delay = state.networking_delay;
        state.instances.insert(
            item_hash.clone(),
            Instance {
                owner: identity.address().to_owned(),
                networking: networking.clone(),
                pending_lookups: delay,
            },
        );
        tracing::debug!(item_hash = %item_hash, name = %request.name, "in-memory instance created");
        Ok(CreatedInstance {
            item_hash,
            networking: if delay == 0 {
                networking
            } else {
                NetworkingInfo::default()
            },
        })
    }

    async fn destroy_instance(
        &self,
        _identity: &Identity,
        item_hash: &str,
        _node_url: &str,
    ) -> Result<(), NetworkError> {
        let mut state = self.enter("destroy_instance")?;
        match state.instances.remove(item_hash) {
            Some(_) => Ok(()),
            None => Err(NetworkError::Rejected(format!("unknown instance {item_hash}"))),
        }
    }

    async fn list_identifier_set(&self, owner: &str) -> Result<HashSet<String>, NetworkError> {
        let state = self.enter("list_identifier_set")?;
        Ok(state
            .instances
            .iter()
            .filter(|(_, inst)| inst.owner.eq_ignore_ascii_case(owner))
            .map(|(hash, _)| hash.clone())
            .collect())
    }

    async fn networking_info(
        &self,
        _owner: &str,
        item_hash: &str,
    ) -> Result<Option<NetworkingInfo>, NetworkError> {
        let mut state = self.enter("networking_info")?;
        let Some(instance) = state.instances.get_mut(item_hash) else {
            return Ok(None);
        };
        if instance.pending_lookups > 0 {
            instance.pending_lookups -= 1;
            return Ok(Some(NetworkingInfo::default()));
        }
        Ok(Some(instance.networking.clone()))
    }
}
