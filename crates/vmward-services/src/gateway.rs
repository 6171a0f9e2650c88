//! HTTP client for the compute-network gateway.
//!
//! The gateway is a sidecar that holds the network SDK and the signing
//! key. This client speaks its small JSON API and names the signer in the
//! `x-signer-address` header on every mutating or owner-scoped call.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use vmward_core::{ComputeNetwork, CreateInstanceRequest, CreatedInstance, Identity};
use vmward_types::config::Settings;
use vmward_types::{NetworkError, NetworkingInfo, NodeInfo};

use crate::error::{Result, ServiceError};

/// Header carrying the signer address.
pub const SIGNER_HEADER: &str = "x-signer-address";

const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct BalanceBody {
    balance: f64,
}

#[derive(Deserialize)]
struct PriceBody {
    credit_per_cu_hour: f64,
}

#[derive(Deserialize)]
struct NodesBody {
    nodes: Vec<NodeInfo>,
}

#[derive(Deserialize)]
struct InstancesBody {
    item_hashes: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`ComputeNetwork`] backed by the gateway's HTTP API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GatewayClient {
    /// Build a client for `base_url`, applying `timeout` to every request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ServiceError::InvalidGatewayUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ServiceError::InvalidGatewayUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.gateway_url,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, NetworkError> {
        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::Request(e.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "gateway response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(rejection(status.as_u16(), &body))
    }

    /// Like [`Self::send`], but a 404 means "absent" rather than failure.
    async fn send_optional(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<Option<Response>, NetworkError> {
        match self.send(request).await {
            Ok(response) => Ok(Some(response)),
            Err(NetworkError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Map an error response to the most specific [`NetworkError`].
///
/// A 404 always stays a status error so callers can treat it as absence.
fn rejection(status: u16, body: &str) -> NetworkError {
    if status != StatusCode::NOT_FOUND.as_u16()
        && let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body)
    {
        return NetworkError::Rejected(error);
    }
    NetworkError::Status {
        status,
        body: truncate_body(body),
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

async fn decode<T: DeserializeOwned>(response: Response) -> std::result::Result<T, NetworkError> {
    response
        .json()
        .await
        .map_err(|e| NetworkError::Decode(e.to_string()))
}

#[async_trait]
impl ComputeNetwork for GatewayClient {
    async fn get_balance(&self, payer: &str) -> std::result::Result<f64, NetworkError> {
        let url = self.url(&["v1", "balances", payer]);
        let body: BalanceBody = decode(self.send(self.http.get(url)).await?).await?;
        Ok(body.balance)
    }

    async fn get_unit_price(&self) -> std::result::Result<f64, NetworkError> {
        let url = self.url(&["v1", "pricing", "instance"]);
        let body: PriceBody = decode(self.send(self.http.get(url)).await?).await?;
        Ok(body.credit_per_cu_hour)
    }

    async fn list_available_nodes(
        &self,
        min_compute_units: u32,
        gpu: bool,
    ) -> std::result::Result<Vec<NodeInfo>, NetworkError> {
        let request = self
            .http
            .get(self.url(&["v1", "nodes"]))
            .query(&[
                ("min_compute_units", min_compute_units.to_string()),
                ("gpu", gpu.to_string()),
            ]);
        let body: NodesBody = decode(self.send(request).await?).await?;
        Ok(body.nodes)
    }

    async fn find_node(&self, node_hash: &str) -> std::result::Result<Option<NodeInfo>, NetworkError> {
        let request = self.http.get(self.url(&["v1", "nodes", node_hash]));
        match self.send_optional(request).await? {
            Some(response) => decode(response).await.map(Some),
            None => Ok(None),
        }
    }

    async fn create_instance(
        &self,
        identity: &Identity,
        request: &CreateInstanceRequest,
    ) -> std::result::Result<CreatedInstance, NetworkError> {
        let http_request = self
            .http
            .post(self.url(&["v1", "instances"]))
            .header(SIGNER_HEADER, identity.address())
            .json(request);
        let created: CreatedInstance = decode(self.send(http_request).await?).await?;
        debug!(item_hash = %created.item_hash, "gateway created instance");
        Ok(created)
    }

    async fn destroy_instance(
        &self,
        identity: &Identity,
        item_hash: &str,
        node_url: &str,
    ) -> std::result::Result<(), NetworkError> {
        let request = self
            .http
            .delete(self.url(&["v1", "instances", item_hash]))
            .header(SIGNER_HEADER, identity.address())
            .query(&[("node_url", node_url)]);
        self.send(request).await?;
        Ok(())
    }

    async fn list_identifier_set(
        &self,
        owner: &str,
    ) -> std::result::Result<HashSet<String>, NetworkError> {
        let request = self
            .http
            .get(self.url(&["v1", "instances"]))
            .header(SIGNER_HEADER, owner)
            .query(&[("owner", owner)]);
        let body: InstancesBody = decode(self.send(request).await?).await?;
        Ok(body.item_hashes.into_iter().collect())
    }

    async fn networking_info(
        &self,
        owner: &str,
        item_hash: &str,
    ) -> std::result::Result<Option<NetworkingInfo>, NetworkError> {
        let request = self
            .http
            .get(self.url(&["v1", "instances", item_hash, "networking"]))
            .query(&[("owner", owner)]);
        match self.send_optional(request).await? {
            Some(response) => decode(response).await.map(Some),
            None => Ok(None),
        }
    }
}
