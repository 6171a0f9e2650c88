//! Errors from building the service layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// reqwest could not build a client (TLS backend, proxy settings).
    #[error("http client error: {0}")]
    HttpClient(String),

    /// Not an absolute http(s) URL.
    #[error("invalid gateway url: {0}")]
    InvalidGatewayUrl(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
