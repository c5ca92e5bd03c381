//! HTTP transport abstraction.
//!
//! Defines the [`HttpTransport`] trait the client sends through and the
//! reqwest implementation ([`ReqwestTransport`]) plus a test mock
//! (`mock::MockTransport`).

mod http;
#[cfg(test)]
pub mod mock;

pub use http::ReqwestTransport;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::response::RawResponse;

/// A JSON body bound for a path on the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Absolute request path, `/` or `/wallet/<name>`.
    pub path: String,
    pub body: Value,
    /// Call metadata. Not sent as-is; middleware may surface it.
    pub meta: BTreeMap<String, String>,
}

impl OutboundRequest {
    pub fn new(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// The `method` member of a single-call body.
    pub fn method(&self) -> Option<&str> {
        self.body.get("method").and_then(Value::as_str)
    }
}

/// Sends JSON-RPC bodies to the daemon.
///
/// Implementations own authentication and connection management. A reply
/// with a 4xx or 5xx status must be reported as a [`TransportError`]
/// carrying the response so the handler chain can inspect its body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `request.body` as JSON to `request.path`.
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError>;
}
