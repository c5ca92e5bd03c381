//! JSON-RPC request envelope and wire helpers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ClientError;

/// One JSON-RPC call as sent to the daemon.
///
/// Bitcoin Core accepts version 1.0 style requests, so no `jsonrpc` member
/// is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl Request {
    /// Build a request, lowercasing `method` unless `preserve_case` is set.
    pub fn build(method: &str, params: impl IntoParams, id: u64, preserve_case: bool) -> Self {
        let method = if preserve_case {
            method.to_owned()
        } else {
            method.to_lowercase()
        };
        Self {
            method,
            params: params.into_params(),
            id,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "method": self.method,
            "params": self.params,
            "id": self.id,
        })
    }
}

/// Conversion into a positional parameter list.
///
/// Arrays become the list itself, `Null` (and `()`) no parameters, and any
/// other value a single parameter.
pub trait IntoParams {
    fn into_params(self) -> Vec<Value>;
}

impl<T: Into<Value>> IntoParams for T {
    fn into_params(self) -> Vec<Value> {
        match self.into() {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        }
    }
}

/// Parse a batch item id. Numeric strings are accepted as well.
pub(crate) fn parse_batch_id(id: &Value) -> Result<u64, ClientError> {
    if let Some(n) = id.as_u64() {
        return Ok(n);
    }

    if let Some(s) = id.as_str() {
        return s
            .parse::<u64>()
            .map_err(|e| ClientError::Generic(format!("invalid batch response id string: {e}")));
    }

    Err(ClientError::Generic(format!(
        "invalid batch response id: {id}"
    )))
}
