use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;

use serde_json::Value;

use crate::path::PathError;
use crate::response::{RawResponse, Response};
use crate::transport::OutboundRequest;

/// Coarse classification of a [`ClientError`], used to select error overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The daemon could not be reached or answered with something that is not
    /// a JSON-RPC error.
    Connection,
    /// The daemon answered with a JSON-RPC error object.
    RemoteCall,
    /// The client was configured with invalid settings.
    Configuration,
    /// Anything raised by the client itself.
    Client,
}

/// A failed HTTP exchange, before classification by the handler chain.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub request: OutboundRequest,
    pub message: String,
    /// The HTTP response, when the daemon answered at all.
    pub response: Option<RawResponse>,
}

impl TransportError {
    pub fn new(request: OutboundRequest, message: impl Into<String>) -> Self {
        Self {
            request,
            message: message.into(),
            response: None,
        }
    }

    pub fn with_response(mut self, response: RawResponse) -> Self {
        self.response = Some(response);
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("connection to daemon failed: {message}")]
    Connection {
        request: Box<OutboundRequest>,
        message: String,
    },

    #[error("remote call failed ({code}): {message}")]
    RemoteCall {
        code: i64,
        message: String,
        response: Box<Response>,
    },

    #[error("bad configuration: {message}")]
    Configuration {
        config: BTreeMap<String, String>,
        message: String,
    },

    /// Unclassified transport failure. The default handler chain turns these
    /// into `Connection` or `RemoteCall`.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("cannot decode {0}")]
    Decode(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    Generic(String),

    /// An error replaced by a user-registered override.
    #[error("{error}")]
    Rebound {
        kind: ErrorKind,
        error: Arc<dyn StdError + Send + Sync>,
        original: Box<ClientError>,
    },

    #[error("{} async calls failed without a failure callback", .0.len())]
    Unhandled(Vec<ClientError>),
}

impl ClientError {
    /// Build a `RemoteCall` error from a response carrying an error object.
    ///
    /// The daemon's `{code, message}` shape is expected; other shapes keep
    /// code 0 and use the raw JSON as message.
    pub fn remote_call(response: Response) -> Self {
        #[derive(serde::Deserialize)]
        struct JsonRpcError {
            code: i64,
            message: String,
        }

        let error = response.error().cloned().unwrap_or(Value::Null);
        let (code, message) = match serde_json::from_value::<JsonRpcError>(error.clone()) {
            Ok(parsed) => (parsed.code, parsed.message),
            Err(_) => (0, format!("non-standard JSON-RPC error: {error}")),
        };
        Self::RemoteCall {
            code,
            message,
            response: Box::new(response),
        }
    }

    pub fn configuration<K, V>(
        config: impl IntoIterator<Item = (K, V)>,
        message: impl Into<String>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Configuration {
            config: config
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::RemoteCall { .. } => ErrorKind::RemoteCall,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Rebound { kind, .. } => *kind,
            _ => ErrorKind::Client,
        }
    }

    /// The daemon's error code for remote call failures.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::RemoteCall { code, .. } => Some(*code),
            Self::Rebound { original, .. } => original.code(),
            _ => None,
        }
    }

    /// The response that caused the error, if there was a decoded one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::RemoteCall { response, .. } => Some(response),
            Self::Rebound { original, .. } => original.response(),
            _ => None,
        }
    }

    /// The request that failed, for transport level errors.
    pub fn request(&self) -> Option<&OutboundRequest> {
        match self {
            Self::Connection { request, .. } => Some(request),
            Self::Transport(failure) => Some(&failure.request),
            Self::Rebound { original, .. } => original.request(),
            _ => None,
        }
    }

    /// The offending settings of a configuration error.
    pub fn config(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Configuration { config, .. } => Some(config),
            Self::Rebound { original, .. } => original.config(),
            _ => None,
        }
    }

    /// The user error of a rebound error, for downcasting.
    pub fn rebound(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Rebound { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}
