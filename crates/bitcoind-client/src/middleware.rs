//! Request/response hooks applied around every call.

use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;

use crate::response::Response;
use crate::transport::OutboundRequest;

/// A hook around the HTTP exchange.
///
/// `handle_request` sees the outbound request before it is sent and
/// `handle_response` sees each decoded response before error checks and
/// callbacks. Both default to doing nothing.
pub trait ResponseMiddleware: Send + Sync {
    fn handle_request(&self, _request: &mut OutboundRequest) {}

    fn handle_response(&self, _request: &OutboundRequest, response: Response) -> Response {
        response
    }
}

/// Ordered collection of middleware.
///
/// Requests pass through in registration order, responses in reverse
/// registration order.
#[derive(Default, Clone)]
pub struct MiddlewareStack {
    middleware: Vec<Arc<dyn ResponseMiddleware>>,
}

impl MiddlewareStack {
    /// Create an empty middleware stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack holding [`MetaHeaders`], the client default.
    pub fn with_defaults() -> Self {
        let mut stack = Self::new();
        stack.push(Arc::new(MetaHeaders));
        stack
    }

    pub fn push(&mut self, middleware: Arc<dyn ResponseMiddleware>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub fn prepare(&self, request: &mut OutboundRequest) {
        for middleware in &self.middleware {
            middleware.handle_request(request);
        }
    }

    pub fn apply(&self, request: &OutboundRequest, response: Response) -> Response {
        self.middleware
            .iter()
            .rev()
            .fold(response, |response, middleware| {
                middleware.handle_response(request, response)
            })
    }
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Copies request metadata onto the response as `x-meta-<key>` headers.
///
/// Batch calls carry `Batch = 1`, so their responses expose `x-meta-batch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaHeaders;

impl ResponseMiddleware for MetaHeaders {
    fn handle_response(&self, request: &OutboundRequest, response: Response) -> Response {
        request.meta.iter().fold(response, |response, (key, value)| {
            let name = HeaderName::from_bytes(format!("x-meta-{}", key.to_ascii_lowercase()).as_bytes());
            match (name, HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => response.with_added_header(name, value),
                _ => {
                    debug!(meta.key = %key, "metadata is not a valid header, skipped");
                    response
                }
            }
        })
    }
}
