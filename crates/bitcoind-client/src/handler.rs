//! Error post-processing shared by every call a client makes.
//!
//! A [`HandlerChain`] runs its handlers in registration order. Each handler
//! may replace the error, suppress it, or pass it on. The default chain
//! classifies raw transport failures, turning them into `RemoteCall` errors
//! when the daemon sent a JSON-RPC error object and `Connection` errors
//! otherwise. [`ErrorOverrides`] registered afterwards can then swap the
//! classified error for a user-defined type.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ClientError, ErrorKind};
use crate::response::Response;

/// What a handler decided about an error.
pub enum Handled {
    /// Continue with this error instead.
    Replace(ClientError),
    /// Swallow the error. Later handlers do not run.
    Suppress,
    /// Leave the error as it is.
    Pass,
}

type Handler = dyn Fn(&ClientError) -> Handled + Send + Sync;

#[derive(Clone)]
pub struct HandlerChain {
    handlers: Vec<Arc<Handler>>,
}

impl HandlerChain {
    /// Chain with transport classification installed.
    pub fn new() -> Self {
        let mut chain = Self::empty();
        chain.register(classify_transport);
        chain
    }

    /// Chain without any handler; errors come out unclassified.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ClientError) -> Handled + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Append `overrides` as the last handler.
    pub fn with_overrides(mut self, overrides: ErrorOverrides) -> Self {
        self.register(move |error| overrides.rebind(error));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `error` through the chain. `None` means it was suppressed.
    pub fn handle(&self, error: ClientError) -> Option<ClientError> {
        let mut current = error;
        for handler in &self.handlers {
            match handler(&current) {
                Handled::Replace(replacement) => current = replacement,
                Handled::Suppress => {
                    debug!(error = %current, "error suppressed by handler");
                    return None;
                }
                Handled::Pass => {}
            }
        }
        Some(current)
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Classify an unprocessed transport failure.
///
/// A response whose body decodes to an envelope with a non-null `error`
/// becomes `RemoteCall`; everything else becomes `Connection`.
pub fn classify_transport(error: &ClientError) -> Handled {
    let ClientError::Transport(failure) = error else {
        return Handled::Pass;
    };

    let remote = failure
        .response
        .clone()
        .and_then(|raw| Response::from_raw(raw).ok())
        .filter(Response::has_error);
    match remote {
        Some(response) => Handled::Replace(ClientError::remote_call(response)),
        None => Handled::Replace(ClientError::Connection {
            request: Box::new(failure.request.clone()),
            message: failure.message.clone(),
        }),
    }
}

type Constructor = dyn Fn(&ClientError) -> Box<dyn StdError + Send + Sync> + Send + Sync;

/// Per-kind constructors for user-defined error types.
#[derive(Clone, Default)]
pub struct ErrorOverrides {
    constructors: HashMap<ErrorKind, Arc<Constructor>>,
}

impl ErrorOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace errors of `kind` with whatever `constructor` builds from them.
    pub fn on<F, E>(mut self, kind: ErrorKind, constructor: F) -> Self
    where
        F: Fn(&ClientError) -> E + Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.constructors.insert(
            kind,
            Arc::new(move |error: &ClientError| {
                Box::new(constructor(error)) as Box<dyn StdError + Send + Sync>
            }),
        );
        self
    }

    /// Handler step: wrap `error` in `ClientError::Rebound` when an override
    /// exists for its kind. Already rebound errors pass through.
    pub fn rebind(&self, error: &ClientError) -> Handled {
        if matches!(error, ClientError::Rebound { .. }) {
            return Handled::Pass;
        }
        let kind = error.kind();
        match self.constructors.get(&kind) {
            Some(constructor) => Handled::Replace(ClientError::Rebound {
                kind,
                error: Arc::from(constructor(error)),
                original: Box::new(error.clone()),
            }),
            None => Handled::Pass,
        }
    }
}

impl fmt::Debug for ErrorOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}
