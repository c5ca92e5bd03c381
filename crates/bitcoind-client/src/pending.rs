//! Bookkeeping for calls started with `call_async`.

use std::any::Any;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::response::Response;

type SuccessFn = Box<dyn FnOnce(Response) + Send>;
type FailureFn = Box<dyn FnOnce(ClientError) + Send>;

/// How a call ended, after middleware and the handler chain ran.
pub(crate) enum Settled {
    Success(Response),
    Failure(ClientError),
    /// The handler chain swallowed the error. Carries the error's envelope,
    /// or an empty one when there was none.
    Suppressed(Response),
}

/// Completion callbacks of an async call. Each fires at most once.
#[derive(Default)]
pub struct Callbacks {
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Without a failure callback the error is collected and returned by
    /// `Client::wait`.
    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(ClientError) + Send + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    /// Fire the matching callback. Returns an error nobody handled.
    pub(crate) fn deliver(self, outcome: Settled) -> Option<ClientError> {
        match outcome {
            Settled::Success(response) => {
                if let Some(callback) = self.on_success {
                    callback(response);
                }
                None
            }
            Settled::Failure(error) => match self.on_failure {
                Some(callback) => {
                    callback(error);
                    None
                }
                None => Some(error),
            },
            Settled::Suppressed(_) => None,
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// Handle to a call running in the background.
///
/// Dropping the handle does not cancel the call.
#[derive(Debug)]
pub struct PendingCall {
    id: u64,
    method: String,
    abort: AbortHandle,
}

impl PendingCall {
    pub(crate) fn new(id: u64, method: String, abort: AbortHandle) -> Self {
        Self { id, method, abort }
    }

    /// The JSON-RPC id of the request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The method name as sent.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// True once the response was processed or the call was cancelled.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Stop the call. No callback fires for a cancelled call.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

/// In-flight async calls of one client.
#[derive(Default)]
pub(crate) struct Ledger {
    entries: Mutex<Vec<JoinHandle<Option<ClientError>>>>,
}

impl Ledger {
    pub(crate) fn push(&self, handle: JoinHandle<Option<ClientError>>) {
        self.lock().push(handle);
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<Option<ClientError>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Vec<JoinHandle<Option<ClientError>>> {
        std::mem::take(&mut *self.lock())
    }

    /// Await every call, including ones registered while waiting.
    ///
    /// Errors that reached no failure callback are returned: one as is,
    /// several as `ClientError::Unhandled`. A panic inside a callback is
    /// resumed once every call has been awaited; the unhandled errors are
    /// logged first.
    pub(crate) async fn drain(&self) -> Result<(), ClientError> {
        let mut unhandled = Vec::new();
        let mut panic = None;
        loop {
            let handles = self.take();
            if handles.is_empty() {
                break;
            }
            debug!(pending = handles.len(), "waiting for async calls");
            let joined = join_handles(handles).await;
            unhandled.extend(joined.unhandled);
            panic = panic.or(joined.panic);
        }

        if let Some(payload) = panic {
            for error in &unhandled {
                warn!(error = %error, "unhandled async call failure");
            }
            std::panic::resume_unwind(payload);
        }

        match unhandled.len() {
            0 => Ok(()),
            1 => Err(unhandled.remove(0)),
            _ => Err(ClientError::Unhandled(unhandled)),
        }
    }

    /// Hand the outstanding calls to a background task that awaits them
    /// and logs every failure no callback handled.
    ///
    /// Returns `None` when nothing is pending or no runtime is available.
    pub(crate) fn detach(&self) -> Option<JoinHandle<Vec<ClientError>>> {
        let handles = self.take();
        if handles.is_empty() {
            return None;
        }
        let pending = handles.len();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(pending, "no runtime to await detached async calls");
            return None;
        };

        warn!(pending, "client dropped with async calls outstanding; they finish detached");
        Some(runtime.spawn(async move {
            let joined = join_handles(handles).await;
            if joined.panic.is_some() {
                warn!("detached async call panicked");
            }
            for error in &joined.unhandled {
                warn!(error = %error, "unhandled failure of detached async call");
            }
            joined.unhandled
        }))
    }
}

struct Joined {
    unhandled: Vec<ClientError>,
    panic: Option<Box<dyn Any + Send>>,
}

/// Await all `handles`. Keeps the first panic payload.
async fn join_handles(handles: Vec<JoinHandle<Option<ClientError>>>) -> Joined {
    let mut joined = Joined {
        unhandled: Vec::new(),
        panic: None,
    };
    for outcome in join_all(handles).await {
        match outcome {
            Ok(None) => {}
            Ok(Some(error)) => joined.unhandled.push(error),
            Err(err) if err.is_cancelled() => debug!("async call was cancelled"),
            Err(err) => {
                let payload = err.into_panic();
                joined.panic.get_or_insert(payload);
            }
        }
    }
    joined
}
