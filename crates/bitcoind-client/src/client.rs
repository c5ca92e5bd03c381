//! The JSON-RPC client.
//!
//! A [`Client`] sends calls either in the foreground ([`Client::call`]) or
//! in the background ([`Client::call_async`]). Background calls are tracked
//! by the client; [`Client::wait`] blocks until every one of them has
//! settled and reports failures that no callback handled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{ClientError, TransportError};
use crate::handler::HandlerChain;
use crate::middleware::{MiddlewareStack, ResponseMiddleware};
use crate::pending::{Callbacks, Ledger, PendingCall, Settled};
use crate::request::{parse_batch_id, IntoParams, Request};
use crate::response::{RawResponse, Response};
use crate::transport::{HttpTransport, OutboundRequest, ReqwestTransport};

const ROOT_PATH: &str = "/";

/// Result of [`Client::invoke`].
#[derive(Debug)]
pub enum Invocation {
    Completed(Response),
    Pending(PendingCall),
}

/// Bitcoin Core JSON-RPC client.
///
/// Request ids start at 0 and increase by one per request; a batch reserves
/// one id per call. All calls of a client share one handler chain.
pub struct Client {
    transport: Arc<dyn HttpTransport>,
    config: Config,
    handlers: Arc<HandlerChain>,
    middleware: MiddlewareStack,
    next_id: AtomicU64,
    path: RwLock<String>,
    ledger: Ledger,
}

impl Client {
    /// A client with the reqwest transport and default handlers.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        Self::builder(config).build()
    }

    /// Shorthand for `Client::new(Config::from_url(url)?)`.
    pub fn from_url(url: &str) -> Result<Self, ClientError> {
        Self::new(Config::from_url(url)?)
    }

    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            handlers: None,
            middleware: MiddlewareStack::with_defaults(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handlers(&self) -> &Arc<HandlerChain> {
        &self.handlers
    }

    /// Take the next request id.
    pub fn id(&self) -> u64 {
        self.reserve_request_ids(1)
    }

    /// Atomically reserve `count` consecutive request IDs for batch calls.
    fn reserve_request_ids(&self, count: u64) -> u64 {
        self.next_id.fetch_add(count, Ordering::Relaxed)
    }

    /// Route subsequent calls to the wallet endpoint `/wallet/<name>`.
    ///
    /// The name is percent-encoded as a single path segment.
    pub fn wallet(&self, name: &str) -> &Self {
        let path = format!("/wallet/{}", urlencoding::encode(name));
        debug!(rpc.path = %path, "switching wallet endpoint");
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = path;
        self
    }

    /// Route subsequent calls to the daemon root again.
    pub fn default_wallet(&self) -> &Self {
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = ROOT_PATH.to_owned();
        self
    }

    /// The path calls are currently sent to.
    pub fn path(&self) -> String {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of async calls not yet collected by [`Client::wait`].
    pub fn pending(&self) -> usize {
        self.ledger.len()
    }

    fn prepare(
        &self,
        method: &str,
        params: impl IntoParams,
    ) -> Result<(Request, OutboundRequest), ClientError> {
        if method.is_empty() {
            return Err(ClientError::Generic(
                "method name must not be empty".to_owned(),
            ));
        }
        let request = Request::build(method, params, self.id(), self.config.preserve_case);
        let path = self.path();
        debug!(
            rpc.id = request.id,
            rpc.method = %request.method,
            rpc.params = request.params.len(),
            rpc.path = %path,
            "rpc call"
        );

        let mut outbound = OutboundRequest::new(path, request.to_value());
        self.middleware.prepare(&mut outbound);
        Ok((request, outbound))
    }

    /// Call `method` and wait for the reply.
    ///
    /// A reply carrying a JSON-RPC error fails with `RemoteCall` (after the
    /// handler chain ran). When a handler suppresses the error the error's
    /// envelope is returned as a successful response.
    pub async fn call(&self, method: &str, params: impl IntoParams) -> Result<Response, ClientError> {
        let (_, outbound) = self.prepare(method, params)?;
        let outcome = self.transport.send(&outbound).await;
        match settle(&self.handlers, &self.middleware, &outbound, outcome) {
            Settled::Success(response) | Settled::Suppressed(response) => Ok(response),
            Settled::Failure(error) => Err(error),
        }
    }

    /// Start `method` in the background and return immediately.
    ///
    /// The matching callback fires once the call settles. Needs a Tokio
    /// runtime; outside one this fails without sending anything.
    pub fn call_async(
        &self,
        method: &str,
        params: impl IntoParams,
        callbacks: Callbacks,
    ) -> Result<PendingCall, ClientError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::Generic(format!("async calls need a Tokio runtime: {e}")))?;
        let (request, outbound) = self.prepare(method, params)?;

        let transport = Arc::clone(&self.transport);
        let handlers = Arc::clone(&self.handlers);
        let middleware = self.middleware.clone();
        let handle = runtime.spawn(async move {
            let outcome = transport.send(&outbound).await;
            callbacks.deliver(settle(&handlers, &middleware, &outbound, outcome))
        });

        let pending = PendingCall::new(request.id, request.method, handle.abort_handle());
        self.ledger.push(handle);
        Ok(pending)
    }

    /// Wait for every async call, including ones started meanwhile.
    ///
    /// Returns the failures that had no failure callback: one as is,
    /// several as `ClientError::Unhandled`. Calling it again with nothing
    /// pending returns `Ok(())`.
    pub async fn wait(&self) -> Result<(), ClientError> {
        self.ledger.drain().await
    }

    /// Wait for outstanding calls, then release the client.
    pub async fn close(self) -> Result<(), ClientError> {
        self.wait().await
    }

    /// Call by name. A trailing `async` (any case) starts the call in the
    /// background instead: `getblockasync` runs `getblock` via
    /// [`Client::call_async`] without callbacks.
    pub async fn invoke(&self, name: &str, params: impl IntoParams) -> Result<Invocation, ClientError> {
        match split_async_suffix(name) {
            (method, true) => self
                .call_async(method, params, Callbacks::new())
                .map(Invocation::Pending),
            (method, false) => self.call(method, params).await.map(Invocation::Completed),
        }
    }

    /// Background call by name with callbacks. A trailing `async` is
    /// stripped if present.
    pub fn invoke_async(
        &self,
        name: &str,
        params: impl IntoParams,
        callbacks: Callbacks,
    ) -> Result<PendingCall, ClientError> {
        let (method, _) = split_async_suffix(name);
        self.call_async(method, params, callbacks)
    }

    /// Send several calls as one JSON-RPC batch.
    ///
    /// Results come back in call order. Per-call errors go through the
    /// handler chain individually. A failed exchange or a malformed reply
    /// (bad or missing item ids) also goes through the chain and is
    /// returned as the outer error. If the chain suppresses that outer
    /// error the result is empty.
    pub async fn batch<I, M, P>(
        &self,
        calls: I,
    ) -> Result<Vec<Result<Response, ClientError>>, ClientError>
    where
        I: IntoIterator<Item = (M, P)>,
        M: AsRef<str>,
        P: IntoParams,
    {
        let calls: Vec<(M, P)> = calls.into_iter().collect();
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        if calls.iter().any(|(method, _)| method.as_ref().is_empty()) {
            return Err(ClientError::Generic(
                "method name must not be empty".to_owned(),
            ));
        }

        let count = calls.len() as u64;
        let start_id = self.reserve_request_ids(count);
        let path = self.path();
        debug!(
            rpc.batch_start_id = start_id,
            rpc.batch_size = calls.len(),
            rpc.path = %path,
            "rpc batch call"
        );
        let requests: Vec<Value> = calls
            .into_iter()
            .enumerate()
            .map(|(offset, (method, params))| {
                Request::build(
                    method.as_ref(),
                    params,
                    start_id + offset as u64,
                    self.config.preserve_case,
                )
                .to_value()
            })
            .collect();

        let mut outbound = OutboundRequest::new(path, Value::Array(requests)).with_meta("Batch", "1");
        self.middleware.prepare(&mut outbound);

        let raw = match self.transport.send(&outbound).await {
            Ok(raw) => raw,
            Err(err) => return self.fail_batch(err.into()),
        };
        let items = match serde_json::from_str::<Value>(&raw.body) {
            Ok(Value::Array(items)) => items,
            Ok(envelope) if envelope.get("error").is_some_and(|e| !e.is_null()) => {
                let response = Response::from_parts(raw, envelope);
                return self.fail_batch(ClientError::remote_call(response));
            }
            Ok(_) => {
                return self.fail_batch(ClientError::Connection {
                    request: Box::new(outbound),
                    message: "batch response is not an array".to_owned(),
                })
            }
            Err(e) => {
                return self.fail_batch(ClientError::Connection {
                    request: Box::new(outbound),
                    message: format!("decode JSON-RPC batch response: {e}"),
                })
            }
        };

        let mut by_id = HashMap::with_capacity(items.len());
        for item in items {
            match parse_batch_id(item.get("id").unwrap_or(&Value::Null)) {
                Ok(id) => by_id.insert(id, item),
                Err(error) => return self.fail_batch(error),
            };
        }

        let mut ordered = Vec::with_capacity(count as usize);
        for id in start_id..start_id + count {
            let Some(item) = by_id.remove(&id) else {
                return self.fail_batch(ClientError::Generic(format!(
                    "missing JSON-RPC batch item id={id}"
                )));
            };
            let response = self
                .middleware
                .apply(&outbound, Response::from_parts(raw.clone(), item));
            if !response.has_error() {
                ordered.push(Ok(response));
                continue;
            }
            let fallback = response.clone();
            ordered.push(match self.handlers.handle(ClientError::remote_call(response)) {
                Some(error) => Err(error),
                None => Ok(fallback),
            });
        }
        Ok(ordered)
    }

    fn fail_batch(
        &self,
        error: ClientError,
    ) -> Result<Vec<Result<Response, ClientError>>, ClientError> {
        match self.handlers.handle(error) {
            Some(error) => Err(error),
            None => Ok(Vec::new()),
        }
    }
}

/// Outstanding async calls are still awaited after the client is gone;
/// failures without a callback are logged instead of returned.
impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.ledger.detach();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.config.dsn())
            .field("path", &self.path())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.ledger.len())
            .finish()
    }
}

/// Configures transport, handlers and middleware of a [`Client`].
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn HttpTransport>>,
    handlers: Option<Arc<HandlerChain>>,
    middleware: MiddlewareStack,
}

impl ClientBuilder {
    /// Send through `transport` instead of building a reqwest one.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share `handlers` instead of the default chain.
    pub fn handlers(mut self, handlers: Arc<HandlerChain>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Append to the middleware stack.
    pub fn middleware(mut self, middleware: Arc<dyn ResponseMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Replace the middleware stack, defaults included.
    pub fn middleware_stack(mut self, stack: MiddlewareStack) -> Self {
        self.middleware = stack;
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        Ok(Client {
            transport,
            config: self.config,
            handlers: self.handlers.unwrap_or_default(),
            middleware: self.middleware,
            next_id: AtomicU64::new(0),
            path: RwLock::new(ROOT_PATH.to_owned()),
            ledger: Ledger::default(),
        })
    }
}

/// Split a trailing, case-insensitive `async` off `name`.
///
/// The remaining method name must not be empty, so `"async"` itself is
/// a plain method name.
pub fn split_async_suffix(name: &str) -> (&str, bool) {
    const SUFFIX: &str = "async";

    if name.len() > SUFFIX.len() {
        let split = name.len() - SUFFIX.len();
        if let (Some(method), Some(tail)) = (name.get(..split), name.get(split..)) {
            if tail.eq_ignore_ascii_case(SUFFIX) {
                return (method, true);
            }
        }
    }
    (name, false)
}

/// Decide how one exchange ended. Used by foreground and background calls.
fn settle(
    handlers: &HandlerChain,
    middleware: &MiddlewareStack,
    request: &OutboundRequest,
    outcome: Result<RawResponse, TransportError>,
) -> Settled {
    let decoded = outcome
        .map_err(ClientError::from)
        .and_then(|raw| decode(request, raw));
    let error = match decoded {
        Ok(response) => {
            let response = middleware.apply(request, response);
            if !response.has_error() {
                return Settled::Success(response);
            }
            ClientError::remote_call(response)
        }
        Err(error) => error,
    };

    let fallback = error.response().cloned().unwrap_or_else(Response::empty);
    match handlers.handle(error) {
        Some(error) => Settled::Failure(error),
        None => Settled::Suppressed(fallback),
    }
}

fn decode(request: &OutboundRequest, raw: RawResponse) -> Result<Response, ClientError> {
    Response::from_raw(raw).map_err(|e| ClientError::Connection {
        request: Box::new(request.clone()),
        message: format!("decode JSON-RPC response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::handler::{ErrorOverrides, Handled};
    use crate::test_util::{
        balance_body, block_header_body, raw_transaction_error_body, GENESIS_HASH,
    };
    use crate::transport::mock::MockTransport;

    fn client_with(transport: MockTransport) -> (Client, Arc<MockTransport>) {
        client_with_config(transport, Config::default())
    }

    fn client_with_config(transport: MockTransport, config: Config) -> (Client, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let client = Client::builder(config)
            .transport(transport.clone())
            .build()
            .expect("client must build");
        (client, transport)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("custom remote failure")]
    struct CustomRemote;

    /// Captures formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A chain that suppresses everything and counts what it saw.
    fn suppressing_handlers() -> (Arc<HandlerChain>, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mut handlers = HandlerChain::new();
        handlers.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Handled::Suppress
        });
        (Arc::new(handlers), seen)
    }

    // ==============================================================================
    // Synchronous Calls
    // ==============================================================================

    #[tokio::test]
    async fn call_sends_lowercased_envelope_to_root() {
        let (client, transport) =
            client_with(MockTransport::builder().with_json(block_header_body()).build());

        let response = client
            .call("GetBlockHeader", GENESIS_HASH)
            .await
            .expect("call must succeed");
        assert_eq!(response["hash"], json!(GENESIS_HASH));

        let sent = transport.last_request().expect("one request");
        assert_eq!(sent.path, "/");
        assert_eq!(
            sent.body,
            json!({"method": "getblockheader", "params": [GENESIS_HASH], "id": 0})
        );
    }

    #[tokio::test]
    async fn preserve_case_keeps_method_name() {
        let config = Config {
            preserve_case: true,
            ..Config::default()
        };
        let (client, transport) = client_with_config(
            MockTransport::builder().with_json(block_header_body()).build(),
            config,
        );
        client
            .call("GetBlockHeader", GENESIS_HASH)
            .await
            .expect("call must succeed");
        assert_eq!(
            transport.last_request().and_then(|r| r.method().map(str::to_owned)),
            Some("GetBlockHeader".to_owned())
        );
    }

    #[tokio::test]
    async fn ids_increase_per_request() {
        let (client, transport) = client_with(
            MockTransport::builder()
                .with_json(balance_body())
                .with_json(balance_body())
                .build(),
        );
        assert_eq!(client.id(), 0);
        client.call("getbalance", ()).await.expect("first");
        client.call("getbalance", ()).await.expect("second");
        let ids: Vec<Value> = transport
            .history()
            .iter()
            .map(|r| r.body["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn ids_stay_gap_free_across_sync_and_async_calls() {
        let (client, transport) = client_with(
            MockTransport::builder()
                .with_json(balance_body())
                .with_json(balance_body())
                .with_json(balance_body())
                .with_json(balance_body())
                .build(),
        );

        client.call("getbalance", ()).await.expect("first sync");
        let first = client
            .call_async("getbalance", (), Callbacks::new())
            .expect("first async");
        client.call("getbalance", ()).await.expect("second sync");
        let second = client
            .call_async("getbalance", (), Callbacks::new())
            .expect("second async");
        client.wait().await.expect("no failures");

        assert_eq!((first.id(), second.id()), (1, 3));
        let mut ids: Vec<u64> = transport
            .history()
            .iter()
            .filter_map(|r| r.body["id"].as_u64())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(client.id(), 4);
    }

    #[tokio::test]
    async fn wallet_name_is_one_encoded_segment() {
        let (client, transport) =
            client_with(MockTransport::builder().with_json(balance_body()).build());
        client
            .wallet("cold/storage?x#1")
            .call("getbalance", ())
            .await
            .expect("call must succeed");
        assert_eq!(client.path(), "/wallet/cold%2Fstorage%3Fx%231");
        assert_eq!(
            transport.last_request().map(|r| r.path),
            Some("/wallet/cold%2Fstorage%3Fx%231".to_owned())
        );
    }

    #[tokio::test]
    async fn wallet_switches_path_for_later_calls() {
        let (client, transport) = client_with(
            MockTransport::builder()
                .with_json(balance_body())
                .with_json(balance_body())
                .build(),
        );
        let balance = client
            .wallet("testwallet")
            .call("getbalance", ())
            .await
            .expect("call must succeed");
        assert_eq!(balance.get(None), json!(0.1));
        assert_eq!(client.path(), "/wallet/testwallet");

        client.default_wallet().call("getbalance", ()).await.expect("root");
        let paths: Vec<String> = transport.history().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/wallet/testwallet", "/"]);
    }

    #[tokio::test]
    async fn empty_method_is_rejected_before_sending() {
        let (client, transport) = client_with(MockTransport::builder().build());
        let err = client.call("", ()).await.expect_err("empty method");
        assert!(matches!(err, ClientError::Generic(_)));
        assert!(transport.history().is_empty());
        assert_eq!(client.id(), 0);
    }

    #[tokio::test]
    async fn error_envelope_with_200_is_remote_call() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_json(raw_transaction_error_body())
                .build(),
        );
        let err = client
            .call("getrawtransaction", "abc")
            .await
            .expect_err("daemon error");
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        assert_eq!(err.code(), Some(-5));
        assert!(err.response().is_some_and(|r| r.has_error()));
    }

    #[tokio::test]
    async fn server_error_with_error_body_is_remote_call() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_status_json(StatusCode::INTERNAL_SERVER_ERROR, raw_transaction_error_body())
                .build(),
        );
        let err = client
            .call("getrawtransaction", "abc")
            .await
            .expect_err("daemon error");
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        assert_eq!(
            err.to_string(),
            "remote call failed (-5): No information available about transaction"
        );
    }

    #[tokio::test]
    async fn server_error_without_error_body_is_connection() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_status_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"result": null, "error": null, "id": 0}),
                )
                .with_failure("connection refused")
                .build(),
        );
        for _ in 0..2 {
            let err = client.call("getbalance", ()).await.expect_err("must fail");
            assert_eq!(err.kind(), ErrorKind::Connection);
            assert_eq!(err.request().map(|r| r.path.as_str()), Some("/"));
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_connection() {
        let (client, _) = client_with(MockTransport::builder().with_text("<html>").build());
        let err = client.call("getbalance", ()).await.expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("decode JSON-RPC response"));
    }

    #[tokio::test]
    async fn overrides_rebind_classified_errors() {
        let handlers = HandlerChain::new()
            .with_overrides(ErrorOverrides::new().on(ErrorKind::RemoteCall, |_| CustomRemote));
        let client = Client::builder(Config::default())
            .transport(Arc::new(
                MockTransport::builder()
                    .with_status_json(StatusCode::INTERNAL_SERVER_ERROR, raw_transaction_error_body())
                    .build(),
            ))
            .handlers(Arc::new(handlers))
            .build()
            .expect("client must build");

        let err = client.call("getrawtransaction", "abc").await.expect_err("must fail");
        assert_eq!(err.to_string(), "custom remote failure");
        assert_eq!(err.code(), Some(-5));
    }

    #[tokio::test]
    async fn suppressed_error_returns_error_envelope() {
        let mut handlers = HandlerChain::new();
        handlers.register(|error| match error.code() {
            Some(-5) => Handled::Suppress,
            _ => Handled::Pass,
        });
        let client = Client::builder(Config::default())
            .transport(Arc::new(
                MockTransport::builder()
                    .with_json(raw_transaction_error_body())
                    .build(),
            ))
            .handlers(Arc::new(handlers))
            .build()
            .expect("client must build");

        let response = client
            .call("getrawtransaction", "abc")
            .await
            .expect("suppressed error is not raised");
        assert_eq!(response.error_code(), Some(-5));
    }

    // ==============================================================================
    // Async Calls
    // ==============================================================================

    #[tokio::test]
    async fn call_async_fires_success_callback() {
        let (client, transport) =
            client_with(MockTransport::builder().with_json(block_header_body()).build());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        let pending = client
            .wallet("w1")
            .call_async(
                "getblockheader",
                GENESIS_HASH,
                Callbacks::new()
                    .on_success(move |response| {
                        *sink.lock().expect("lock") = Some(response.get("bits"));
                    })
                    .on_failure(|_| panic!("must not fail")),
            )
            .expect("call must start");
        assert_eq!(pending.id(), 0);
        assert_eq!(pending.method(), "getblockheader");

        client.wait().await.expect("no unhandled errors");
        assert!(pending.is_finished());
        assert_eq!(*seen.lock().expect("lock"), Some(json!("1d00ffff")));
        assert_eq!(transport.last_request().map(|r| r.path), Some("/wallet/w1".to_owned()));
    }

    #[tokio::test]
    async fn call_async_failure_goes_to_callback() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_status_json(StatusCode::INTERNAL_SERVER_ERROR, raw_transaction_error_body())
                .build(),
        );
        let code = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&code);
        client
            .call_async(
                "getrawtransaction",
                "abc",
                Callbacks::new().on_failure(move |error| {
                    *sink.lock().expect("lock") = error.code();
                }),
            )
            .expect("call must start");

        client.wait().await.expect("failure was handled by callback");
        assert_eq!(*code.lock().expect("lock"), Some(-5));
    }

    #[tokio::test]
    async fn wait_reports_unhandled_failures() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_failure("refused")
                .with_failure("refused")
                .with_json(balance_body())
                .build(),
        );
        for _ in 0..3 {
            client
                .call_async("getbalance", (), Callbacks::new())
                .expect("call must start");
        }
        assert_eq!(client.pending(), 3);

        let err = client.wait().await.expect_err("two calls failed");
        match err {
            ClientError::Unhandled(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| e.kind() == ErrorKind::Connection));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.pending(), 0);
        assert!(client.wait().await.is_ok());
    }

    #[tokio::test]
    async fn single_unhandled_failure_is_returned_as_is() {
        let (client, _) = client_with(MockTransport::builder().with_failure("refused").build());
        client
            .call_async("getbalance", (), Callbacks::new())
            .expect("call must start");
        let err = client.wait().await.expect_err("call failed");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn callbacks_fire_in_completion_order() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_json(json!({"result": "slow", "error": null, "id": 0}))
                .delayed(Duration::from_millis(200))
                .with_json(json!({"result": "fast", "error": null, "id": 1}))
                .build(),
        );
        let order = Arc::new(Mutex::new(Vec::new()));
        for method in ["first", "second"] {
            let sink = Arc::clone(&order);
            client
                .call_async(
                    method,
                    (),
                    Callbacks::new().on_success(move |response| {
                        sink.lock().expect("lock").push(response.to_string());
                    }),
                )
                .expect("call must start");
            // Let the first call take the delayed reply.
            tokio::task::yield_now().await;
        }
        client.close().await.expect("no failures");
        assert_eq!(*order.lock().expect("lock"), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn cancelled_call_fires_nothing() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_json(balance_body())
                .delayed(Duration::from_secs(30))
                .build(),
        );
        let pending = client
            .call_async(
                "getbalance",
                (),
                Callbacks::new()
                    .on_success(|_| panic!("cancelled"))
                    .on_failure(|_| panic!("cancelled")),
            )
            .expect("call must start");
        pending.cancel();
        client.wait().await.expect("cancellation is not a failure");
    }

    #[tokio::test]
    async fn dropped_client_still_awaits_and_logs_failures() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (client, _) = client_with(
            MockTransport::builder()
                .with_failure("connection refused")
                .delayed(Duration::from_millis(20))
                .build(),
        );
        client
            .call_async("getbalance", (), Callbacks::new())
            .expect("call must start");
        drop(client);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let output = logs.contents();
        assert!(output.contains("they finish detached"), "{output}");
        assert!(output.contains("unhandled failure of detached async call"), "{output}");
        assert!(output.contains("connection refused"), "{output}");
    }

    #[test]
    fn call_async_needs_a_runtime() {
        let (client, transport) = client_with(MockTransport::builder().build());
        let err = client
            .call_async("getbalance", (), Callbacks::new())
            .expect_err("no runtime");
        assert!(err.to_string().contains("Tokio runtime"));
        assert!(transport.history().is_empty());
    }

    // ==============================================================================
    // Name Routing
    // ==============================================================================

    #[test]
    fn async_suffix_detection() {
        assert_eq!(split_async_suffix("getblockasync"), ("getblock", true));
        assert_eq!(split_async_suffix("getBlockAsync"), ("getBlock", true));
        assert_eq!(split_async_suffix("getblock"), ("getblock", false));
        assert_eq!(split_async_suffix("async"), ("async", false));
        assert_eq!(split_async_suffix("ñasync"), ("ñ", true));
        assert_eq!(split_async_suffix("€"), ("€", false));
    }

    #[tokio::test]
    async fn invoke_routes_by_suffix() {
        let (client, transport) = client_with(
            MockTransport::builder()
                .with_json(balance_body())
                .with_json(balance_body())
                .build(),
        );
        let completed = client.invoke("getBalance", ()).await.expect("sync");
        assert!(matches!(completed, Invocation::Completed(ref r) if r.get(None) == json!(0.1)));

        let pending = client.invoke("getBalanceAsync", ()).await.expect("async");
        assert!(matches!(pending, Invocation::Pending(ref p) if p.method() == "getbalance"));
        client.wait().await.expect("no failures");

        let methods: Vec<Option<String>> = transport
            .history()
            .iter()
            .map(|r| r.method().map(str::to_owned))
            .collect();
        assert_eq!(
            methods,
            vec![Some("getbalance".to_owned()), Some("getbalance".to_owned())]
        );
    }

    // ==============================================================================
    // Batches
    // ==============================================================================

    #[tokio::test]
    async fn batch_reorders_by_id_and_marks_responses() {
        let (client, transport) = client_with(
            MockTransport::builder()
                .with_json(json!([
                    {"result": null, "error": {"code": -5, "message": "missing"}, "id": "2"},
                    {"result": 100, "error": null, "id": 0},
                    {"result": "hash", "error": null, "id": 1},
                ]))
                .build(),
        );
        let results = client
            .batch(vec![
                ("getblockcount", json!([])),
                ("getblockhash", json!([100])),
                ("getrawtransaction", json!(["abc"])),
            ])
            .await
            .expect("batch exchange must succeed");

        assert_eq!(results.len(), 3);
        let count = results[0].as_ref().expect("first ok");
        assert_eq!(count.get(None), json!(100));
        assert_eq!(count.header_line("x-meta-batch"), "1");
        assert_eq!(results[1].as_ref().map(|r| r.get(None)).ok(), Some(json!("hash")));
        assert_eq!(results[2].as_ref().err().and_then(ClientError::code), Some(-5));

        let sent = transport.last_request().expect("one request");
        assert_eq!(sent.meta.get("Batch").map(String::as_str), Some("1"));
        assert_eq!(sent.body.as_array().map(Vec::len), Some(3));
        assert_eq!(client.id(), 3);
    }

    #[tokio::test]
    async fn batch_rejects_missing_items() {
        let (client, _) = client_with(
            MockTransport::builder()
                .with_json(json!([{"result": 1, "error": null, "id": 0}]))
                .build(),
        );
        let err = client
            .batch([("a", ()), ("b", ())])
            .await
            .expect_err("second item missing");
        assert!(err.to_string().contains("missing JSON-RPC batch item id=1"));
    }

    #[tokio::test]
    async fn batch_reply_defects_go_through_the_handler_chain() {
        let replies = [
            // id 1 never comes back
            json!([{"result": 1, "error": null, "id": 0}]),
            // parse errors are answered with a null id
            json!([{"result": null, "error": {"code": -32700, "message": "Parse error"}, "id": null}]),
        ];
        for reply in replies {
            let (handlers, seen) = suppressing_handlers();
            let client = Client::builder(Config::default())
                .transport(Arc::new(MockTransport::builder().with_json(reply).build()))
                .handlers(handlers)
                .build()
                .expect("client must build");

            let results = client
                .batch([("a", ()), ("b", ())])
                .await
                .expect("suppressed failure is not raised");
            assert!(results.is_empty());
            assert_eq!(seen.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn batch_exchange_failure_is_outer_error() {
        let (client, _) = client_with(MockTransport::builder().with_failure("refused").build());
        let err = client
            .batch([("getblockcount", ())])
            .await
            .expect_err("exchange failed");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let (client, transport) = client_with(MockTransport::builder().build());
        let results = client
            .batch(Vec::<(&str, Value)>::new())
            .await
            .expect("empty batch");
        assert!(results.is_empty());
        assert!(transport.history().is_empty());
    }
}
