use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Url};
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{ClientError, TransportError};
use crate::response::RawResponse;

use super::{HttpTransport, OutboundRequest};

/// Bitcoin Core JSON-RPC transport over HTTP(S).
///
/// Connections are pooled per host. Requests are sent with basic auth when
/// the configuration resolves credentials.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
    auth: Option<(String, String)>,
}

impl ReqwestTransport {
    /// Build a transport for the daemon at `config.dsn()`.
    ///
    /// Credentials are resolved once, here. A configured CA file that exists
    /// is added as an extra trusted root.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let auth = config.auth()?;
        let dsn = config.dsn();
        let base_url = Url::parse(&dsn).map_err(|e| {
            ClientError::configuration(config.fragment(), format!("invalid daemon address `{dsn}`: {e}"))
        })?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(32)
            .tcp_nodelay(true);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(ca) = config.ca_file() {
            let pem = std::fs::read(ca).map_err(|e| {
                ClientError::configuration(
                    config.fragment(),
                    format!("failed to read CA file {}: {e}", ca.display()),
                )
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ClientError::configuration(
                    config.fragment(),
                    format!("invalid CA file {}: {e}", ca.display()),
                )
            })?;
            builder = builder.add_root_certificate(certificate);
        }
        let client = builder.build().map_err(|e| {
            ClientError::configuration(config.fragment(), format!("build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        let url = self.base_url.join(&request.path).map_err(|e| {
            TransportError::new(
                request.clone(),
                format!("invalid request path `{}`: {e}", request.path),
            )
        })?;

        let mut builder = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request.body);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(request.clone(), format!("HTTP error: {e}")))?;
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(request.clone(), format!("read response body: {e}")))?;
        debug!(rpc.path = %request.path, %status, body_len = body.len(), "rpc response");
        trace!(rpc.path = %request.path, body = %body, "rpc response body");

        let raw = RawResponse {
            status,
            version,
            headers,
            body,
        };
        if status.is_client_error() || status.is_server_error() {
            return Err(
                TransportError::new(request.clone(), format!("daemon responded with {status}"))
                    .with_response(raw),
            );
        }
        Ok(raw)
    }
}
