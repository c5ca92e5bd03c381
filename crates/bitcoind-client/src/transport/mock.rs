use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::TransportError;
use crate::response::RawResponse;

use super::{HttpTransport, OutboundRequest};

enum Outcome {
    Respond(RawResponse),
    Fail {
        message: String,
        response: Option<RawResponse>,
    },
}

struct Reply {
    delay: Option<Duration>,
    outcome: Outcome,
}

/// A mock transport for testing. Replays canned replies in queue order and
/// records every request it was handed.
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    history: Mutex<Vec<OutboundRequest>>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder {
            replies: VecDeque::new(),
        }
    }

    /// Requests received so far, oldest first.
    pub fn history(&self) -> Vec<OutboundRequest> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<OutboundRequest> {
        self.history().pop()
    }
}

pub struct MockTransportBuilder {
    replies: VecDeque<Reply>,
}

impl MockTransportBuilder {
    /// Queue a `200 OK` JSON reply.
    pub fn with_json(self, body: Value) -> Self {
        self.with_status_json(StatusCode::OK, body)
    }

    /// Queue a JSON reply with `status`. 4xx and 5xx statuses fail the way
    /// a real transport does.
    pub fn with_status_json(mut self, status: StatusCode, body: Value) -> Self {
        let raw = RawResponse::json(status, body.to_string());
        let outcome = if status.is_client_error() || status.is_server_error() {
            Outcome::Fail {
                message: format!("daemon responded with {status}"),
                response: Some(raw),
            }
        } else {
            Outcome::Respond(raw)
        };
        self.replies.push_back(Reply {
            delay: None,
            outcome,
        });
        self
    }

    /// Queue a `200 OK` reply with a non-JSON body.
    pub fn with_text(mut self, body: &str) -> Self {
        self.replies.push_back(Reply {
            delay: None,
            outcome: Outcome::Respond(RawResponse::json(StatusCode::OK, body)),
        });
        self
    }

    /// Queue a failure without any response, like a refused connection.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.replies.push_back(Reply {
            delay: None,
            outcome: Outcome::Fail {
                message: message.to_owned(),
                response: None,
            },
        });
        self
    }

    /// Delay the most recently queued reply.
    pub fn delayed(mut self, delay: Duration) -> Self {
        if let Some(reply) = self.replies.back_mut() {
            reply.delay = Some(delay);
        }
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            replies: Mutex::new(self.replies),
            history: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        if let Ok(mut history) = self.history.lock() {
            history.push(request.clone());
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front());
        let Some(reply) = reply else {
            return Err(TransportError::new(request.clone(), "no mock reply queued"));
        };

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        match reply.outcome {
            Outcome::Respond(raw) => Ok(raw),
            Outcome::Fail { message, response } => {
                let failure = TransportError::new(request.clone(), message);
                Err(match response {
                    Some(raw) => failure.with_response(raw),
                    None => failure,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn replies_in_queue_order_and_records_history() {
        let transport = MockTransport::builder()
            .with_json(json!({"result": 1, "error": null, "id": 0}))
            .with_status_json(StatusCode::NOT_FOUND, json!({"result": null}))
            .build();

        let first = OutboundRequest::new("/", json!({"method": "a"}));
        let second = OutboundRequest::new("/wallet/w", json!({"method": "b"}));
        let ok = transport.send(&first).await.expect("first reply succeeds");
        assert_eq!(ok.status, StatusCode::OK);

        let err = transport.send(&second).await.expect_err("404 must fail");
        assert_eq!(
            err.response.map(|raw| raw.status),
            Some(StatusCode::NOT_FOUND)
        );

        let err = transport.send(&first).await.expect_err("queue exhausted");
        assert!(err.response.is_none());

        let history = transport.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].path, "/wallet/w");
        assert_eq!(transport.last_request(), Some(first));
    }
}
