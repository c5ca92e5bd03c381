//! The daemon's reply: HTTP message plus decoded JSON-RPC envelope.
//!
//! A [`Response`] wraps the raw HTTP response and the decoded body
//! (`{"result": ..., "error": ..., "id": ...}`). Path queries address the
//! `result` member, so `response.get("tx.0")` reads `result.tx[0]`.
//! Responses are immutable: message setters return modified copies and the
//! container refuses writes.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Version};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ClientError;
use crate::path::{self, PathError};

static NULL: Value = Value::Null;

/// An HTTP response exactly as the transport received it.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// A JSON response with the given status and body.
    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            version: Version::HTTP_11,
            headers,
            body: body.into(),
        }
    }
}

/// Decoded JSON-RPC reply.
#[derive(Debug, Clone)]
pub struct Response {
    raw: RawResponse,
    container: Arc<Value>,
    current: Option<String>,
}

impl Response {
    /// Decode the body of `raw` as a JSON-RPC envelope.
    pub fn from_raw(raw: RawResponse) -> Result<Self, serde_json::Error> {
        let container = serde_json::from_str(&raw.body)?;
        Ok(Self::from_parts(raw, container))
    }

    pub(crate) fn from_parts(raw: RawResponse, container: Value) -> Self {
        Self {
            raw,
            container: Arc::new(container),
            current: None,
        }
    }

    /// Build a response around an already decoded envelope. The HTTP side is
    /// a synthetic `200 OK` carrying the envelope as its body.
    pub fn from_container(container: Value) -> Self {
        let raw = RawResponse::json(StatusCode::OK, container.to_string());
        Self::from_parts(raw, container)
    }

    /// Envelope with neither result nor error.
    pub fn empty() -> Self {
        Self::from_container(Value::Object(Map::new()))
    }

    // ==============================================================================
    // Envelope
    // ==============================================================================

    /// The whole decoded body.
    pub fn container(&self) -> &Value {
        &self.container
    }

    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// The `error` member, unless absent or null.
    pub fn error(&self) -> Option<&Value> {
        non_null(self.container.get("error"))
    }

    /// `error.code`, when the daemon sent a numeric one.
    pub fn error_code(&self) -> Option<i64> {
        self.error()?.get("code")?.as_i64()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error()?.get("message")?.as_str()
    }

    pub fn has_result(&self) -> bool {
        self.result().is_some()
    }

    /// The `result` member, unless absent or null.
    pub fn result(&self) -> Option<&Value> {
        non_null(self.container.get("result"))
    }

    pub fn id(&self) -> Option<&Value> {
        non_null(self.container.get("id"))
    }

    fn result_or_null(&self) -> &Value {
        self.result().unwrap_or(&NULL)
    }

    // ==============================================================================
    // Path Queries
    // ==============================================================================

    /// A view of this response whose queries are relative to `key`.
    ///
    /// Views nest: `response.key("a").key("b")` addresses `result.a.b`.
    pub fn key(&self, key: &str) -> Self {
        let mut view = self.clone();
        view.current = self.full_key(Some(key));
        view
    }

    /// The path prefix set by [`Response::key`], if any.
    pub fn current_key(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn full_key(&self, key: Option<&str>) -> Option<String> {
        match (self.current.as_deref(), key) {
            (Some(current), Some(key)) => Some(format!("{current}.{key}")),
            (Some(current), None) => Some(current.to_owned()),
            (None, key) => key.map(str::to_owned),
        }
    }

    pub fn get<'k>(&self, key: impl Into<Option<&'k str>>) -> Value {
        path::get(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    /// True when the addressed value exists and is not null.
    pub fn has<'k>(&self, key: impl Into<Option<&'k str>>) -> bool {
        path::has(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    /// True when the addressed value exists, null or not.
    pub fn exists<'k>(&self, key: impl Into<Option<&'k str>>) -> bool {
        path::exists(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn count<'k>(&self, key: impl Into<Option<&'k str>>) -> Result<usize, PathError> {
        path::count(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn keys<'k>(&self, key: impl Into<Option<&'k str>>) -> Result<Vec<Value>, PathError> {
        path::keys(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn values<'k>(&self, key: impl Into<Option<&'k str>>) -> Result<Vec<Value>, PathError> {
        path::values(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn contains<'k>(
        &self,
        needle: &Value,
        key: impl Into<Option<&'k str>>,
    ) -> Result<bool, PathError> {
        path::contains(
            self.result_or_null(),
            needle,
            self.full_key(key.into()).as_deref(),
        )
    }

    pub fn first<'k>(&self, key: impl Into<Option<&'k str>>) -> Value {
        path::first(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn last<'k>(&self, key: impl Into<Option<&'k str>>) -> Value {
        path::last(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn flatten<'k>(&self, key: impl Into<Option<&'k str>>) -> Vec<Value> {
        path::flatten(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    pub fn sum<'k>(&self, key: impl Into<Option<&'k str>>) -> f64 {
        path::sum(self.result_or_null(), self.full_key(key.into()).as_deref())
    }

    /// Up to `number` randomly chosen children of the addressed value.
    pub fn random<'k>(&self, number: usize, key: impl Into<Option<&'k str>>) -> Value {
        path::random(
            self.result_or_null(),
            number,
            self.full_key(key.into()).as_deref(),
        )
    }

    /// Decode the addressed value into `T`.
    pub fn result_as<'k, T: DeserializeOwned>(
        &self,
        key: impl Into<Option<&'k str>>,
    ) -> Result<T, ClientError> {
        let key = self.full_key(key.into());
        serde_json::from_value(path::get(self.result_or_null(), key.as_deref())).map_err(|e| {
            ClientError::Decode(format!("`{}`: {e}", key.as_deref().unwrap_or("result")))
        })
    }

    /// Always fails: responses are read-only.
    pub fn try_insert(&mut self, _key: &str, _value: Value) -> Result<(), PathError> {
        Err(PathError::ReadOnly)
    }

    /// Always fails: responses are read-only.
    pub fn try_remove(&mut self, _key: &str) -> Result<Value, PathError> {
        Err(PathError::ReadOnly)
    }

    // ==============================================================================
    // HTTP Message
    // ==============================================================================

    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    pub fn status(&self) -> StatusCode {
        self.raw.status
    }

    /// Canonical reason phrase for the status code, if one exists.
    pub fn reason_phrase(&self) -> Option<&'static str> {
        self.raw.status.canonical_reason()
    }

    pub fn version(&self) -> Version {
        self.raw.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.raw.headers.contains_key(name)
    }

    /// All values of header `name`. Values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.raw
            .headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Values of header `name` joined with `", "`; empty when absent.
    pub fn header_line(&self, name: &str) -> String {
        self.header(name).join(", ")
    }

    /// The undecoded body text.
    pub fn body(&self) -> &str {
        &self.raw.body
    }

    pub fn with_status(&self, status: StatusCode) -> Self {
        let mut copy = self.clone();
        copy.raw.status = status;
        copy
    }

    pub fn with_version(&self, version: Version) -> Self {
        let mut copy = self.clone();
        copy.raw.version = version;
        copy
    }

    /// Copy with header `name` replaced by `value`.
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut copy = self.clone();
        copy.raw.headers.insert(name, value);
        copy
    }

    /// Copy with `value` appended to header `name`.
    pub fn with_added_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut copy = self.clone();
        copy.raw.headers.append(name, value);
        copy
    }

    pub fn without_header(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.raw.headers.remove(name);
        copy
    }

    /// Copy with a different body text. The decoded container is kept as is.
    pub fn with_body(&self, body: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.raw.body = body.into();
        copy
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !value.is_null())
}

/// Reads `result.<key>`; missing paths yield `Null`.
impl Index<&str> for Response {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        path::lookup(self.result_or_null(), key).unwrap_or(&NULL)
    }
}

/// Renders the value at the current key (or the whole result): strings
/// verbatim, null as nothing, everything else as JSON.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get(None) {
            Value::Null => Ok(()),
            Value::String(text) => f.write_str(&text),
            other => write!(f, "{other}"),
        }
    }
}

/// Only the decoded envelope is serialized; HTTP details are not.
impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.container.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_container)
    }
}
