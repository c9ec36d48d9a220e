use std::fmt;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::{RelayError, Result};

const REDACTED_HEADERS: [&str; 2] = ["x-goog-api-key", "authorization"];

/// Immutable description of one remote call: where, what, and with which headers.
#[derive(Clone)]
pub struct CallRequest {
    target: String,
    payload: Vec<u8>,
    headers: HeaderMap,
}

impl fmt::Debug for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if REDACTED_HEADERS.contains(&name.as_str()) {
                    "<redacted>"
                } else {
                    value.to_str().unwrap_or("<binary>")
                };
                (name.as_str(), shown)
            })
            .collect();
        f.debug_struct("CallRequest")
            .field("target", &self.target)
            .field("payload_len", &self.payload.len())
            .field("headers", &headers)
            .finish()
    }
}

impl CallRequest {
    /// Creates a request with a raw payload and no headers.
    pub fn new(target: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            target: target.into(),
            payload: payload.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Serializes `body` as JSON and sets `Content-Type: application/json`.
    pub fn json<T: Serialize + ?Sized>(target: impl Into<String>, body: &T) -> Result<Self> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| RelayError::InvalidRequest(format!("payload serialization: {err}")))?;
        let mut request = Self::new(target, payload);
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(request)
    }

    /// Adds a header, replacing any previous value with the same name.
    pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| RelayError::InvalidRequest(format!("header name '{name}': {err}")))?;
        let mut value = HeaderValue::from_str(value.as_ref())
            .map_err(|err| RelayError::InvalidRequest(format!("header '{name}': {err}")))?;
        if REDACTED_HEADERS.contains(&name.as_str()) {
            value.set_sensitive(true);
        }
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Rejects requests without a target or payload.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(RelayError::InvalidRequest("target must not be empty".to_owned()));
        }
        if self.payload.is_empty() {
            return Err(RelayError::InvalidRequest(
                "payload must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}
