use std::error::Error as _;
use std::future::Future;

use crate::CallRequest;

/// Fully-read upstream response of a single attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Network-level failure before a complete response was received.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Request/response primitive the executor drives.
///
/// Implementations must not apply their own retry. The executor bounds every
/// call with its per-attempt timeout and drops the returned future when the
/// timeout fires, which aborts whatever the call holds open.
pub trait RemoteCall: Send + Sync {
    fn call(
        &self,
        request: &CallRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

impl<T: RemoteCall> RemoteCall for &T {
    fn call(
        &self,
        request: &CallRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        (**self).call(request)
    }
}

/// [`RemoteCall`] over HTTP POST using `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses an existing client (connection pool, proxy settings).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl RemoteCall for HttpTransport {
    async fn call(&self, request: &CallRequest) -> Result<RawResponse, TransportError> {
        let response = self
            .http
            .post(request.target())
            .headers(request.headers().clone())
            .body(request.payload().to_vec())
            .send()
            .await
            .map_err(describe)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(describe)?;
        Ok(RawResponse { status, body })
    }
}

fn describe(err: reqwest::Error) -> TransportError {
    let kind = if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "response body failed"
    } else {
        "request failed"
    };
    // reqwest's Display omits the root cause; walk the source chain for it.
    let mut message = format!("{kind}: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    TransportError(message)
}
