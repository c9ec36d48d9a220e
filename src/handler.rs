use reqwest::Method;
use serde_json::json;

use crate::{
    gemini::RelayPrompt, CallRequest, Executor, HttpTransport, RelayConfig, RelayError,
    RemoteCall, Result,
};

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";

/// Response produced by [`RelayHandler::handle`], independent of any HTTP framework.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelayResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl RelayResponse {
    fn new(status: u16, allowed_origin: &str, body: String) -> Self {
        let mut headers = vec![
            ("access-control-allow-origin", allowed_origin.to_owned()),
            ("access-control-allow-methods", ALLOW_METHODS.to_owned()),
            ("access-control-allow-headers", ALLOW_HEADERS.to_owned()),
        ];
        if !body.is_empty() {
            headers.push(("content-type", "application/json".to_owned()));
        }
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the first header value with `name` (lowercase).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Thin adapter: inbound method + body → Gemini call → relay response.
#[derive(Debug)]
pub struct RelayHandler<T> {
    config: RelayConfig,
    endpoint: String,
    executor: Executor<T>,
}

impl RelayHandler<HttpTransport> {
    /// Creates a handler that calls Gemini over HTTP.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        Self::new(config, HttpTransport::new())
    }
}

impl<T: RemoteCall> RelayHandler<T> {
    pub fn new(config: RelayConfig, transport: T) -> Result<Self> {
        let executor = Executor::new(transport, config.policy.clone())?;
        Ok(Self {
            endpoint: config.endpoint(),
            config,
            executor,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor<T> {
        &self.executor
    }

    /// Handles one inbound request.
    ///
    /// `OPTIONS` answers the CORS preflight, any other non-`POST` method is
    /// rejected with 405, and everything else is relayed.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> RelayResponse {
        let origin = &self.config.allowed_origin;

        if *method == Method::OPTIONS {
            return RelayResponse::new(200, origin, String::new());
        }
        if *method != Method::POST {
            return RelayResponse::new(
                405,
                origin,
                json!({ "error": "Method not allowed" }).to_string(),
            );
        }

        match self.relay(body).await {
            Ok(upstream_body) => RelayResponse::new(200, origin, upstream_body),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(status = err.status_code(), error = %err, "relay request failed");
                RelayResponse::new(err.status_code(), origin, error_body(&err))
            }
        }
    }

    async fn relay(&self, body: &[u8]) -> Result<String> {
        let call = self.prepare(body)?;
        let response = self.executor.execute(&call).await?;
        Ok(response.body)
    }

    /// Everything that can fail before the executor runs.
    fn prepare(&self, body: &[u8]) -> Result<CallRequest> {
        let api_key = self.config.require_api_key()?;
        let prompt = RelayPrompt::from_json(body)?;
        prompt.to_call(&self.endpoint, api_key)
    }
}

fn error_body(err: &RelayError) -> String {
    match err {
        RelayError::UpstreamClient { status, body } => {
            let details = serde_json::from_str::<serde_json::Value>(body)
                .unwrap_or_else(|_| serde_json::Value::String(body.clone()));
            json!({
                "error": format!("upstream returned status {status}"),
                "details": details,
            })
        }
        other => json!({ "error": other.to_string() }),
    }
    .to_string()
}
