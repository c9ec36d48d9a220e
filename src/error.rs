/// Coarse classification of a terminal failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Required setup (credential, policy) is missing or invalid.
    Configuration,
    /// Inbound request could not be turned into a call.
    InvalidRequest,
    /// Upstream rejected the call with a non-retryable 4xx status.
    UpstreamClient,
    /// Every attempt was spent on a retryable status (429 / 5xx).
    RetriesExhausted,
    /// Every attempt was spent and the last one failed before a response arrived.
    TransportFailure,
}

/// Error type returned by this crate.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    /// Required setup is absent; reported before any attempt is made.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Call request or inbound payload failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Inbound body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Non-retryable HTTP status with the raw upstream body.
    #[error("upstream error {status}: {body}")]
    UpstreamClient { status: u16, body: String },
    /// All attempts consumed without success.
    ///
    /// `last_transport_error` is only set when the final attempt failed at the
    /// transport level (timeout or network error). Exhaustion on 429/5xx keeps
    /// no upstream detail.
    #[error("{}", exhausted_message(.last_transport_error))]
    RetriesExhausted {
        attempts: u32,
        last_transport_error: Option<String>,
    },
}

fn exhausted_message(last_transport_error: &Option<String>) -> String {
    match last_transport_error {
        Some(message) => message.clone(),
        None => "maximum retries exceeded".to_owned(),
    }
}

impl RelayError {
    /// Returns the taxonomy tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidRequest(_) | Self::Decode(_) => ErrorKind::InvalidRequest,
            Self::UpstreamClient { .. } => ErrorKind::UpstreamClient,
            Self::RetriesExhausted {
                last_transport_error: Some(_),
                ..
            } => ErrorKind::TransportFailure,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
        }
    }

    /// HTTP status the relay answers with for this error.
    ///
    /// Upstream client errors keep the upstream status and exhaustion maps to
    /// 504. Everything raised before the first upstream attempt is a 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::InvalidRequest(_) | Self::Decode(_) => 500,
            Self::UpstreamClient { status, .. } => *status,
            Self::RetriesExhausted { .. } => 504,
        }
    }

    /// Upstream status carried by this error, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamClient { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream body carried by this error, if any.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            Self::UpstreamClient { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }
}
