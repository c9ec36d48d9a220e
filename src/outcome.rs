use std::ops::RangeInclusive;

use crate::RelayError;

/// Status range treated as success when none is configured.
pub const DEFAULT_SUCCESS_RANGE: RangeInclusive<u16> = 200..=299;

/// Successful upstream response, passed through unvalidated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallResponse {
    pub status: u16,
    pub body: String,
}

/// Final result of one executor invocation.
pub type CallResult = std::result::Result<CallResponse, RelayError>;

/// Why an attempt is eligible for another try.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryCause {
    /// HTTP 429.
    RateLimited { status: u16 },
    /// HTTP 5xx.
    ServerError { status: u16 },
    /// Timeout or network error before any response arrived.
    Transport { message: String },
}

impl RetryCause {
    /// Upstream status behind the retry, `None` for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status } | Self::ServerError { status } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}

/// Classification of a single attempt.
#[derive(Clone, Debug)]
pub enum AttemptOutcome {
    Success(CallResponse),
    Retryable(RetryCause),
    Terminal(RelayError),
}

/// Classifies a completed HTTP exchange.
///
/// 429 and anything >= 500 are retryable; every other status outside
/// `success` ends the invocation with the upstream status and body.
pub fn classify(status: u16, body: String, success: &RangeInclusive<u16>) -> AttemptOutcome {
    if success.contains(&status) {
        return AttemptOutcome::Success(CallResponse { status, body });
    }
    match status {
        429 => AttemptOutcome::Retryable(RetryCause::RateLimited { status }),
        status if status >= 500 => AttemptOutcome::Retryable(RetryCause::ServerError { status }),
        _ => AttemptOutcome::Terminal(RelayError::UpstreamClient { status, body }),
    }
}
