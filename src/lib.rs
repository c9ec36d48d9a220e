//! `gemini-relay` relays a client prompt to the Gemini `generateContent` API,
//! injecting a server-held API key so the credential never reaches the browser.
//!
//! The core is [`Executor`], a resilient remote call: one upstream call at a
//! time, a per-attempt timeout, and jittered exponential backoff on 429, 5xx,
//! and transport failures. [`RelayHandler`] is the thin adapter around it:
//! - [`RelayHandler::handle`] gates the method, answers CORS preflight,
//!   builds the Gemini payload, and maps the result onto an HTTP status.
//! - [`server::router`] mounts the handler on `axum` (feature `server`).

mod config;
mod error;
mod executor;
pub mod gemini;
mod handler;
mod options;
mod outcome;
mod request;
mod transport;

#[cfg(feature = "server")]
pub mod server;

pub use config::RelayConfig;
pub use error::{ErrorKind, RelayError};
pub use executor::Executor;
pub use handler::{RelayHandler, RelayResponse};
pub use options::RetryPolicy;
pub use outcome::{
    classify, AttemptOutcome, CallResponse, CallResult, RetryCause, DEFAULT_SUCCESS_RANGE,
};
pub use request::CallRequest;
pub use transport::{HttpTransport, RawResponse, RemoteCall, TransportError};

pub type Result<T> = std::result::Result<T, RelayError>;
