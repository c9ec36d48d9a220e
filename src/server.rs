//! `axum` surface for [`RelayHandler`].
//!
//! Enabled with the `server` feature.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};

use crate::{RelayHandler, RelayResponse, RemoteCall};

/// Path the relay is mounted on.
pub const RELAY_PATH: &str = "/api/gemini";

/// Builds a router with the relay mounted at [`RELAY_PATH`] for every method.
///
/// Method gating stays in [`RelayHandler::handle`] so that preflight and 405
/// responses carry the same CORS headers as relayed ones.
pub fn router<T>(handler: Arc<RelayHandler<T>>) -> Router
where
    T: RemoteCall + 'static,
{
    Router::new()
        .route(RELAY_PATH, any(relay::<T>))
        .with_state(handler)
}

async fn relay<T>(
    State(handler): State<Arc<RelayHandler<T>>>,
    method: Method,
    body: Bytes,
) -> Response
where
    T: RemoteCall + 'static,
{
    into_response(handler.handle(&method, &body).await)
}

fn into_response(response: RelayResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let headers: HeaderMap = response
        .headers
        .into_iter()
        .filter_map(|(name, value)| {
            let value = HeaderValue::from_str(&value).ok()?;
            Some((HeaderName::from_static(name), value))
        })
        .collect();
    (status, headers, response.body).into_response()
}
