use std::sync::Arc;

use gemini_relay::{server, RelayConfig, RelayHandler};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gemini_relay=info".into()))
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .init();

    let config = RelayConfig::from_env()?;
    let bind = std::env::var("RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_owned());

    if config.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; every relay request will fail with 500");
    }
    info!(
        model = %config.model,
        api_base = %config.api_base,
        allowed_origin = %config.allowed_origin,
        max_attempts = config.policy.max_attempts,
        attempt_timeout_ms = config.policy.attempt_timeout_ms,
        "configuration loaded"
    );

    let handler = Arc::new(RelayHandler::from_config(config)?);
    let app = server::router(handler);

    let listener = TcpListener::bind(&bind).await?;
    info!(address = %listener.local_addr()?, path = server::RELAY_PATH, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
