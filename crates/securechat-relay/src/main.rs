//! SecureChat relay server.
//!
//! Password-gated, ephemeral chat rooms over WebSocket. Nothing is persisted:
//! a room lives exactly as long as it has members.

use tracing_subscriber::EnvFilter;

use securechat_relay::{RelayState, config::RelayConfig, error::RelayError};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::load()?;
    let addr = config.bind.clone();
    let state = RelayState::new(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!("SecureChat relay listening on {addr}");
    tracing::info!("Static files: {}", state.config.static_dir.display());
    tracing::info!("WebSocket:    ws://{addr}/ws/{{room_id}}/{{username}}");
    tracing::info!("API:          http://{addr}/api/");

    securechat_relay::serve(listener, state, securechat_relay::shutdown_signal()).await?;
    tracing::info!("SecureChat relay stopped");
    Ok(())
}
