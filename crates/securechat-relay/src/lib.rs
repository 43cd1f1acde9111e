//! SecureChat relay server.
//!
//! Serves the web client, a small JSON API and one WebSocket route per room.
//! All room state lives in [`securechat_core::RoomRegistry`].

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod relay;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use securechat_core::{RoomRegistry, TokenIssuer};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// Notice broadcast to every room when the process is stopping.
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down. This room will be closed.";

/// Shared relay state.
pub struct RelayState {
    pub registry: Arc<RoomRegistry>,
    pub tokens: Arc<TokenIssuer>,
    pub config: RelayConfig,
    /// Server start time (for uptime reporting).
    pub start_time: Instant,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        let registry = RoomRegistry::new(config.limits.clone());
        let tokens = Arc::new(TokenIssuer::new(config.limits.token_ttl()));
        Arc::new(Self {
            registry,
            tokens,
            config,
            start_time: Instant::now(),
        })
    }
}

pub fn router(state: Arc<RelayState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    Router::new()
        .route("/ws/{room_id}/{username}", get(relay::ws_handler))
        .route("/health", get(api::health))
        .route("/api/verify-room", post(api::verify_room))
        .route("/api/handshake", post(api::handshake))
        .route("/api/status", get(api::status))
        .fallback_service(
            tower_http::services::ServeDir::new(&static_dir)
                .fallback(tower_http::services::ServeFile::new(static_dir.join("index.html"))),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically drop handshake tokens nobody redeemed.
pub fn spawn_token_sweeper(state: &Arc<RelayState>) -> tokio::task::JoinHandle<()> {
    let tokens = state.tokens.clone();
    let period = state.config.token_sweep();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = tokens.purge_expired();
            if purged > 0 {
                tracing::debug!("purged {purged} expired handshake token(s)");
            }
        }
    })
}

/// Tell every room we are going away. Bounded by the configured grace.
pub async fn notify_shutdown(state: &RelayState) {
    let grace = state.config.shutdown_grace();
    if tokio::time::timeout(grace, state.registry.shutdown(SHUTDOWN_NOTICE))
        .await
        .is_err()
    {
        warn!("shutdown notice not delivered to all rooms within {grace:?}");
    }
}

/// Serve until `shutdown` resolves, then notify rooms and drain.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RelayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RelayError> {
    let sweeper = spawn_token_sweeper(&state);
    let app = router(state.clone());
    let grace = state.config.shutdown_grace() + state.config.send_timeout();

    let notify_state = state.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.await;
        info!("shutdown requested");
        notify_shutdown(&notify_state).await;
    });

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = server.await;
        let _ = done_tx.send(());
        result
    });

    // Sockets that ignore the close are cut off once the grace runs out.
    let _ = done_rx.await;
    sweeper.abort();
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(result)) => result.map_err(RelayError::Serve),
        Ok(Err(join)) => {
            warn!("server task failed: {join}");
            Ok(())
        }
        Err(_) => {
            warn!("connections still open after {grace:?}; exiting anyway");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C or (on Unix) SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
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
