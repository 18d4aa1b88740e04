//! `TaxdeskServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use taxdesk_auth::TokenVerifier;
use taxdesk_core::DomainEvent;
use taxdesk_store::{Database, MessageRepo, UserRepo};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::event_bridge::EventBridge;
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Transport-level frame limit as a multiple of the policy limit, so
/// oversized frames reach the session and get a 4003 close.
const TRANSPORT_LIMIT_FACTOR: usize = 4;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live push connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Domain event to notification fan-out.
    pub dispatcher: Arc<NotificationDispatcher>,
    /// User directory.
    pub users: Arc<UserRepo>,
    /// Message log.
    pub messages: Arc<MessageRepo>,
    /// Token verifier shared by the push channel and the REST API.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Domain event bus.
    pub events: broadcast::Sender<DomainEvent>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The taxdesk server.
pub struct TaxdeskServer {
    state: AppState,
}

impl TaxdeskServer {
    /// Create a new server over `db`, authenticating with `verifier`.
    pub fn new(
        config: ServerConfig,
        db: Database,
        verifier: Arc<dyn TokenVerifier>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(verifier.clone(), config.max_connections_per_user));
        let dispatcher = Arc::new(NotificationDispatcher::new(registry.clone()));
        let (events, _) = broadcast::channel(config.event_bus_capacity.max(1));
        let state = AppState {
            registry: registry.clone(),
            dispatcher,
            users: Arc::new(UserRepo::new(db.clone())),
            messages: Arc::new(MessageRepo::new(db)),
            verifier,
            events,
            shutdown: Arc::new(ShutdownCoordinator::new(registry.clone())),
            config: Arc::new(config),
            start_time: Instant::now(),
            metrics,
        };
        Self { state }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .merge(crate::api::routes())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind, start the event bridge, and serve until shutdown.
    ///
    /// Both the listener and the bridge are tracked by the shutdown
    /// coordinator, so [`ShutdownCoordinator::drain`] closes every live push
    /// connection with 1001 and waits for both to stop.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let shutdown = &self.state.shutdown;
        let token = shutdown.token();
        let bridge = EventBridge::new(self.state.events.subscribe(), self.state.dispatcher.clone());
        shutdown.track(tokio::spawn(bridge.run(token.clone())));

        let router = self.router();
        shutdown.track(tokio::spawn(async move {
            let stop = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(stop).await {
                warn!(error = %e, "server stopped with error");
            }
        }));

        info!(%local_addr, "taxdesk server listening");
        Ok(local_addr)
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Get the notification dispatcher.
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.state.dispatcher
    }

    /// Sender for the domain event bus.
    pub fn events(&self) -> &broadcast::Sender<DomainEvent> {
        &self.state.events
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.user_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(default)]
    token: Option<String>,
}

/// GET /ws?token=...
///
/// A missing token is admitted as empty and refused with 4001 after the
/// upgrade, so the client sees a close code rather than an HTTP error.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let limit = state.config.max_message_size.saturating_mul(TRANSPORT_LIMIT_FACTOR);
    let token = params.token.unwrap_or_default();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_ws_session(socket, token, state))
}
