//! REST API and WebSocket server of the energy hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared storage** and the **monitor handle** for queries and lifecycle control
//! - **WebSocket** push channel fed by the [`Broadcaster`](crate::broadcaster::Broadcaster)
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/readings/latest` - Most recent reading
//! - `GET /api/v1/circuits` - Circuit breakdown of the most recent reading
//! - `GET /api/v1/usage?hours=N` - Reading history
//! - `GET /api/v1/alerts` - Unacknowledged alerts
//! - `POST /api/v1/alerts/:id/acknowledge` - Acknowledge an alert
//! - `GET /api/v1/monitor` - Sampling loop statistics
//! - `POST /api/v1/monitor/start`, `POST /api/v1/monitor/stop` - Sampling lifecycle
//! - `WS /api/v1/stream` - Push channel

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
pub use types::{
    AcknowledgeResponse, AlertsResponse, CircuitsResponse, HealthResponse, LatestReadingResponse,
    UsageResponse,
};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
use std::net::{Ipv4Addr, SocketAddr};
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Build the router with all routes and layers
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/readings/latest",
            get(routes::readings::get_latest_reading),
        )
        .route("/api/v1/circuits", get(routes::readings::get_circuits))
        .route("/api/v1/usage", get(routes::readings::get_usage))
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route(
            "/api/v1/alerts/:id/acknowledge",
            post(routes::alerts::acknowledge_alert),
        )
        .route("/api/v1/monitor", get(routes::monitor::get_monitor))
        .route("/api/v1/monitor/start", post(routes::monitor::start_monitor))
        .route("/api/v1/monitor/stop", post(routes::monitor::stop_monitor))
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
