//! HTTP server for the docgate system

pub mod auth;
pub mod routes;
pub mod state;

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::GateConfig;
use crate::error::{Error, Result};
use state::AppState;

/// docgate HTTP server
pub struct GateServer {
    config: GateConfig,
    state: AppState,
}

impl GateServer {
    /// Create a new server
    pub fn new(config: GateConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    fn build_router(&self) -> Router {
        // CORS layer - must be added first (outermost)
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let api = routes::api_routes(self.config.server.max_upload_size).layer(
            middleware::from_fn_with_state(self.state.clone(), auth::require_api_key),
        );

        Router::new()
            // Health check
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            // API routes behind the key check
            .nest("/api", api)
            .with_state(self.state.clone())
            // Middleware layers (order matters - applied bottom to top)
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors)
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        if let Some(interval) = self.config.server.scan_interval_secs {
            spawn_scan_loop(self.state.clone(), interval);
        }
        spawn_prune_loop(self.state.clone());

        let router = self.build_router();

        tracing::info!("Starting docgate server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Periodic inbox sweep; mirrors POST /api/process for every known client.
fn spawn_scan_loop(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for client in state.scripts().discover_clients() {
                match routes::process::dispatch_inbox(&state, &client) {
                    Ok(response) if !response.queued.is_empty() || !response.rejected.is_empty() => {
                        tracing::info!(
                            client = %client,
                            queued = response.queued.len(),
                            rejected = response.rejected.len(),
                            "inbox scan dispatched documents"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(client = %client, "inbox scan failed: {}", e),
                }
            }
        }
    });
}

/// Retention pruning for the history log.
fn spawn_prune_loop(state: AppState) {
    let retention_days = state.config().history.retention_days;
    let interval_secs = state.config().history.prune_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.history().prune(retention_days) {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "pruned history records"),
                Err(e) => tracing::warn!("history prune failed: {}", e),
            }
        }
    });
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint
async fn readiness() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}
