//! HTTP routes for lanshare.
//!
//! Defines the Axum router and application state.

use std::any::Any;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use lanshare_core::Config;
use lanshare_presence::{BroadcastScope, Fanout, RateLimiter, RateLimiterConfig, Registry};
use lanshare_signal::RoomStore;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::ApiError;
use crate::handlers;
use crate::middleware::rate_limit;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub fanout: Fanout,
    pub limiter: RateLimiter,
    pub rooms: Arc<RoomStore>,
    /// Cancelled on shutdown; every event stream holds a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        let registry = Arc::new(Registry::with_capacity(config.presence.channel_capacity));
        let scope = if config.presence.scope_by_network {
            BroadcastScope::SameNetwork
        } else {
            BroadcastScope::Global
        };
        let fanout = Fanout::new(registry.clone(), scope);
        let limiter = RateLimiter::with_config(RateLimiterConfig::from(&config.rate_limit));
        let rooms = Arc::new(RoomStore::from_config(&config.signal));

        Self {
            config: Arc::new(config),
            registry,
            fanout,
            limiter,
            rooms,
            shutdown,
        }
    }
}

/// Build the application routes.
///
/// - `/health` - liveness, exempt from rate limiting
/// - `/api/register`, `/api/device/:id` - device registry
/// - `/api/events` - event stream, exempt from rate limiting
/// - `/api/p2p/*` - signaling rooms
///
/// Layer order (outermost first): panic recovery, request tracing, CORS,
/// body limit, rate limiting.
pub fn build_routes(state: Arc<AppState>) -> Router {
    let max_body = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/register", post(handlers::register))
        .route("/api/events", get(handlers::events))
        .route("/api/device/:id", get(handlers::get_device))
        .route("/api/p2p/create", post(handlers::create_room))
        .route("/api/p2p/signal", post(handlers::append_signal))
        .route("/api/p2p/poll", get(handlers::poll_signals))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::Internal.into_response()
}
