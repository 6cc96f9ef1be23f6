//! lanshare server - HTTP host for presence and signaling
//!
//! Wires the registry, fanout, rate limiter and room store into an axum
//! router, and owns the listener, background sweeps and shutdown.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use errors::ApiError;
pub use routes::{build_routes, AppState};
pub use server::{bind_with_fallback, serve, shutdown_signal, spawn_background};
