//! Health check handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::routes::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub devices: usize,
    pub rooms: usize,
}

/// Liveness probe. Does not touch any lock beyond a length read.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        devices: state.registry.len(),
        rooms: state.rooms.room_count(),
    })
}
