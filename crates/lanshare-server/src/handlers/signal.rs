//! Signaling room handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use lanshare_signal::{CreateRoomResponse, PollQuery, PollResponse, SignalRequest};

use crate::errors::ApiError;
use crate::routes::AppState;

pub async fn create_room(State(state): State<Arc<AppState>>) -> Result<Json<CreateRoomResponse>, ApiError> {
    let room = state.rooms.create_room()?;
    Ok(Json(CreateRoomResponse { room }))
}

pub async fn append_signal(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignalRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let (room, signal) = request.into_parts();
    state.rooms.append_signal(&room, signal)?;
    Ok(StatusCode::OK)
}

/// Signals the other role wrote since `since`
pub async fn poll_signals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let response = state
        .rooms
        .poll(&query.room, &query.role, query.since_index())?;
    Ok(Json(response))
}
