//! Device registry and event stream handlers.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use lanshare_core::Device;
use lanshare_presence::EventStream;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::ApiError;
use crate::middleware::{user_agent, ClientOrigin};
use crate::routes::AppState;

/// In-memory pipe between a stream's serve loop and the response body
const STREAM_PIPE_BYTES: usize = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub id: String,
}

/// Register a device or refresh a known one.
///
/// Joins and renames are broadcast here, after the registry lock is released.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientOrigin(origin): ClientOrigin,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Device>, ApiError> {
    let Json(request) = payload?;
    let registration = state.registry.register(
        &request.id,
        request.name.as_deref(),
        &origin,
        user_agent(&headers),
    )?;
    state.fanout.announce(&registration);
    Ok(Json(registration.device))
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Device>, ApiError> {
    Ok(Json(state.registry.lookup(&id)?))
}

/// Open a server-sent event stream for a device.
///
/// The serve loop runs in its own task and writes into a pipe whose read end
/// is the response body. The body holds a drop guard on the loop's token, so
/// a client going away stops the loop immediately instead of at its next
/// write.
pub async fn events(
    State(state): State<Arc<AppState>>,
    ClientOrigin(origin): ClientOrigin,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Result<Response, ApiError> {
    if state.shutdown.is_cancelled() {
        return Err(ApiError::Unavailable("server is shutting down".to_string()));
    }

    let stream = EventStream::open(
        &state.registry,
        &state.fanout,
        &query.id,
        &origin,
        user_agent(&headers),
        state.config.presence.keepalive(),
    )?;

    let (writer, reader) = tokio::io::duplex(STREAM_PIPE_BYTES);
    let cancel = state.shutdown.child_token();
    let on_close = cancel.clone().drop_guard();
    let device_id = query.id;
    tokio::spawn(async move {
        if let Err(e) = stream.serve(writer, cancel).await {
            debug!("Event stream for {} ended: {}", device_id, e);
        }
    });

    let headers = [
        (CONTENT_TYPE, "text/event-stream"),
        (CACHE_CONTROL, "no-cache"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    let body = ReaderStream::new(reader).map(move |chunk| {
        let _armed = &on_close;
        chunk
    });
    Ok((headers, Body::from_stream(body)).into_response())
}
