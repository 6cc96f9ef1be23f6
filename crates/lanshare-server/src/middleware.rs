//! Request middleware and extractors
//!
//! - [`ClientOrigin`] derives the client address from the connection and
//!   proxy headers, the same way for the rate limiter and the registry
//! - [`rate_limit`] rejects clients over their request budget

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use lanshare_core::ClientAddr;

use crate::errors::ApiError;
use crate::routes::AppState;

/// Client address of the current request
///
/// Falls back to an empty transport address when the router was not served
/// with connect info (in-process tests).
#[derive(Clone, Debug)]
pub struct ClientOrigin(pub ClientAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        Ok(Self(ClientAddr::from_parts(
            &remote,
            header_str(&parts.headers, "x-forwarded-for"),
            header_str(&parts.headers, "x-real-ip"),
        )))
    }
}

/// User agent of a request, or empty
pub fn user_agent(headers: &HeaderMap) -> &str {
    header_str(headers, header::USER_AGENT.as_str()).unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Admission control for every non-exempt route
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ClientOrigin(origin): ClientOrigin,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.rate_limit.is_exempt(req.uri().path()) {
        state.limiter.check(&origin.key)?;
    }
    Ok(next.run(req).await)
}
