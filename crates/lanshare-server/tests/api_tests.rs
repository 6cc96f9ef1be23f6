//! HTTP API integration tests.
//!
//! Drives the full router in-process with `oneshot`, including the rate-limit
//! middleware and the event stream body.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use lanshare_core::device::{device_icon, device_name};
use lanshare_core::Config;
use lanshare_server::{build_routes, AppState};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn test_app(config: Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, CancellationToken::new()));
    (build_routes(state.clone()), state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builder should succeed")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request builder should succeed")
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("request should succeed");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

/// Read an event stream body until `needle` shows up
async fn read_until(body: &mut Body, buf: &mut String, needle: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !buf.contains(needle) {
            let frame = body
                .frame()
                .await
                .expect("stream ended")
                .expect("stream failed");
            if let Ok(data) = frame.into_data() {
                buf.push_str(&String::from_utf8_lossy(&data));
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {:?}; got {:?}", needle, buf));
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app(Config::default());
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["devices"], 0);
}

#[tokio::test]
async fn test_register_derives_identity() {
    let (app, _) = test_app(Config::default());
    let req = Request::builder()
        .method("POST")
        .uri("/api/register")
        .header("content-type", "application/json")
        .header("user-agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)")
        .body(Body::from(r#"{"id":"phone-1"}"#))
        .unwrap();

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "id": "phone-1",
            "name": device_name("phone-1"),
            "icon": device_icon("phone-1"),
            "type": "phone",
        })
    );
}

#[tokio::test]
async fn test_register_rename() {
    let (app, state) = test_app(Config::default());

    send(&app, post_json("/api/register", json!({"id": "desk"}))).await;
    let (status, body) = send(
        &app,
        post_json("/api/register", json!({"id": "desk", "name": "Office PC"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Office PC");

    // A blank name keeps the current one
    let (_, body) = send(&app, post_json("/api/register", json!({"id": "desk", "name": ""}))).await;
    assert_eq!(body["name"], "Office PC");
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let (app, state) = test_app(Config::default());

    let (status, body) = send(&app, post_json("/api/register", json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");

    let req = Request::builder()
        .method("POST")
        .uri("/api/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");

    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_wrong_method() {
    let (app, _) = test_app(Config::default());
    let response = app.oneshot(get("/api/register")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_get_device() {
    let (app, _) = test_app(Config::default());

    let (status, body) = send(&app, get("/api/device/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    send(&app, post_json("/api/register", json!({"id": "laptop", "name": "Air"}))).await;
    let (status, body) = send(&app, get("/api/device/laptop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Air");
    assert_eq!(body["type"], "desktop");
}

#[tokio::test]
async fn test_signaling_flow() {
    let (app, _) = test_app(Config::default());

    let (status, body) = send(&app, post_json("/api/p2p/create", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let room = body["room"].as_str().unwrap().to_string();

    let offer = json!({"room": room, "from": "host", "type": "offer", "data": {"sdp": "v=0"}});
    let (status, _) = send(&app, post_json("/api/p2p/signal", offer)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/api/p2p/poll?room={}&role=guest&since=0", room))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"], 1);
    assert_eq!(body["signals"][0]["type"], "offer");
    assert_eq!(body["signals"][0]["data"]["sdp"], "v=0");

    // The host never sees its own offer
    let (_, body) = send(&app, get(&format!("/api/p2p/poll?room={}&role=host", room))).await;
    assert_eq!(body["signals"], json!([]));
    assert_eq!(body["index"], 1);

    let answer = json!({"room": room, "from": "guest", "type": "answer"});
    send(&app, post_json("/api/p2p/signal", answer)).await;

    // An unparsable offset reads from the start
    let (_, body) = send(&app, get(&format!("/api/p2p/poll?room={}&role=host&since=abc", room))).await;
    assert_eq!(body["index"], 2);
    assert_eq!(body["signals"][0]["from"], "guest");
}

#[tokio::test]
async fn test_signaling_errors() {
    let (app, _) = test_app(Config::default());

    let signal = json!({"room": "deadbeef", "from": "host", "type": "offer"});
    let (status, _) = send(&app, post_json("/api/p2p/signal", signal)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/p2p/poll?room=deadbeef&role=host")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/p2p/poll?role=host")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit() {
    let mut config = Config::default();
    config.rate_limit.max_requests = 2;
    let (app, _) = test_app(config);

    for _ in 0..2 {
        let (status, _) = send(&app, get("/api/device/x")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, body) = send(&app, get("/api/device/x")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");

    // Exempt paths are never charged
    for _ in 0..5 {
        let (status, _) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Another client has its own budget
    let req = Request::builder()
        .uri("/api/device/x")
        .header("x-forwarded-for", "203.0.113.5")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_stream() {
    let (app, state) = test_app(Config::default());

    let response = app.clone().oneshot(get("/api/events?id=watcher")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");

    let mut body = response.into_body();
    let mut buf = String::new();
    read_until(&mut body, &mut buf, "event: peers\ndata: []\n\n").await;
    assert!(buf.starts_with("event: peers\n"));
    assert_eq!(state.registry.channel_count("watcher"), 1);

    send(&app, post_json("/api/register", json!({"id": "newcomer"}))).await;
    read_until(&mut body, &mut buf, "event: device-joined").await;
    read_until(&mut body, &mut buf, &format!("\"name\":\"{}\"", device_name("newcomer"))).await;

    send(&app, post_json("/api/register", json!({"id": "newcomer", "name": "Den TV"}))).await;
    read_until(&mut body, &mut buf, "event: device-renamed").await;
    read_until(&mut body, &mut buf, "\"name\":\"Den TV\"").await;

    // Shutdown ends the stream and detaches its queue
    state.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), async {
        while body.frame().await.is_some() {}
    })
    .await
    .expect("stream did not end");
    assert_eq!(state.registry.channel_count("watcher"), 0);

    let (status, _) = send(&app, get("/api/events?id=late")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_event_stream_closed_by_client() {
    let (app, state) = test_app(Config::default());

    let watcher = app.clone().oneshot(get("/api/events?id=watcher")).await.unwrap();
    let mut watcher = watcher.into_body();
    let mut buf = String::new();
    read_until(&mut watcher, &mut buf, "event: peers").await;

    let response = app.clone().oneshot(get("/api/events?id=dev-a")).await.unwrap();
    let mut leaving = response.into_body();
    let mut leaving_buf = String::new();
    read_until(&mut leaving, &mut leaving_buf, "event: peers").await;
    assert_eq!(state.registry.channel_count("dev-a"), 1);

    // Nothing is written to dev-a after this, so only the body drop can end its loop
    drop(leaving);
    read_until(&mut watcher, &mut buf, "event: device-left\ndata: {\"id\":\"dev-a\"}").await;
    assert_eq!(state.registry.channel_count("dev-a"), 0);
    assert_eq!(state.registry.channel_count("watcher"), 1);
}

#[tokio::test]
async fn test_event_stream_bypasses_rate_limit() {
    let mut config = Config::default();
    config.rate_limit.max_requests = 1;
    let (app, _) = test_app(config);

    let (status, _) = send(&app, get("/api/device/x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get("/api/device/x")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let response = app.clone().oneshot(get("/api/events?id=x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
}

#[tokio::test]
async fn test_event_stream_requires_id() {
    let (app, state) = test_app(Config::default());

    let (status, body) = send(&app, get("/api/events")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");
    assert!(state.registry.is_empty());
}
