//! HttpTransport and HttpStreamConnector against an in-process axum server

mod common;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::credentials;
use futures::stream::{self, Stream, StreamExt};
use rupt_client::{
    ApiRequest, ChannelState, HttpStreamConnector, HttpTransport, RealtimeChannel, RealtimeSignal,
    Transport,
};
use rupt_core::{Credentials, ErrorKind, RealtimeConfig};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct AppState {
    captured: Arc<Mutex<Vec<Captured>>>,
    listen_auth: Arc<Mutex<Vec<(String, String)>>>,
}

async fn access(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    state.captured.lock().unwrap().push(Captured {
        path: "/v2/access".to_string(),
        headers,
        body: body.to_vec(),
    });
    Json(json!({"device_id": "dev-1", "attached_devices": 1, "success": true}))
}

async fn attached_devices(
    State(state): State<AppState>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    state.captured.lock().unwrap().push(Captured {
        path: format!("/v2/access/user/{}/attached_devices", user),
        headers,
        body: Vec::new(),
    });
    Json(json!([]))
}

async fn failing() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "{\"error\": \"boom\"}")
}

async fn listen(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let auth = query.get("auth").cloned().unwrap_or_default();
    state.listen_auth.lock().unwrap().push((device_id, auth));

    let events = vec![
        Ok(Event::default().comment("keep-alive")),
        Ok(Event::default().data("\"ping\"")),
        Ok(Event::default().data("\"logout\"")),
    ];
    Sse::new(stream::iter(events).chain(stream::pending()))
}

async fn spawn_server() -> (String, AppState) {
    let state = AppState::default();
    let app = Router::new()
        .route("/v2/access", post(access))
        .route("/v2/access/user/{user}/attached_devices", get(attached_devices))
        .route("/v2/identity", post(failing))
        .route("/v2/access/device/{device_id}/listen", get(listen))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

#[tokio::test]
async fn test_post_sends_literal_basic_header() {
    let (base_url, state) = spawn_server().await;
    let transport = HttpTransport::new(&base_url, 5).unwrap();

    let request = ApiRequest::post("/v2/access", &json!({"user": "user-1"})).unwrap();
    let body = transport
        .request(Some(&credentials()), request)
        .await
        .unwrap()
        .expect("server answered");
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["device_id"], "dev-1");

    let captured = state.captured.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    let headers = &captured[0].headers;
    assert_eq!(headers["authorization"], "Basic client-1:secret-1");
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["accept"], "application/json");
    let sent: serde_json::Value = serde_json::from_slice(&captured[0].body).unwrap();
    assert_eq!(sent, json!({"user": "user-1"}));
}

#[tokio::test]
async fn test_missing_secret_sends_empty_suffix() {
    let (base_url, state) = spawn_server().await;
    let transport = HttpTransport::new(&base_url, 5).unwrap();
    let creds = Credentials {
        client_id: "client-1".to_string(),
        secret: None,
    };

    let body = transport
        .request(Some(&creds), ApiRequest::get("/v2/access/user/user-1/attached_devices"))
        .await
        .unwrap();
    assert_eq!(body.as_deref(), Some(&b"[]"[..]));

    let captured = state.captured.lock().unwrap().clone();
    assert_eq!(captured[0].path, "/v2/access/user/user-1/attached_devices");
    assert_eq!(captured[0].headers["authorization"], "Basic client-1:");
}

#[tokio::test]
async fn test_error_status_still_returns_body() {
    let (base_url, _) = spawn_server().await;
    let transport = HttpTransport::new(&base_url, 5).unwrap();

    let request = ApiRequest::post("/v2/identity", &json!({})).unwrap();
    let body = transport.request(Some(&credentials()), request).await.unwrap();
    assert_eq!(body.as_deref(), Some(&b"{\"error\": \"boom\"}"[..]));
}

#[tokio::test]
async fn test_unreachable_service_yields_no_body() {
    // Bind and drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(format!("http://{}", addr), 2).unwrap();
    let body = transport
        .request(Some(&credentials()), ApiRequest::get("/v2/access/user/u/attached_devices"))
        .await
        .unwrap();
    assert!(body.is_none());

    let err = transport
        .request(None, ApiRequest::get("/v2/access/user/u/attached_devices"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn test_event_stream_delivers_logout() {
    let (base_url, state) = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let channel = RealtimeChannel::new(
        base_url,
        Arc::new(HttpStreamConnector::new().unwrap()),
        RealtimeConfig::default(),
        tx,
    );

    assert!(channel.start(Some(&credentials()), Some("dev-1")));
    let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("logout within timeout")
        .expect("channel alive");
    assert_eq!(
        signal,
        RealtimeSignal::Logout {
            device_id: "dev-1".to_string()
        }
    );
    assert_eq!(channel.state(), ChannelState::Open);

    // The ping before it produced nothing
    assert!(rx.try_recv().is_err());

    let auth = state.listen_auth.lock().unwrap().clone();
    assert_eq!(
        auth,
        vec![("dev-1".to_string(), "Basic client-1:secret-1".to_string())]
    );

    channel.stop();
    assert_eq!(channel.state(), ChannelState::Closed);
}
