//! HTTP transport tests against a loopback axum server, plus dispatcher
//! behaviour over a mocked transport.
mod support;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use beacon_core::{
    DispatchError, HttpTransport, RequestMode, SessionDispatcher, Transport, TransportResponse,
};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use support::{options, saved_host};
use url::Url;

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn write_handler(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured.requests.lock().unwrap().push((content_type, body));
    (StatusCode::CREATED, Json(json!({ "location": "session-1" })))
}

async fn failing_handler() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_server() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/write", post(write_handler))
        .route("/fail", post(failing_handler))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}

#[tokio::test]
async fn posts_json_and_reads_location() {
    let (base, captured) = spawn_server().await;
    let transport = HttpTransport::new();
    let url = Url::parse(&format!("{base}/write")).unwrap();

    let response = transport
        .post_json(&url, br#"{"uuid":"u-1","type":"start"}"#.to_vec(), RequestMode::Cors)
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.location.as_deref(), Some("session-1"));

    let requests = captured.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0.as_deref(), Some("application/json"));
    assert_eq!(requests[0].1["uuid"], "u-1");
}

#[tokio::test]
async fn error_status_is_reported_not_raised() {
    let (base, _) = spawn_server().await;
    let transport = HttpTransport::new();
    let url = Url::parse(&format!("{base}/fail")).unwrap();

    let response = transport
        .post_json(&url, b"{}".to_vec(), RequestMode::Cors)
        .await
        .unwrap();

    assert_eq!(response.status, 500);
    assert!(response.location.is_none());
}

#[tokio::test]
async fn no_cors_response_is_opaque() {
    let (base, _) = spawn_server().await;
    let transport = HttpTransport::new();
    let url = Url::parse(&format!("{base}/fail")).unwrap();

    let response = transport
        .post_json(&url, b"{}".to_vec(), RequestMode::NoCors)
        .await
        .unwrap();

    assert_eq!(response, TransportResponse::opaque());
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new();
    let url = Url::parse(&format!("http://{addr}/write")).unwrap();
    let result = transport
        .post_json(&url, b"{}".to_vec(), RequestMode::Cors)
        .await;

    assert!(matches!(result, Err(DispatchError::Transport(_))));
}

#[tokio::test]
async fn dispatcher_over_http_sends_start_and_end() {
    let (base, captured) = spawn_server().await;
    let opts = beacon_core::PanelOptions {
        server: format!("{base}/write"),
        ..options()
    };
    let d = SessionDispatcher::new(opts, saved_host(), Arc::new(HttpTransport::new()));

    d.start().await.unwrap();
    d.stop().unwrap().await.unwrap();

    let requests = captured.requests.lock().unwrap();
    let types: Vec<&str> = requests
        .iter()
        .map(|(_, body)| body["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["start", "end"]);
    assert_eq!(requests[0].1["uuid"], requests[1].1["uuid"]);
}

mock! {
    pub Wire {}

    #[async_trait]
    impl Transport for Wire {
        async fn post_json(
            &self,
            url: &Url,
            body: Vec<u8>,
            mode: RequestMode,
        ) -> Result<TransportResponse, DispatchError>;
    }
}

#[tokio::test]
async fn mocked_transport_failure_surfaces_on_start() {
    let mut wire = MockWire::new();
    wire.expect_post_json()
        .withf(|url, body, mode| {
            url.as_str() == "http://collector.test/write"
                && !body.is_empty()
                && *mode == RequestMode::Cors
        })
        .times(1)
        .returning(|_, _, _| Err(DispatchError::Transport("dns error".into())));

    let d = SessionDispatcher::new(options(), saved_host(), Arc::new(wire));
    let result = d.start().await;

    assert_eq!(result, Err(DispatchError::Transport("dns error".into())));
    assert_eq!(
        d.last_error(),
        Some(DispatchError::Transport("dns error".into()))
    );
}

#[tokio::test]
async fn mocked_transport_is_not_called_for_new_dashboard() {
    let mut wire = MockWire::new();
    wire.expect_post_json().times(0);

    let d = SessionDispatcher::new(
        options(),
        support::host_at("/dashboard/new"),
        Arc::new(wire),
    );

    assert_eq!(d.start().await, Err(DispatchError::UnidentifiedDashboard));
}
