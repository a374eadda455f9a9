// Collector HTTP server
//
// POST /write accepts lifecycle payloads, GET /metrics exposes the exporter.

use crate::cache::{user_role, user_theme, SessionCache};
use crate::config::CollectorConfig;
use crate::exporter::SessionExporter;
use crate::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use beacon_core::{EventType, Payload};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 1024;

/// Shared state handed to the HTTP handlers
#[derive(Clone)]
pub struct CollectorState {
    payloads: mpsc::Sender<Payload>,
    exporter: Arc<SessionExporter>,
}

pub struct Collector {
    config: CollectorConfig,
    cache: SessionCache,
    exporter: Arc<SessionExporter>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let cache = SessionCache::new();
        let exporter = Arc::new(SessionExporter::new(cache.clone(), config.session_timeout)?);
        Ok(Self {
            config,
            cache,
            exporter,
        })
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Build the HTTP router and start the payload processor behind it.
    pub fn router(&self) -> Router {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(process_payloads(
            self.cache.clone(),
            rx,
            !self.config.disable_session_log,
            !self.config.disable_variable_log,
        ));

        let state = CollectorState {
            payloads: tx,
            exporter: self.exporter.clone(),
        };

        Router::new()
            .route("/write", post(write_handler))
            .route("/metrics", get(metrics_handler))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state)
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.http_address).await?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let app = self.router();

        let cache = self.cache.clone();
        let max_cache_size = self.config.max_cache_size;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                cache.flush_if_oversized(max_cache_size);
            }
        });

        let addr = listener.local_addr()?;
        info!(
            target: "collector",
            addr = %addr,
            session_timeout = ?self.config.session_timeout,
            max_cache_size,
            "Collector ready"
        );

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Accept one payload. An unknown or missing `type` is treated as a heartbeat.
async fn write_handler(State(state): State<CollectorState>, body: Bytes) -> StatusCode {
    let payload = match parse_payload(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(target: "collector", error = %e, "Rejected malformed payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    if state.payloads.send(payload).await.is_err() {
        error!(target: "collector", "Payload processor has stopped");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::CREATED
}

fn parse_payload(body: &[u8]) -> serde_json::Result<Payload> {
    let mut value: Value = serde_json::from_slice(body)?;
    if let Value::Object(map) = &mut value {
        let known = map
            .get("type")
            .and_then(Value::as_str)
            .and_then(EventType::parse)
            .is_some();
        if !known {
            warn!(
                target: "collector",
                uuid = map.get("uuid").and_then(serde_json::Value::as_str).unwrap_or_default(),
                event_type = %map.get("type").unwrap_or(&serde_json::Value::Null),
                "Session has invalid type, defaulted to heartbeat"
            );
            map.insert("type".into(), Value::from(EventType::Heartbeat.as_str()));
        }
    }
    serde_json::from_value(value)
}

async fn metrics_handler(State(state): State<CollectorState>) -> Response {
    match state.exporter.render() {
        Ok(body) => ([(header::CONTENT_TYPE, state.exporter.format_type())], body).into_response(),
        Err(e) => {
            error!(target: "collector", error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}

async fn process_payloads(
    cache: SessionCache,
    mut rx: mpsc::Receiver<Payload>,
    session_log: bool,
    variable_log: bool,
) {
    while let Some(payload) = rx.recv().await {
        if session_log {
            log_payload(&payload, variable_log);
        }
        cache.record(payload);
    }
}

/// Log one received payload as a single structured event.
pub fn log_payload(p: &Payload, log_variables: bool) {
    let host = &p.host;
    let build = &host.build_info;
    let license = &host.license_info;
    let user = &p.user;
    let range = &p.time_range;

    let variables = if log_variables {
        p.variables
            .iter()
            .map(|v| {
                format!(
                    "{}=(label={}, type={}, multi={}, count={})",
                    v.name,
                    v.label,
                    v.var_type,
                    v.multi,
                    v.values.len()
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        String::new()
    };

    info!(
        target: "collector",
        uuid = %p.uuid,
        event_type = %p.event_type,
        host = %format!("{}//{}:{}", host.protocol, host.hostname, host.port),
        build = %format!(
            "(commit={}, edition={}, env={}, version={})",
            build.commit, build.edition, build.env, build.version
        ),
        license = %format!(
            "(state={}, expiry={}, license={})",
            license.state_info, license.expiry, license.has_license
        ),
        dashboard_name = %p.dashboard.name,
        dashboard_uid = %p.dashboard.uid,
        dashboard_timezone = %p.time_zone,
        user_id = user.id,
        user_login = %user.login,
        user_email = %user.email,
        user_name = %user.name,
        user_theme = user_theme(user),
        user_role = user_role(user),
        user_locale = %user.locale,
        user_timezone = %user.timezone,
        time_from = range.from,
        time_to = range.to,
        time_from_raw = %range.raw.from,
        time_to_raw = %range.raw.to,
        timeorigin = p.time_origin,
        time = p.time,
        variables = %variables,
        "Received session data"
    );
}
