//! Shared test doubles for the dispatcher tests
#![allow(dead_code)]

use async_trait::async_trait;
use beacon_core::host::{CurrentValue, Location, StaticHost, VariableModel};
use beacon_core::{DispatchError, PanelOptions, RequestMode, Transport, TransportResponse};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use url::Url;

/// One request seen by the recording transport
#[derive(Debug, Clone)]
pub struct Recorded {
    pub url: String,
    pub body: Value,
    pub mode: RequestMode,
}

impl Recorded {
    pub fn event(&self) -> &str {
        self.body["type"].as_str().unwrap_or_default()
    }

    pub fn uuid(&self) -> &str {
        self.body["uuid"].as_str().unwrap_or_default()
    }

    pub fn time(&self) -> i64 {
        self.body["time"].as_i64().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Status(u16, Option<String>),
    Fail(String),
    /// Answer 204 only after this long
    Stall(std::time::Duration),
}

/// Transport that records every request and answers with a configurable reply
pub struct RecordingTransport {
    calls: Mutex<Vec<Recorded>>,
    reply: Mutex<Reply>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Reply::Status(204, None)),
        })
    }

    pub fn respond_with(&self, status: u16) {
        *self.reply.lock().unwrap() = Reply::Status(status, None);
    }

    pub fn respond_with_location(&self, status: u16, location: &str) {
        *self.reply.lock().unwrap() = Reply::Status(status, Some(location.to_string()));
    }

    pub fn fail_with(&self, message: &str) {
        *self.reply.lock().unwrap() = Reply::Fail(message.to_string());
    }

    pub fn stall_for(&self, delay: std::time::Duration) {
        *self.reply.lock().unwrap() = Reply::Stall(delay);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.event().to_string()).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post_json(
        &self,
        url: &Url,
        body: Vec<u8>,
        mode: RequestMode,
    ) -> Result<TransportResponse, DispatchError> {
        self.calls.lock().unwrap().push(Recorded {
            url: url.to_string(),
            body: serde_json::from_slice(&body).unwrap(),
            mode,
        });
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Status(status, location) => Ok(TransportResponse { status, location }),
            Reply::Fail(message) => Err(DispatchError::Transport(message)),
            Reply::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse {
                    status: 204,
                    location: None,
                })
            }
        }
    }
}

pub const SERVER: &str = "http://collector.test/write";

pub fn host_at(pathname: &str) -> Arc<StaticHost> {
    let host = StaticHost::new(
        Location {
            hostname: "grafana.test".into(),
            port: "3000".into(),
            protocol: "http:".into(),
            pathname: pathname.into(),
        },
        "Operations",
    )
    .with_variables(vec![VariableModel::new(
        "env",
        "custom",
        CurrentValue::Single("prod".into()),
    )]);
    Arc::new(host)
}

pub fn saved_host() -> Arc<StaticHost> {
    host_at("/d/abc123/operations")
}

pub fn options() -> PanelOptions {
    PanelOptions {
        server: SERVER.to_string(),
        post_start: true,
        post_heartbeat: false,
        post_end: true,
        ..Default::default()
    }
}

pub fn with_heartbeat(seconds: u64) -> PanelOptions {
    PanelOptions {
        post_heartbeat: true,
        heartbeat_interval_seconds: seconds,
        heartbeat_always: true,
        ..options()
    }
}
