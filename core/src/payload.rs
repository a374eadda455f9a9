//! Lifecycle payload assembly.
//!
//! A [`Payload`] is built fresh for every dispatch from the session uuid, the
//! panel options and an [`EnvironmentSnapshot`]. [`PayloadShape`] picks one of
//! two serialization strategies: the nested payload as-is, or the same
//! information re-keyed into a single level by [`crate::flatten`].
use crate::flatten::flatten;
use crate::host::{TimeRange, UserProfile};
use crate::options::{PanelOptions, PayloadOptions};
use crate::snapshot::{DashboardInfo, EnvironmentSnapshot, HostInfo, TemplateVariable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    #[serde(alias = "keep-alive")]
    Heartbeat,
    End,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "start",
            EventType::Heartbeat => "heartbeat",
            EventType::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(EventType::Start),
            "heartbeat" | "keep-alive" => Some(EventType::Heartbeat),
            "end" => Some(EventType::End),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub uuid: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub has_focus: bool,
    #[serde(default)]
    pub options: PayloadOptions,
    #[serde(default)]
    pub host: HostInfo,
    #[serde(default)]
    pub dashboard: DashboardInfo,
    #[serde(default)]
    pub user: UserProfile,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub time_origin: i64,
    /// When the payload was built, in epoch seconds
    pub time: i64,
}

/// Single-level payload with dot-joined keys
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlatPayload(pub Map<String, Value>);

impl FlatPayload {
    pub fn from_payload(payload: &Payload) -> Self {
        // Payload serializes to an object with string keys only.
        let nested = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        FlatPayload(flatten(&nested))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadShape {
    #[default]
    Nested,
    Flat,
}

impl PayloadShape {
    pub fn from_options(options: &PanelOptions) -> Self {
        if options.flatten {
            PayloadShape::Flat
        } else {
            PayloadShape::Nested
        }
    }
}

/// Payload in the shape that goes on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundPayload {
    Nested(Payload),
    Flat(FlatPayload),
}

impl OutboundPayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            OutboundPayload::Nested(_) => PayloadShape::Nested,
            OutboundPayload::Flat(_) => PayloadShape::Flat,
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            OutboundPayload::Nested(p) => &p.uuid,
            OutboundPayload::Flat(f) => f
                .get("uuid")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        match self {
            OutboundPayload::Nested(p) => Some(p.event_type),
            OutboundPayload::Flat(f) => f
                .get("type")
                .and_then(Value::as_str)
                .and_then(EventType::parse),
        }
    }

    pub fn time(&self) -> i64 {
        match self {
            OutboundPayload::Nested(p) => p.time,
            OutboundPayload::Flat(f) => f
                .get("time")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Combine session identity, options and environment into one payload.
pub fn assemble(
    event_type: EventType,
    uuid: &str,
    options: &PanelOptions,
    snapshot: &EnvironmentSnapshot,
    shape: PayloadShape,
) -> OutboundPayload {
    let payload = Payload {
        uuid: uuid.to_string(),
        event_type,
        has_focus: snapshot.has_focus,
        options: options.payload_options(),
        host: snapshot.host.clone(),
        dashboard: snapshot.dashboard.clone(),
        user: snapshot.user.clone(),
        variables: snapshot.variables.clone(),
        time_range: snapshot.time_range.clone(),
        time_zone: snapshot.time_zone.clone(),
        time_origin: snapshot.time_origin,
        time: snapshot.time,
    };

    match shape {
        PayloadShape::Nested => OutboundPayload::Nested(payload),
        PayloadShape::Flat => OutboundPayload::Flat(FlatPayload::from_payload(&payload)),
    }
}
