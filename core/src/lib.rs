// Beacon Core Library
// Dashboard session lifecycle telemetry: start, heartbeat and end payloads

pub mod dispatcher;
pub mod error;
pub mod flatten;
pub mod host;
pub mod options;
pub mod payload;
pub mod render;
pub mod snapshot;
pub mod telemetry;
pub mod transport;

// Export core types
pub use dispatcher::{DispatchState, SessionDispatcher, SessionState};
pub use error::DispatchError;
pub use host::{HostContext, StaticHost};
pub use options::PanelOptions;
pub use payload::{assemble, EventType, OutboundPayload, Payload, PayloadShape};
pub use render::{render, PanelAction, PanelView};
pub use snapshot::{snapshot, EnvironmentSnapshot};
pub use transport::{HttpTransport, RequestMode, Transport, TransportResponse};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}
pub type Result<T> = std::result::Result<T, BeaconError>;
