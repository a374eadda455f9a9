// Beacon Collector
// Receives session lifecycle payloads and exports per-session metrics

pub mod cache;
pub mod config;
pub mod exporter;
pub mod server;

pub use cache::{Session, SessionCache};
pub use config::CollectorConfig;
pub use exporter::SessionExporter;
pub use server::{Collector, CollectorState};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Payload error: {0}")]
    PayloadError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, CollectorError>;
