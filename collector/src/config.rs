use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Command line / environment configuration for the collector
#[derive(Parser, Debug, Clone)]
#[command(
    name = "beacon-collector",
    version,
    about = "A receiver for dashboard session lifecycle payloads."
)]
pub struct CollectorConfig {
    /// Address to listen on for payloads and metrics
    #[arg(long, env = "HTTP_ADDRESS", default_value = "0.0.0.0:8080")]
    pub http_address: SocketAddr,

    /// The maximum duration that may be added between heartbeats. 0 = unlimited.
    #[arg(long, env = "SESSION_TIMEOUT", default_value = "0s", value_parser = humantime::parse_duration)]
    pub session_timeout: Duration,

    /// The maximum number of sessions to store in the cache before resetting. 0 = unlimited.
    #[arg(long, env = "MAX_CACHE_SIZE", default_value_t = 1000)]
    pub max_cache_size: usize,

    /// Disables logging sessions to the console
    #[arg(long)]
    pub disable_session_log: bool,

    /// Disables logging variables to the console
    #[arg(long)]
    pub disable_variable_log: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            http_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            session_timeout: Duration::ZERO,
            max_cache_size: 1000,
            disable_session_log: false,
            disable_variable_log: false,
        }
    }
}
