// Tracing setup shared by the binaries
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber: `EnvFilter` (from `RUST_LOG`, default
/// `info`) plus a fmt layer. Returns an error if a subscriber is already set.
///
/// # Example
///
/// ```no_run
/// use beacon_core::telemetry::init_tracing;
///
/// fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     init_tracing("panel_session")?;
///     Ok(())
/// }
/// ```
pub fn init_tracing(service_name: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()?;

    info!(
        target: "telemetry",
        service_name = %service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Tracing initialized"
    );
    Ok(())
}
