use beacon_collector::{Collector, CollectorConfig};
use beacon_core::telemetry::init_tracing;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = CollectorConfig::parse();
    init_tracing("beacon-collector")?;

    info!(
        target: "collector",
        version = env!("CARGO_PKG_VERSION"),
        "Starting beacon collector"
    );

    let collector = Collector::new(config)?;
    tokio::select! {
        result = collector.serve() => {
            if let Err(e) = result {
                error!(target: "collector", error = %e, "Collector stopped");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target: "collector", "Shutting down");
        }
    }
    Ok(())
}
