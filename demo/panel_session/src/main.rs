mod config;

use beacon_core::host::{CurrentValue, UserProfile, VariableModel};
use beacon_core::telemetry::init_tracing;
use beacon_core::{render, BeaconError, HttpTransport, PanelAction, SessionDispatcher, StaticHost};
use config::PanelSessionConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("panel_session")?;

    let cfg = PanelSessionConfig::load();
    info!(
        target: "panel_session",
        page = %cfg.page_url(),
        server = %cfg.panel.server,
        heartbeat_secs = cfg.panel.heartbeat_interval_seconds,
        "Opening dashboard"
    );

    let host = StaticHost::from_url(&cfg.page_url(), &cfg.dashboard_title)
        .map_err(|e| BeaconError::ConfigError(format!("{}: {e}", cfg.page_url())))?
        .with_variables(vec![VariableModel::new(
            "env",
            "custom",
            CurrentValue::Single("prod".into()),
        )])
        .with_user(UserProfile {
            is_signed_in: true,
            login: "demo".into(),
            name: "Demo Viewer".into(),
            ..Default::default()
        });

    let dispatcher = SessionDispatcher::new(
        cfg.panel.clone(),
        Arc::new(host),
        Arc::new(HttpTransport::new()),
    );

    let mut errors = dispatcher.subscribe_errors();
    tokio::spawn(async move {
        while let Ok(e) = errors.recv().await {
            warn!(target: "panel_session", error = %e, retryable = e.is_retryable(), "Dispatch failed");
        }
    });

    if let Err(e) = dispatcher.start().await {
        // One retry, as a viewer pressing the retry button would.
        if e.is_retryable() {
            if let Err(e) = dispatcher.handle(PanelAction::RetryStart).await {
                error!(target: "panel_session", error = %e, "Start failed after retry");
            }
        }
    }

    match render(&cfg.panel, &dispatcher.panel_state()) {
        Ok(view) => {
            if let Some(json) = view.json {
                info!(target: "panel_session", "Panel shows:\n{json}");
            }
        }
        Err(e) => error!(target: "panel_session", error = %e, "Panel shows an error"),
    }

    if cfg.run_secs > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cfg.run_secs)) => {}
            _ = signal::ctrl_c() => {}
        }
    } else {
        signal::ctrl_c().await?;
    }

    info!(target: "panel_session", uuid = ?dispatcher.uuid(), "Closing dashboard");
    if let Some(end) = dispatcher.stop() {
        end.await?;
    }

    if let Some(payload) = dispatcher.last_payload() {
        let json = payload.to_pretty_json().map_err(BeaconError::from)?;
        info!(target: "panel_session", "Last payload:\n{json}");
    }
    Ok(())
}
