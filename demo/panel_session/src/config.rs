use std::fs;
use std::path::Path;

use beacon_core::{BeaconError, PanelOptions};

/// Configuration for one demo viewing session
#[derive(Clone, Debug)]
pub struct PanelSessionConfig {
    /// Base URL of the dashboard host, without path
    pub grafana_url: String,
    /// Page path of the viewed dashboard, e.g. `/d/abc123/operations`
    pub dashboard_path: String,
    pub dashboard_title: String,
    /// How long to keep the dashboard open before ending the session; 0 waits for Ctrl-C
    pub run_secs: u64,
    pub panel: PanelOptions,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse::<u64>().ok())
}

impl Default for PanelSessionConfig {
    fn default() -> Self {
        let mut panel = PanelOptions::default();
        if let Some(server) = env_string("BEACON_SERVER") {
            panel.server = server;
        }
        if let Some(secs) = env_u64("BEACON_HEARTBEAT_SECS") {
            panel.heartbeat_interval_seconds = secs;
        }

        Self {
            grafana_url: env_string("BEACON_GRAFANA_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            dashboard_path: env_string("BEACON_DASHBOARD_PATH")
                .unwrap_or_else(|| "/d/demo/panel-session".to_string()),
            dashboard_title: env_string("BEACON_DASHBOARD_TITLE")
                .unwrap_or_else(|| "Panel Session".to_string()),
            run_secs: env_u64("BEACON_RUN_SECS").unwrap_or(0),
            panel,
        }
    }
}

impl PanelSessionConfig {
    /// Load configuration from a TOML file (path via PANEL_SESSION_CONFIG or ./panel_session.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path =
            std::env::var("PANEL_SESSION_CONFIG").unwrap_or_else(|_| "panel_session.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "panel_session", path = %path, "No TOML config found; using defaults/env");
            return Self::default();
        }
        match Self::from_file(p) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(target: "panel_session", error = %e, "Failed to load TOML; using defaults");
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BeaconError> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, BeaconError> {
        let t: PanelSessionToml = toml::from_str(s)?;
        let cfg = t.overlay(Self::default());
        cfg.panel.validate()?;
        Ok(cfg)
    }

    pub fn page_url(&self) -> String {
        format!(
            "{}{}",
            self.grafana_url.trim_end_matches('/'),
            self.dashboard_path
        )
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PanelSessionToml {
    pub grafana_url: Option<String>,
    pub dashboard_path: Option<String>,
    pub dashboard_title: Option<String>,
    pub run_secs: Option<u64>,
    pub panel: Option<PanelToml>,
}

impl PanelSessionToml {
    fn overlay(self, mut base: PanelSessionConfig) -> PanelSessionConfig {
        if let Some(v) = self.grafana_url {
            base.grafana_url = v;
        }
        if let Some(v) = self.dashboard_path {
            base.dashboard_path = v;
        }
        if let Some(v) = self.dashboard_title {
            base.dashboard_title = v;
        }
        if let Some(v) = self.run_secs {
            base.run_secs = v;
        }
        if let Some(p) = self.panel {
            p.apply(&mut base.panel);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PanelToml {
    pub server: Option<String>,
    pub dashboard_name_or_template: Option<String>,
    pub hidden: Option<bool>,
    pub post_start: Option<bool>,
    pub post_heartbeat: Option<bool>,
    pub heartbeat_interval_seconds: Option<u64>,
    pub heartbeat_always: Option<bool>,
    pub post_end: Option<bool>,
    pub flatten: Option<bool>,
    pub no_cors: Option<bool>,
    pub follow_location: Option<bool>,
}

impl PanelToml {
    fn apply(self, o: &mut PanelOptions) {
        if let Some(v) = self.server {
            o.server = v;
        }
        if let Some(v) = self.dashboard_name_or_template {
            o.dashboard_name_or_template = v;
        }
        if let Some(v) = self.hidden {
            o.hidden = v;
        }
        if let Some(v) = self.post_start {
            o.post_start = v;
        }
        if let Some(v) = self.post_heartbeat {
            o.post_heartbeat = v;
        }
        if let Some(v) = self.heartbeat_interval_seconds {
            o.heartbeat_interval_seconds = v;
        }
        if let Some(v) = self.heartbeat_always {
            o.heartbeat_always = v;
        }
        if let Some(v) = self.post_end {
            o.post_end = v;
        }
        if let Some(v) = self.flatten {
            o.flatten = v;
        }
        if let Some(v) = self.no_cors {
            o.no_cors = v;
        }
        if let Some(v) = self.follow_location {
            o.follow_location = v;
        }
    }
}
