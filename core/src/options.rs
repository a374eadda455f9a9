//! Panel options as persisted by the host, plus the option editor layout.
use crate::error::DispatchError;
use crate::host::HostContext;
use crate::snapshot::{normalize_variables, TemplateVariable};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_SERVER: &str = "http://localhost:8080/write";
pub const DEFAULT_DASHBOARD_TEMPLATE: &str = "$__dashboard";
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Options for one panel instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelOptions {
    /// Destination URL; may contain template variable references
    pub server: String,
    /// Dashboard name, usually a template such as `$__dashboard`
    pub dashboard_name_or_template: String,
    /// Hides the JSON preview
    pub hidden: bool,
    pub post_start: bool,
    pub post_heartbeat: bool,
    #[serde(alias = "heartbeatInterval")]
    pub heartbeat_interval_seconds: u64,
    /// Send heartbeats even while the document lacks focus
    pub heartbeat_always: bool,
    pub post_end: bool,
    pub flatten: bool,
    pub no_cors: bool,
    /// Post `end` to `server/<location>` using the location returned by `start`
    pub follow_location: bool,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            dashboard_name_or_template: DEFAULT_DASHBOARD_TEMPLATE.to_string(),
            hidden: false,
            post_start: true,
            post_heartbeat: true,
            heartbeat_interval_seconds: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            heartbeat_always: false,
            post_end: true,
            flatten: false,
            no_cors: false,
            follow_location: false,
        }
    }
}

impl PanelOptions {
    pub fn show_details(&self) -> bool {
        !self.hidden
    }

    /// Heartbeat period if heartbeats should currently be armed.
    pub fn heartbeat_period(&self) -> Option<u64> {
        if self.post_heartbeat && self.heartbeat_interval_seconds > 0 {
            Some(self.heartbeat_interval_seconds)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.post_heartbeat && self.heartbeat_interval_seconds == 0 {
            return Err(DispatchError::Configuration(format!(
                "heartbeat interval {}s",
                self.heartbeat_interval_seconds
            )));
        }
        Ok(())
    }

    /// Values derived from these options through the host, compared on every re-render.
    pub fn fingerprint(&self, host: &dyn HostContext) -> ConfigFingerprint {
        ConfigFingerprint {
            server: host.resolve(&self.server),
            dashboard_name: host.resolve(&self.dashboard_name_or_template),
            variables: normalize_variables(&host.variables()),
        }
    }

    /// Compact subset embedded in every payload
    pub fn payload_options(&self) -> PayloadOptions {
        PayloadOptions {
            post_start: self.post_start,
            post_heartbeat: self.post_heartbeat,
            heartbeat_interval: self.heartbeat_interval_seconds,
            heartbeat_always: self.heartbeat_always,
            post_end: self.post_end,
        }
    }
}

/// Dispatch toggles carried in the payload's `options` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayloadOptions {
    pub post_start: bool,
    pub post_heartbeat: bool,
    pub heartbeat_interval: u64,
    pub heartbeat_always: bool,
    pub post_end: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFingerprint {
    pub server: String,
    pub dashboard_name: String,
    pub variables: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Switch,
    Number,
}

/// One control in the panel option editor
#[derive(Debug, Clone)]
pub struct OptionField {
    pub path: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    pub default_value: Value,
    show_if: Option<fn(&PanelOptions) -> bool>,
}

impl OptionField {
    fn new(
        path: &'static str,
        name: &'static str,
        description: &'static str,
        kind: FieldKind,
        default_value: Value,
    ) -> Self {
        Self {
            path,
            name,
            description,
            kind,
            default_value,
            show_if: None,
        }
    }

    fn show_if(mut self, predicate: fn(&PanelOptions) -> bool) -> Self {
        self.show_if = Some(predicate);
        self
    }

    pub fn is_visible(&self, options: &PanelOptions) -> bool {
        self.show_if.map_or(true, |predicate| predicate(options))
    }
}

/// Editor layout, in display order.
pub fn editor_fields() -> Vec<OptionField> {
    let d = PanelOptions::default();
    vec![
        OptionField::new(
            "analyticsOptions.server",
            "Endpoint",
            "Location to POST data on panel load.",
            FieldKind::Text,
            json!(d.server),
        ),
        OptionField::new(
            "analyticsOptions.dashboardNameOrTemplate",
            "Dashboard name",
            "Name reported for the dashboard; template variables are resolved.",
            FieldKind::Text,
            json!(d.dashboard_name_or_template),
        ),
        OptionField::new(
            "analyticsOptions.hidden",
            "Hide JSON",
            "Hides the printed JSON object on the panel.",
            FieldKind::Switch,
            json!(d.hidden),
        ),
        OptionField::new(
            "analyticsOptions.postStart",
            "Post start",
            "Sends a payload when the panel is loaded.",
            FieldKind::Switch,
            json!(d.post_start),
        ),
        OptionField::new(
            "analyticsOptions.postHeartbeat",
            "Post heartbeat",
            "Sends a payload periodically while the panel is loaded.",
            FieldKind::Switch,
            json!(d.post_heartbeat),
        ),
        OptionField::new(
            "analyticsOptions.heartbeatIntervalSeconds",
            "Heartbeat interval",
            "Seconds between heartbeat payloads.",
            FieldKind::Number,
            json!(d.heartbeat_interval_seconds),
        )
        .show_if(|o| o.post_heartbeat),
        OptionField::new(
            "analyticsOptions.heartbeatAlways",
            "Heartbeat always",
            "Sends heartbeats even when the dashboard is not focused.",
            FieldKind::Switch,
            json!(d.heartbeat_always),
        )
        .show_if(|o| o.post_heartbeat),
        OptionField::new(
            "analyticsOptions.postEnd",
            "Post end",
            "Sends a payload when the panel is unloaded.",
            FieldKind::Switch,
            json!(d.post_end),
        ),
        OptionField::new(
            "analyticsOptions.flatten",
            "Flatten",
            "Flattens the payload JSON. Enable if you are using Telegraf.",
            FieldKind::Switch,
            json!(d.flatten),
        ),
        OptionField::new(
            "analyticsOptions.noCors",
            "No CORS",
            "Sets request mode to no-cors.",
            FieldKind::Switch,
            json!(d.no_cors),
        ),
        OptionField::new(
            "analyticsOptions.followLocation",
            "Follow location",
            "Posts the end payload to the location returned by the start request.",
            FieldKind::Switch,
            json!(d.follow_location),
        )
        .show_if(|o| o.post_end),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_persisted_camel_case_settings() {
        let raw = r#"{
            "server": "https://collector.example/write",
            "postHeartbeat": true,
            "heartbeatInterval": 30,
            "noCors": true
        }"#;
        let options: PanelOptions = serde_json::from_str(raw).unwrap();
        assert_eq!(options.server, "https://collector.example/write");
        assert_eq!(options.heartbeat_interval_seconds, 30);
        assert!(options.no_cors);
        // untouched fields fall back to defaults
        assert!(options.post_end);
        assert_eq!(options.dashboard_name_or_template, "$__dashboard");
    }

    #[test]
    fn zero_interval_with_heartbeat_is_rejected() {
        let options = PanelOptions {
            heartbeat_interval_seconds: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        assert_eq!(options.heartbeat_period(), None);

        let off = PanelOptions {
            post_heartbeat: false,
            heartbeat_interval_seconds: 0,
            ..Default::default()
        };
        assert!(off.validate().is_ok());
    }

    #[test]
    fn heartbeat_controls_follow_post_heartbeat() {
        let fields = editor_fields();
        let interval = fields
            .iter()
            .find(|f| f.path.ends_with("heartbeatIntervalSeconds"))
            .unwrap();
        let always = fields
            .iter()
            .find(|f| f.path.ends_with("heartbeatAlways"))
            .unwrap();

        let on = PanelOptions::default();
        let off = PanelOptions {
            post_heartbeat: false,
            ..Default::default()
        };
        assert!(interval.is_visible(&on) && always.is_visible(&on));
        assert!(!interval.is_visible(&off) && !always.is_visible(&off));

        let server = fields.iter().find(|f| f.name == "Endpoint").unwrap();
        assert!(server.is_visible(&off));
        assert_eq!(server.kind, FieldKind::Text);
    }
}
