//! Point-in-time environment facts gathered from the host for one payload.
use crate::host::{
    BuildInfo, CurrentValue, HostContext, LicenseInfo, TimeRange, UserProfile, VariableModel,
};
use crate::options::PanelOptions;
use serde::{Deserialize, Serialize};

/// Route the host uses for an unsaved dashboard
pub const NEW_DASHBOARD_PATH: &str = "dashboard/new";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostInfo {
    pub hostname: String,
    pub port: String,
    pub protocol: String,
    pub build_info: BuildInfo,
    pub license_info: LicenseInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardInfo {
    pub name: String,
    /// Empty for a new, unsaved dashboard
    pub uid: String,
}

/// Template variable normalized to a single shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateVariable {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub multi: bool,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    pub host: HostInfo,
    pub dashboard: DashboardInfo,
    pub user: UserProfile,
    pub variables: Vec<TemplateVariable>,
    pub time_range: TimeRange,
    pub time_zone: String,
    pub time_origin: i64,
    pub has_focus: bool,
    /// Epoch seconds when the snapshot was taken
    pub time: i64,
}

pub fn is_new_dashboard(pathname: &str) -> bool {
    pathname.trim_start_matches('/') == NEW_DASHBOARD_PATH
}

/// Dashboard uid from a path like `/d/<uid>/<slug>`; empty when new or too short.
pub fn uid_from_path(pathname: &str) -> String {
    if is_new_dashboard(pathname) {
        return String::new();
    }
    pathname.split('/').nth(2).unwrap_or_default().to_string()
}

pub fn normalize_variables(models: &[VariableModel]) -> Vec<TemplateVariable> {
    models
        .iter()
        .map(|v| {
            let (multi, values) = match &v.current {
                CurrentValue::Single(value) if !value.is_empty() => (false, vec![value.clone()]),
                CurrentValue::Multi(values) => (true, values.clone()),
                _ => (false, Vec::new()),
            };
            TemplateVariable {
                name: v.name.clone(),
                label: v.label.clone().unwrap_or_default(),
                var_type: v.var_type.clone(),
                multi,
                values,
            }
        })
        .collect()
}

pub fn snapshot(options: &PanelOptions, host: &dyn HostContext) -> EnvironmentSnapshot {
    let location = host.location();

    EnvironmentSnapshot {
        host: HostInfo {
            hostname: location.hostname,
            port: location.port,
            protocol: location.protocol,
            build_info: host.build_info(),
            license_info: host.license_info(),
        },
        dashboard: DashboardInfo {
            name: host.resolve(&options.dashboard_name_or_template),
            uid: uid_from_path(&location.pathname),
        },
        user: host.user(),
        variables: normalize_variables(&host.variables()),
        time_range: host.time_range(),
        time_zone: host.time_zone(),
        time_origin: host.time_origin(),
        has_focus: host.has_focus(),
        time: chrono::Utc::now().timestamp(),
    }
}
