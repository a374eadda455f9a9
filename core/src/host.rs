//! Host-provided context.
//!
//! Everything the panel runtime exposes (location, template variables,
//! build/license metadata, signed-in user, time range, focus) is read through
//! [`HostContext`] and passed explicitly into the snapshot provider.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Current page location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub hostname: String,
    pub port: String,
    /// Scheme including the trailing colon, e.g. `https:`
    pub protocol: String,
    pub pathname: String,
}

/// Current value of a template variable as the host stores it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurrentValue {
    Single(String),
    Multi(Vec<String>),
    #[default]
    Unset,
}

/// Template variable as listed by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableModel {
    pub name: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub var_type: String,
    #[serde(default)]
    pub current: CurrentValue,
}

impl VariableModel {
    pub fn new(name: &str, var_type: &str, current: CurrentValue) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            var_type: var_type.to_string(),
            current,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub env: String,
    pub edition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LicenseInfo {
    pub has_license: bool,
    pub expiry: i64,
    pub state_info: String,
}

/// Signed-in user as exposed by the host session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub is_signed_in: bool,
    pub id: i64,
    pub login: String,
    pub email: String,
    pub name: String,
    pub light_theme: bool,
    pub org_count: i64,
    pub org_id: i64,
    pub org_name: String,
    pub org_role: String,
    pub is_grafana_admin: bool,
    pub timezone: String,
    pub locale: String,
    pub has_edit_permission_in_folders: bool,
}

/// Unparsed range as typed by the user, e.g. `now-6h`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTimeRange {
    pub from: String,
    pub to: String,
}

/// Active dashboard range in epoch seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
    pub raw: RawTimeRange,
}

/// Read-only view of the panel host
pub trait HostContext: Send + Sync {
    fn location(&self) -> Location;

    /// Substitute template variable references. Unknown references are left as-is.
    fn resolve(&self, template: &str) -> String;

    fn variables(&self) -> Vec<VariableModel>;

    fn build_info(&self) -> BuildInfo;

    fn license_info(&self) -> LicenseInfo;

    fn user(&self) -> UserProfile;

    fn time_range(&self) -> TimeRange;

    fn time_zone(&self) -> String;

    /// Page load time in epoch seconds
    fn time_origin(&self) -> i64;

    fn has_focus(&self) -> bool;
}

#[derive(Debug, Clone, Default)]
struct HostState {
    location: Location,
    dashboard_title: String,
    variables: Vec<VariableModel>,
    build_info: BuildInfo,
    license_info: LicenseInfo,
    user: UserProfile,
    time_range: TimeRange,
    time_zone: String,
    time_origin: i64,
    has_focus: bool,
}

/// In-memory host whose mutable parts can be changed while a session runs
#[derive(Debug, Default)]
pub struct StaticHost {
    state: RwLock<HostState>,
}

impl StaticHost {
    pub fn new(location: Location, dashboard_title: &str) -> Self {
        Self {
            state: RwLock::new(HostState {
                location,
                dashboard_title: dashboard_title.to_string(),
                time_zone: "browser".to_string(),
                time_origin: chrono::Utc::now().timestamp(),
                has_focus: true,
                ..Default::default()
            }),
        }
    }

    /// Parse a full page URL such as `https://grafana.local:3000/d/abc/overview`.
    pub fn from_url(page_url: &str, dashboard_title: &str) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(page_url)?;
        let location = Location {
            hostname: parsed.host_str().unwrap_or_default().to_string(),
            port: parsed.port().map(|p| p.to_string()).unwrap_or_default(),
            protocol: format!("{}:", parsed.scheme()),
            pathname: parsed.path().to_string(),
        };
        Ok(Self::new(location, dashboard_title))
    }

    pub fn with_variables(self, variables: Vec<VariableModel>) -> Self {
        self.write(|s| s.variables = variables);
        self
    }

    pub fn with_user(self, user: UserProfile) -> Self {
        self.write(|s| s.user = user);
        self
    }

    pub fn with_build_info(self, build_info: BuildInfo, license_info: LicenseInfo) -> Self {
        self.write(|s| {
            s.build_info = build_info;
            s.license_info = license_info;
        });
        self
    }

    pub fn with_time_range(self, time_range: TimeRange, time_zone: &str) -> Self {
        self.write(|s| {
            s.time_range = time_range;
            s.time_zone = time_zone.to_string();
        });
        self
    }

    pub fn set_focus(&self, has_focus: bool) {
        self.write(|s| s.has_focus = has_focus);
    }

    pub fn set_pathname(&self, pathname: &str) {
        self.write(|s| s.location.pathname = pathname.to_string());
    }

    pub fn set_variable(&self, name: &str, current: CurrentValue) {
        self.write(|s| {
            if let Some(v) = s.variables.iter_mut().find(|v| v.name == name) {
                v.current = current;
            }
        });
    }

    fn read<T>(&self, f: impl FnOnce(&HostState) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut HostState)) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl HostContext for StaticHost {
    fn location(&self) -> Location {
        self.read(|s| s.location.clone())
    }

    fn resolve(&self, template: &str) -> String {
        self.read(|s| {
            let mut values: HashMap<&str, String> = s
                .variables
                .iter()
                .map(|v| {
                    let text = match &v.current {
                        CurrentValue::Single(value) => value.clone(),
                        CurrentValue::Multi(values) => values.join(","),
                        CurrentValue::Unset => String::new(),
                    };
                    (v.name.as_str(), text)
                })
                .collect();
            values.insert("__dashboard", s.dashboard_title.clone());
            interpolate(template, &values)
        })
    }

    fn variables(&self) -> Vec<VariableModel> {
        self.read(|s| s.variables.clone())
    }

    fn build_info(&self) -> BuildInfo {
        self.read(|s| s.build_info.clone())
    }

    fn license_info(&self) -> LicenseInfo {
        self.read(|s| s.license_info.clone())
    }

    fn user(&self) -> UserProfile {
        self.read(|s| s.user.clone())
    }

    fn time_range(&self) -> TimeRange {
        self.read(|s| s.time_range.clone())
    }

    fn time_zone(&self) -> String {
        self.read(|s| s.time_zone.clone())
    }

    fn time_origin(&self) -> i64 {
        self.read(|s| s.time_origin)
    }

    fn has_focus(&self) -> bool {
        self.read(|s| s.has_focus)
    }
}

/// Replace `$name`, `${name}` and `[[name]]` references found in `values`.
fn interpolate(template: &str, values: &HashMap<&str, String>) -> String {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['$', '[']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(inner) = tail.strip_prefix("${") {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 3),
                None => ("", 0),
            }
        } else if let Some(inner) = tail.strip_prefix("[[") {
            match inner.find("]]") {
                Some(end) => (&inner[..end], end + 4),
                None => ("", 0),
            }
        } else if let Some(inner) = tail.strip_prefix('$') {
            let end = inner.find(|c: char| !is_ident(c)).unwrap_or(inner.len());
            (&inner[..end], end + 1)
        } else {
            ("", 0)
        };

        match values.get(name) {
            Some(value) if consumed > 0 => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            _ => {
                let skip = tail.chars().next().map_or(1, char::len_utf8);
                out.push_str(&tail[..skip]);
                rest = &tail[skip..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> StaticHost {
        StaticHost::new(Location::default(), "Overview").with_variables(vec![
            VariableModel::new("env", "custom", CurrentValue::Single("prod".into())),
            VariableModel::new(
                "region",
                "query",
                CurrentValue::Multi(vec!["eu".into(), "us".into()]),
            ),
        ])
    }

    #[test]
    fn resolves_all_reference_styles() {
        let h = host();
        assert_eq!(h.resolve("$__dashboard"), "Overview");
        assert_eq!(
            h.resolve("https://c.example/${env}/[[region]]/$env-x"),
            "https://c.example/prod/eu,us/prod-x"
        );
    }

    #[test]
    fn unknown_references_pass_through() {
        let h = host();
        assert_eq!(h.resolve("$missing and ${nope}"), "$missing and ${nope}");
        assert_eq!(h.resolve("[[open"), "[[open");
        assert_eq!(h.resolve("cost: 5$"), "cost: 5$");
    }

    #[test]
    fn from_url_splits_location() {
        let h = StaticHost::from_url("https://grafana.local:3000/d/abc/overview", "Overview")
            .unwrap();
        let loc = h.location();
        assert_eq!(loc.hostname, "grafana.local");
        assert_eq!(loc.port, "3000");
        assert_eq!(loc.protocol, "https:");
        assert_eq!(loc.pathname, "/d/abc/overview");
    }

    #[test]
    fn current_value_shapes_deserialize() {
        let single: VariableModel =
            serde_json::from_str(r#"{"name":"a","label":null,"type":"custom","current":"x"}"#)
                .unwrap();
        assert_eq!(single.current, CurrentValue::Single("x".into()));

        let multi: VariableModel =
            serde_json::from_str(r#"{"name":"a","label":"A","type":"custom","current":["x","y"]}"#)
                .unwrap();
        assert_eq!(multi.current, CurrentValue::Multi(vec!["x".into(), "y".into()]));

        let unset: VariableModel =
            serde_json::from_str(r#"{"name":"a","label":null,"type":"textbox"}"#).unwrap();
        assert_eq!(unset.current, CurrentValue::Unset);
    }
}
