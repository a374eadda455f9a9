// Session metrics exporter
//
// Rebuilds per-session counters from the cache on every scrape.

use crate::cache::{user_role, user_theme, Session, SessionCache};
use crate::Result;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Mutex;
use std::time::Duration;
use tracing::error;

const NAMESPACE: &str = "grafana";
const SUBSYSTEM: &str = "analytics";

const LABELS: [&str; 11] = [
    "grafana_host",
    "grafana_env",
    "dashboard_name",
    "dashboard_uid",
    "dashboard_timezone",
    "user_login",
    "user_name",
    "user_theme",
    "user_timezone",
    "user_locale",
    "user_role",
];

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM)
}

pub struct SessionExporter {
    registry: Registry,
    session_count: CounterVec,
    session_duration: CounterVec,
    up: Gauge,
    total_scrapes: Counter,
    query_failures: Counter,
    cache: SessionCache,
    timeout: Duration,
    // Serializes scrapes so a reset never races another scrape's increments.
    scrape_lock: Mutex<()>,
}

impl SessionExporter {
    pub fn new(cache: SessionCache, timeout: Duration) -> Result<Self> {
        let registry = Registry::new();

        let session_count = CounterVec::new(opts("sessions_total", "Number of sessions."), &LABELS)?;
        let session_duration = CounterVec::new(
            opts("sessions_duration_seconds_total", "Duration of sessions."),
            &LABELS,
        )?;
        let up = Gauge::with_opts(opts("up", "Was the last scrape successful."))?;
        let total_scrapes = Counter::with_opts(opts("exporter_scrapes_total", "Number of scrapes."))?;
        let query_failures =
            Counter::with_opts(opts("exporter_query_failures_total", "Number of errors."))?;

        registry.register(Box::new(session_count.clone()))?;
        registry.register(Box::new(session_duration.clone()))?;
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(total_scrapes.clone()))?;
        registry.register(Box::new(query_failures.clone()))?;

        Ok(Self {
            registry,
            session_count,
            session_duration,
            up,
            total_scrapes,
            query_failures,
            cache,
            timeout,
            scrape_lock: Mutex::new(()),
        })
    }

    /// Refresh every metric from the cache and render the text exposition format.
    pub fn render(&self) -> Result<String> {
        let families = {
            let _guard = self
                .scrape_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            self.session_count.reset();
            self.session_duration.reset();

            match self.scrape() {
                Ok(()) => self.up.set(1.0),
                Err(e) => {
                    self.up.set(0.0);
                    self.query_failures.inc();
                    error!(target: "collector", error = %e, "Collection failed");
                }
            }
            self.total_scrapes.inc();

            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn format_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    fn scrape(&self) -> Result<()> {
        for session in self.cache.sessions() {
            let values = label_values(&session);
            let labels: Vec<&str> = values.iter().map(String::as_str).collect();

            self.session_count
                .get_metric_with_label_values(&labels)?
                .inc();

            if session.start.is_none() {
                error!(
                    target: "collector",
                    uuid = %session.payload.uuid,
                    "Start time is not set for session"
                );
            } else if session.end.is_some() || !session.heartbeats.is_empty() {
                self.session_duration
                    .get_metric_with_label_values(&labels)?
                    .inc_by(session.duration(self.timeout).as_secs_f64());
            }
        }
        Ok(())
    }
}

fn label_values(session: &Session) -> [String; 11] {
    let p = &session.payload;
    [
        format!("{}:{}", p.host.hostname, p.host.port),
        p.host.build_info.env.clone(),
        p.dashboard.name.clone(),
        p.dashboard.uid.clone(),
        p.time_zone.clone(),
        p.user.login.clone(),
        p.user.name.clone(),
        user_theme(&p.user).to_string(),
        p.user.timezone.clone(),
        p.user.locale.clone(),
        user_role(&p.user).to_string(),
    ]
}
