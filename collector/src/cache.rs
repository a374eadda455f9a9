//! Per-session cache folded from received payloads.
use beacon_core::host::UserProfile;
use beacon_core::{EventType, Payload};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Latest payload of a session plus the lifecycle times seen so far (epoch seconds)
#[derive(Debug, Clone)]
pub struct Session {
    pub payload: Payload,
    pub start: Option<i64>,
    pub heartbeats: Vec<i64>,
    pub end: Option<i64>,
}

impl Session {
    /// Time viewed, with gaps between consecutive lifecycle times capped at
    /// `max`. A zero `max` falls back to 1.25 × the session's heartbeat
    /// interval when heartbeats were seen, and to no cap otherwise.
    pub fn duration(&self, max: Duration) -> Duration {
        let Some(start) = self.start else {
            return Duration::ZERO;
        };

        if !self.heartbeats.is_empty() {
            let max = if max.is_zero() {
                let interval = Duration::from_secs(self.payload.options.heartbeat_interval);
                interval + interval / 4
            } else {
                max
            };

            let mut times = self.heartbeats.clone();
            times.push(start);
            times.extend(self.end);
            times.sort_unstable();

            return times
                .windows(2)
                .map(|pair| {
                    let gap = Duration::from_secs(pair[1].saturating_sub(pair[0]).max(0) as u64);
                    gap.min(max)
                })
                .sum();
        }

        let Some(end) = self.end else {
            return Duration::ZERO;
        };
        let total = Duration::from_secs(end.saturating_sub(start).max(0) as u64);
        if max.is_zero() || total < max {
            total
        } else {
            max
        }
    }
}

pub fn user_theme(user: &UserProfile) -> &'static str {
    if user.light_theme {
        "light"
    } else {
        "dark"
    }
}

pub fn user_role(user: &UserProfile) -> &'static str {
    if user.is_grafana_admin {
        "admin"
    } else if user.has_edit_permission_in_folders {
        "editor"
    } else {
        "user"
    }
}

/// Sessions keyed by uuid
#[derive(Clone, Default)]
pub struct SessionCache {
    sessions: Arc<DashMap<String, Session>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one payload into its session.
    pub fn record(&self, payload: Payload) {
        let uuid = payload.uuid.clone();
        match payload.event_type {
            EventType::Start => {
                // A repeated start keeps the first one.
                self.sessions.entry(uuid).or_insert_with(|| Session {
                    start: Some(payload.time_origin),
                    heartbeats: Vec::new(),
                    end: None,
                    payload,
                });
            }
            EventType::Heartbeat => {
                let ts = payload.time;
                self.sessions
                    .entry(uuid)
                    .and_modify(|s| {
                        s.heartbeats.push(ts);
                        s.payload = payload.clone();
                    })
                    .or_insert_with(|| Session {
                        start: Some(ts),
                        heartbeats: vec![ts],
                        end: None,
                        payload,
                    });
            }
            EventType::End => {
                let ts = payload.time;
                self.sessions
                    .entry(uuid)
                    .and_modify(|s| {
                        s.end = Some(ts);
                        s.payload = payload.clone();
                    })
                    .or_insert_with(|| Session {
                        start: Some(ts),
                        heartbeats: Vec::new(),
                        end: Some(ts),
                        payload,
                    });
            }
        }
    }

    pub fn get(&self, uuid: &str) -> Option<Session> {
        self.sessions.get(uuid).map(|s| s.value().clone())
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    /// Clear everything once the cache holds more than `max_size` sessions.
    /// Returns whether a flush happened. A zero `max_size` never flushes.
    pub fn flush_if_oversized(&self, max_size: usize) -> bool {
        if max_size == 0 || self.sessions.len() <= max_size {
            return false;
        }
        info!(
            target: "collector",
            maxsize = max_size,
            size = self.sessions.len(),
            "Flushing cache since it exceeded the size limit"
        );
        self.sessions.clear();
        true
    }
}
