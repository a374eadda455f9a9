//! Session lifecycle dispatcher.
//!
//! Drives one viewing session through `start`, periodic `heartbeat` and `end`
//! payloads. The host calls [`SessionDispatcher::start`] on mount,
//! [`SessionDispatcher::reconcile`] whenever it re-renders the panel with new
//! options, and [`SessionDispatcher::stop`] on unmount.
//!
//! All state lives behind one mutex that is never held across an await. A
//! payload is snapshotted and assembled while the lock is held, so a heartbeat
//! can never be built after the session has moved to `Ended`.
use crate::error::DispatchError;
use crate::host::HostContext;
use crate::options::{ConfigFingerprint, PanelOptions};
use crate::payload::{assemble, EventType, OutboundPayload, PayloadShape};
use crate::render::{PanelAction, PanelState};
use crate::snapshot::snapshot;
use crate::transport::{classify_status, RequestMode, Transport, TransportResponse};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

const ERROR_CHANNEL_CAPACITY: usize = 16;
// About thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not mounted yet
    #[default]
    Idle,
    /// uuid assigned, heartbeat timer possibly armed
    Started,
    /// Unmounted; only the final `end` payload may still go out
    Ended,
}

/// Point-in-time view of the dispatcher's state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchState {
    pub session: SessionState,
    pub uuid: Option<String>,
    pub timer_frequency: Option<u64>,
    pub fingerprint: ConfigFingerprint,
    pub last_error: Option<DispatchError>,
    /// Requests sent but not yet settled
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct SessionSlot {
    view: DispatchState,
    timer: Option<JoinHandle<()>>,
    last_payload: Option<OutboundPayload>,
    /// Returned by a `start` response, used for the follow-location `end`
    end_location: Option<String>,
}

/// A payload that passed validation and is ready to send
struct Prepared {
    event: EventType,
    uuid: String,
    url: Url,
    body: Vec<u8>,
    mode: RequestMode,
}

/// Settles one request counted in `in_flight`, also when the delivering
/// future is dropped before the response arrives.
struct InFlight<'a> {
    inner: &'a Inner,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut slot = self.inner.lock();
        slot.view.in_flight = slot.view.in_flight.saturating_sub(1);
    }
}

struct Inner {
    host: Arc<dyn HostContext>,
    transport: Arc<dyn Transport>,
    options: RwLock<PanelOptions>,
    slot: Mutex<SessionSlot>,
    errors: broadcast::Sender<DispatchError>,
}

/// Lifecycle state machine for one mounted panel
pub struct SessionDispatcher {
    inner: Arc<Inner>,
}

impl SessionDispatcher {
    pub fn new(
        options: PanelOptions,
        host: Arc<dyn HostContext>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                host,
                transport,
                options: RwLock::new(options),
                slot: Mutex::new(SessionSlot::default()),
                errors,
            }),
        }
    }

    /// Mount: open the session, send `start` if enabled, then arm heartbeats.
    ///
    /// The heartbeat policy is applied whether or not `start` succeeded. The
    /// returned result is that of the `start` dispatch, which is also recorded.
    pub async fn start(&self) -> Result<(), DispatchError> {
        let options = self.inner.options();
        {
            let mut slot = self.inner.lock();
            if slot.view.session != SessionState::Idle {
                warn!(target: "dispatcher", session = ?slot.view.session, "Session already started");
                return Ok(());
            }
            let uuid = uuid::Uuid::new_v4().to_string();
            info!(target: "dispatcher", uuid = %uuid, "Session started");
            slot.view.session = SessionState::Started;
            slot.view.uuid = Some(uuid);
            slot.view.fingerprint = options.fingerprint(self.inner.host.as_ref());
        }

        let result = if options.post_start {
            self.inner.dispatch(EventType::Start).await
        } else {
            Ok(())
        };

        Inner::reconcile_timer(&self.inner);
        result
    }

    /// Re-render with new options. Refreshes derived values and re-applies the
    /// heartbeat policy; never re-sends `start`. Must run inside a Tokio runtime.
    pub fn reconcile(&self, options: PanelOptions) {
        if let Err(e) = options.validate() {
            warn!(target: "dispatcher", error = %e, "Heartbeat disabled by invalid options");
        }

        let fingerprint = options.fingerprint(self.inner.host.as_ref());
        {
            let mut slot = self.inner.lock();
            if slot.view.session == SessionState::Ended {
                debug!(target: "dispatcher", "Ignoring options change after unmount");
                return;
            }
            if slot.view.fingerprint != fingerprint {
                debug!(
                    target: "dispatcher",
                    server = %fingerprint.server,
                    dashboard = %fingerprint.dashboard_name,
                    variables = fingerprint.variables.len(),
                    "Derived options changed"
                );
                slot.view.fingerprint = fingerprint;
            }
        }
        *self
            .inner
            .options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = options;

        Inner::reconcile_timer(&self.inner);
    }

    /// One heartbeat timer event. No-op unless the session is started with an
    /// armed timer, or while unfocused when `heartbeatAlways` is off.
    pub async fn heartbeat_tick(&self) -> Result<(), DispatchError> {
        self.inner.heartbeat().await
    }

    /// Send `start` again for the current session.
    pub async fn retry(&self) -> Result<(), DispatchError> {
        info!(target: "dispatcher", uuid = ?self.uuid(), "Retrying start");
        self.inner.dispatch(EventType::Start).await
    }

    pub async fn handle(&self, action: PanelAction) -> Result<(), DispatchError> {
        match action {
            PanelAction::RetryStart => self.retry().await,
        }
    }

    /// Unmount: clear the heartbeat timer, then send `end` if enabled.
    ///
    /// The timer is cleared before this returns. The `end` payload is built
    /// immediately and delivered on a detached task; delivery is best effort,
    /// never retried, and failures are only logged. The handle may be dropped.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let options = self.inner.options();
        {
            let mut slot = self.inner.lock();
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            slot.view.timer_frequency = None;
            let was_started = slot.view.session == SessionState::Started;
            slot.view.session = SessionState::Ended;
            if !was_started {
                return None;
            }
            info!(target: "dispatcher", uuid = ?slot.view.uuid, "Session ended");
        }

        if !options.post_end {
            return None;
        }

        let prepared = match self.inner.prepare(EventType::End) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "dispatcher", error = %e, "End payload not sent");
                return None;
            }
        };

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            // Outcome intentionally discarded; failures are logged in deliver.
            let _ = inner.deliver(prepared).await;
        }))
    }

    pub fn state(&self) -> DispatchState {
        self.inner.lock().view.clone()
    }

    pub fn uuid(&self) -> Option<String> {
        self.inner.lock().view.uuid.clone()
    }

    pub fn timer_frequency(&self) -> Option<u64> {
        self.inner.lock().view.timer_frequency
    }

    /// Whether a heartbeat timer task exists and is still running
    pub fn timer_running(&self) -> bool {
        self.inner
            .lock()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn last_error(&self) -> Option<DispatchError> {
        self.inner.lock().view.last_error.clone()
    }

    pub fn last_payload(&self) -> Option<OutboundPayload> {
        self.inner.lock().last_payload.clone()
    }

    pub fn options(&self) -> PanelOptions {
        self.inner.options()
    }

    /// State consumed by [`crate::render::render`]
    pub fn panel_state(&self) -> PanelState {
        let slot = self.inner.lock();
        PanelState {
            last_error: slot.view.last_error.clone(),
            last_payload: slot.last_payload.clone(),
        }
    }

    /// Errors recorded from now on, for an attached UI
    pub fn subscribe_errors(&self) -> broadcast::Receiver<DispatchError> {
        self.inner.errors.subscribe()
    }
}

impl Drop for SessionDispatcher {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.lock().timer.take() {
            timer.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn options(&self) -> PanelOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reconcile_timer(this: &Arc<Self>) {
        let desired = this.options().heartbeat_period();
        let mut slot = this.lock();
        let desired = desired.filter(|_| slot.view.session == SessionState::Started);

        match (desired, slot.view.timer_frequency) {
            (None, None) => {}
            (Some(wanted), Some(current)) if wanted == current => {}
            (None, Some(current)) => {
                if let Some(timer) = slot.timer.take() {
                    timer.abort();
                }
                slot.view.timer_frequency = None;
                info!(target: "dispatcher", frequency = current, "Heartbeat timer cleared");
            }
            (Some(wanted), current) => {
                if let Some(timer) = slot.timer.take() {
                    timer.abort();
                }
                slot.timer = Some(Self::arm_timer(Arc::downgrade(this), wanted));
                slot.view.timer_frequency = Some(wanted);
                info!(
                    target: "dispatcher",
                    frequency = wanted,
                    previous = ?current,
                    "Heartbeat timer armed"
                );
            }
        }
    }

    fn arm_timer(weak: Weak<Self>, seconds: u64) -> JoinHandle<()> {
        let period = Duration::from_secs(seconds);
        tokio::spawn(async move {
            // A period too long to add to the clock never fires.
            let now = Instant::now();
            let first = now
                .checked_add(period)
                .unwrap_or_else(|| now + FAR_FUTURE);
            let mut interval = interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                // Ticks do not wait for each other; slow requests may overlap.
                tokio::spawn(async move {
                    let _ = inner.heartbeat().await;
                });
            }
        })
    }

    async fn heartbeat(&self) -> Result<(), DispatchError> {
        if !self.options().heartbeat_always && !self.host.has_focus() {
            debug!(target: "dispatcher", "Skipping heartbeat while unfocused");
            return Ok(());
        }
        self.dispatch(EventType::Heartbeat).await
    }

    async fn dispatch(&self, event: EventType) -> Result<(), DispatchError> {
        match self.prepare(event) {
            Ok(Some(prepared)) => self.deliver(prepared).await,
            Ok(None) => Ok(()),
            Err(e) => {
                self.record_error(event, &e);
                Err(e)
            }
        }
    }

    /// Snapshot, assemble and validate under the session lock. `Ok(None)` means
    /// the session is not in a state that allows this event.
    fn prepare(&self, event: EventType) -> Result<Option<Prepared>, DispatchError> {
        let options = self.options();
        let mut slot = self.lock();

        let allowed = match event {
            EventType::Start => slot.view.session == SessionState::Started,
            EventType::Heartbeat => {
                slot.view.session == SessionState::Started && slot.view.timer_frequency.is_some()
            }
            EventType::End => slot.view.session == SessionState::Ended,
        };
        if !allowed {
            debug!(target: "dispatcher", event = %event, session = ?slot.view.session, "Dispatch skipped");
            return Ok(None);
        }

        let uuid = slot.view.uuid.clone().unwrap_or_default();
        let snap = snapshot(&options, self.host.as_ref());
        let payload = assemble(
            event,
            &uuid,
            &options,
            &snap,
            PayloadShape::from_options(&options),
        );
        slot.last_payload = Some(payload.clone());

        if snap.dashboard.uid.is_empty() {
            return Err(DispatchError::UnidentifiedDashboard);
        }

        let server = self.host.resolve(&options.server);
        let destination = match (event, options.follow_location) {
            (EventType::End, true) => match &slot.end_location {
                Some(location) => format!("{}/{}", server.trim_end_matches('/'), location),
                None => {
                    warn!(target: "dispatcher", uuid = %uuid, "No location returned by start; end not sent");
                    return Ok(None);
                }
            },
            _ => server,
        };
        let url = Url::parse(&destination).map_err(|_| DispatchError::Configuration(destination))?;
        let body = payload
            .to_json_bytes()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        slot.view.in_flight += 1;
        Ok(Some(Prepared {
            event,
            uuid,
            url,
            body,
            mode: RequestMode::from_no_cors(options.no_cors),
        }))
    }

    async fn deliver(&self, prepared: Prepared) -> Result<(), DispatchError> {
        let Prepared {
            event,
            uuid,
            url,
            body,
            mode,
        } = prepared;
        debug!(target: "dispatcher", event = %event, uuid = %uuid, url = %url, "Sending payload");
        let in_flight = InFlight { inner: self };

        let result = match self.transport.post_json(&url, body, mode).await {
            // An opaque response is a success whatever its status.
            Ok(response) if mode == RequestMode::NoCors => Ok(response),
            Ok(response) => classify_status(response.status).map(|_| response),
            Err(e) => Err(e),
        };
        drop(in_flight);

        {
            let mut slot = self.lock();
            if let Ok(TransportResponse {
                location: Some(location),
                ..
            }) = &result
            {
                if event == EventType::Start {
                    slot.end_location = Some(location.clone());
                }
            }
            if result.is_ok() {
                slot.view.last_error = None;
            }
        }

        match result {
            Ok(response) => {
                info!(target: "dispatcher", event = %event, uuid = %uuid, status = response.status, "Payload delivered");
                Ok(())
            }
            Err(e) => {
                self.record_error(event, &e);
                Err(e)
            }
        }
    }

    fn record_error(&self, event: EventType, error: &DispatchError) {
        if event == EventType::End {
            warn!(target: "dispatcher", event = %event, error = %error, "End payload failed");
            return;
        }
        warn!(target: "dispatcher", event = %event, error = %error, "Dispatch failed");
        self.lock().view.last_error = Some(error.clone());
        // No subscribers is fine; the error stays recorded in the state.
        let _ = self.errors.send(error.clone());
    }
}
