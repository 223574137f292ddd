//! Notification Session Controller.
//!
//! Owns the lifecycle of one session against one peripheral:
//!
//! ```text
//! Idle ──start──▶ Starting ──subscribed + start writes──▶ Recording
//!   ▲                 │                                      │
//!   │       transport error / stop                          stop / record timer
//!   │                 ▼                                      ▼
//!   └───────────────────────────── Idle ◀────────────── Stopping
//! ```
//!
//! | Operation | Legal from | Effect |
//! |---|---|---|
//! | [`SessionController::start_session`] | `Idle` | fresh decoder, subscribe, start writes, spawn decode task |
//! | [`SessionController::stop_session`] | any | stop writes and unsubscribe (best effort), always ends in `Idle` |
//! | [`SessionController::reset`] | any | stop, then clear channels and counters |
//!
//! Notifications are drained by a single spawned task per session, so a
//! channel is never mutated by two notifications at once. The task checks
//! the session generation and state under the lock before decoding, which
//! makes late deliveries after `stop()` a no-op. When the stream ends on its
//! own (the link dropped) while recording, the session is stopped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};
use crate::profiles::Profile;
use crate::protocol::{CMD_START, RANGE_SERVICE, RANGE_SITE_SURVEY};
use crate::session::{Session, SessionSummary};
use crate::transport::{write_all_best_effort, PeripheralTransport};
use crate::types::{NotificationEvent, Sample, SessionState, SubscriptionHandle};

// ── SessionRegistry ──────────────────────────────────────────────────────────

/// Peripheral/service pairs that currently have a live session.
///
/// Clones share the same set. Controllers built with the same registry refuse
/// to run two sessions on one peripheral service, which would otherwise
/// double-subscribe the same characteristics. [`SessionController::new`] uses
/// [`SessionRegistry::global`].
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<(String, Uuid)>>>,
}

impl SessionRegistry {
    /// A registry of its own, shared only with its clones.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new).clone()
    }

    fn set(&self) -> MutexGuard<'_, HashSet<(String, Uuid)>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn claim(&self, peripheral_id: &str, service: Uuid) -> Result<(), SessionError> {
        if self.set().insert((peripheral_id.to_owned(), service)) {
            Ok(())
        } else {
            Err(SessionError::Busy {
                peripheral_id: peripheral_id.to_owned(),
                service,
            })
        }
    }

    pub fn release(&self, peripheral_id: &str, service: Uuid) {
        self.set().remove(&(peripheral_id.to_owned(), service));
    }

    pub fn is_active(&self, peripheral_id: &str, service: Uuid) -> bool {
        self.set().contains(&(peripheral_id.to_owned(), service))
    }
}

// ── Shared state ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    state: SessionState,
    /// Bumped by every `start()`; tasks and in-flight starts compare against
    /// the value they were created with.
    generation: u64,
    session: Option<Session>,
    subscriptions: Vec<SubscriptionHandle>,
    decode_task: Option<JoinHandle<()>>,
    auto_stop: Option<oneshot::Sender<()>>,
    claim: Option<(String, Uuid)>,
    /// Set once the first start write has been issued; the peripheral may be
    /// streaming even though the session never reached `Recording`.
    start_writes_issued: bool,
}

struct Inner<T: PeripheralTransport> {
    transport: Arc<T>,
    registry: SessionRegistry,
    shared: Mutex<Shared>,
}

/// Lock-free view of what `stop()` has to tear down.
struct Teardown {
    peripheral_id: String,
    profile: Option<Profile>,
    subscriptions: Vec<SubscriptionHandle>,
    send_stop_writes: bool,
}

// ── SessionController ────────────────────────────────────────────────────────

/// Drives one notification session at a time over a [`PeripheralTransport`].
pub struct SessionController<T: PeripheralTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: PeripheralTransport> SessionController<T> {
    /// A controller bound to the process-wide [`SessionRegistry`].
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_registry(transport, SessionRegistry::global())
    }

    /// A controller that shares its single-session bookkeeping with others.
    pub fn with_registry(transport: Arc<T>, registry: SessionRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                registry,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Start recording `profile` from `peripheral_id`.
    ///
    /// Only legal from `Idle`. The previous session's data is discarded. On a
    /// transport failure every subscription made so far is released and the
    /// controller returns to `Idle`.
    pub async fn start_session(
        &self,
        profile: Profile,
        peripheral_id: &str,
        config: SessionConfig,
    ) -> Result<(), SessionError> {
        self.inner.start(profile, peripheral_id, config).await
    }

    /// Stop the current session. Idempotent; always ends in `Idle`.
    pub async fn stop_session(&self) {
        self.inner.stop(None).await;
    }

    /// Stop if needed, then clear channels, counters and carried state.
    pub async fn reset(&self) {
        self.inner.stop(None).await;
        if let Some(session) = self.inner.lock().session.as_mut() {
            session.reset();
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Profile of the current (or last finished) session.
    pub fn profile(&self) -> Option<Profile> {
        self.inner.lock().session.as_ref().map(Session::profile)
    }

    pub fn channel_snapshot(&self, name: &str) -> Result<Vec<Sample>, SessionError> {
        self.with_session(|s| {
            s.snapshot(name)
                .ok_or_else(|| SessionError::UnknownChannel(name.to_owned()))
        })?
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.with_session(Session::channel_names).unwrap_or_default()
    }

    pub fn export_session(&self) -> Result<String, SessionError> {
        self.with_session(Session::export)
    }

    pub fn summary(&self) -> Result<SessionSummary, SessionError> {
        self.with_session(Session::summary)
    }

    /// Capture the next respiration magnitude as the baseline.
    pub fn arm_baseline(&self) -> Result<(), SessionError> {
        let mut shared = self.inner.lock();
        let session = shared.session.as_mut().ok_or(SessionError::NoSession)?;
        if session.arm_baseline() {
            info!("{}: baseline capture armed", session.profile());
            Ok(())
        } else {
            Err(SessionError::Unsupported(
                "baseline capture",
                session.profile().name(),
            ))
        }
    }

    /// Ask a range-test peripheral to start a site survey.
    pub async fn trigger_site_survey(&self) -> Result<(), SessionError> {
        let peripheral_id = {
            let shared = self.inner.lock();
            let session = shared.session.as_ref().ok_or(SessionError::NotRecording)?;
            if session.profile() != Profile::RangeTest {
                return Err(SessionError::Unsupported(
                    "site survey",
                    session.profile().name(),
                ));
            }
            if shared.state != SessionState::Recording {
                return Err(SessionError::NotRecording);
            }
            session.peripheral_id().to_owned()
        };
        self.inner
            .transport
            .write(&peripheral_id, RANGE_SERVICE, RANGE_SITE_SURVEY, &CMD_START)
            .await?;
        info!("site survey triggered on {peripheral_id}");
        Ok(())
    }

    fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> Result<R, SessionError> {
        let shared = self.inner.lock();
        shared.session.as_ref().map(f).ok_or(SessionError::NoSession)
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

impl<T: PeripheralTransport> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` while the start identified by `generation` is still wanted.
    fn still_starting(&self, generation: u64) -> bool {
        let shared = self.lock();
        shared.generation == generation && shared.state == SessionState::Starting
    }

    async fn start(
        self: &Arc<Self>,
        profile: Profile,
        peripheral_id: &str,
        config: SessionConfig,
    ) -> Result<(), SessionError> {
        let service = profile.primary_service();
        let generation = {
            let mut shared = self.lock();
            match shared.state {
                SessionState::Idle => {}
                SessionState::Starting | SessionState::Recording => {
                    return Err(SessionError::AlreadyRecording)
                }
                SessionState::Stopping => {
                    return Err(SessionError::InvalidState(SessionState::Stopping))
                }
            }
            self.registry.claim(peripheral_id, service)?;
            shared.claim = Some((peripheral_id.to_owned(), service));
            shared.generation += 1;
            shared.state = SessionState::Starting;
            shared.session = Some(Session::new(profile, peripheral_id, config.clone()));
            shared.subscriptions.clear();
            shared.start_writes_issued = false;
            shared.generation
        };
        info!("{profile}: starting session on {peripheral_id}");

        // Take the stream before subscribing so the first notifications are
        // not lost.
        let events = match self.transport.notifications(peripheral_id).await {
            Ok(events) => events,
            Err(e) => return Err(self.abort_start(generation, e).await),
        };

        for (service, characteristic) in profile.subscriptions() {
            let result = self
                .transport
                .subscribe(peripheral_id, service, characteristic)
                .await;
            let handle = SubscriptionHandle {
                peripheral_id: peripheral_id.to_owned(),
                service,
                characteristic,
            };
            let cancelled = {
                let mut shared = self.lock();
                let cancelled = shared.generation != generation
                    || shared.state != SessionState::Starting;
                if !cancelled && result.is_ok() {
                    shared.subscriptions.push(handle.clone());
                }
                cancelled
            };
            if cancelled {
                if result.is_ok() {
                    self.release(&[handle]).await;
                }
                info!("{profile}: start on {peripheral_id} cancelled by stop()");
                return Err(SessionError::Cancelled);
            }
            if let Err(e) = result {
                return Err(self.abort_start(generation, e).await);
            }
        }

        for write in profile.start_writes() {
            {
                let mut shared = self.lock();
                if shared.generation != generation || shared.state != SessionState::Starting {
                    info!("{profile}: start on {peripheral_id} cancelled by stop()");
                    return Err(SessionError::Cancelled);
                }
                shared.start_writes_issued = true;
            }
            let result = self
                .transport
                .write(peripheral_id, write.service, write.characteristic, &write.bytes)
                .await;
            if !self.still_starting(generation) {
                // stop() may have sent its stop writes before this one landed.
                write_all_best_effort(
                    self.transport.as_ref(),
                    peripheral_id,
                    &profile.stop_writes(),
                )
                .await;
                info!("{profile}: start on {peripheral_id} cancelled by stop()");
                return Err(SessionError::Cancelled);
            }
            if let Err(e) = result {
                return Err(self.abort_start(generation, e).await);
            }
        }

        {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != SessionState::Starting {
                return Err(SessionError::Cancelled);
            }
            shared.decode_task = Some(self.spawn_decoder(generation, events));
            if let Some(secs) = config.record_duration_secs {
                shared.auto_stop = Some(self.schedule_stop(generation, secs));
            }
            shared.state = SessionState::Recording;
            info!(
                "{profile}: recording on {peripheral_id} ({} subscription(s))",
                shared.subscriptions.len()
            );
        }

        self.initial_reads(profile, peripheral_id, generation).await;
        Ok(())
    }

    /// Read the characteristics a profile wants before its first notification
    /// and feed the values to the session.
    async fn initial_reads(&self, profile: Profile, peripheral_id: &str, generation: u64) {
        for (service, characteristic) in profile.initial_reads() {
            match self.transport.read(peripheral_id, service, characteristic).await {
                Ok(value) => {
                    let event =
                        NotificationEvent::new(peripheral_id, service, characteristic, value);
                    let mut shared = self.lock();
                    if shared.generation != generation || shared.state != SessionState::Recording {
                        return;
                    }
                    if let Some(session) = shared.session.as_mut() {
                        let _ = session.ingest(&event, Instant::now());
                    }
                }
                Err(e) => warn!("{profile}: initial read of {characteristic} failed: {e}"),
            }
        }
    }

    /// Undo a failed start and hand back the error for the caller.
    async fn abort_start(&self, generation: u64, error: TransportError) -> SessionError {
        warn!("session start failed: {error}");
        let (subscriptions, disable) = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != SessionState::Starting {
                return SessionError::Cancelled;
            }
            shared.state = SessionState::Idle;
            if let Some((id, service)) = shared.claim.take() {
                self.registry.release(&id, service);
            }
            let disable = if shared.start_writes_issued {
                shared
                    .session
                    .as_ref()
                    .map(|s| (s.peripheral_id().to_owned(), s.profile().stop_writes()))
            } else {
                None
            };
            (std::mem::take(&mut shared.subscriptions), disable)
        };
        if let Some((peripheral_id, writes)) = disable {
            write_all_best_effort(self.transport.as_ref(), &peripheral_id, &writes).await;
        }
        self.release(&subscriptions).await;
        SessionError::Transport(error)
    }

    fn spawn_decoder(
        self: &Arc<Self>,
        generation: u64,
        mut events: BoxStream<'static, NotificationEvent>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut shared = inner.lock();
                if shared.generation != generation {
                    return;
                }
                if shared.state != SessionState::Recording {
                    continue;
                }
                if let Some(session) = shared.session.as_mut() {
                    // Rejections are counted and logged by the session.
                    let _ = session.ingest(&event, Instant::now());
                }
            }
            debug!("decode task for generation {generation} finished");

            // The stream only ends on its own when the link is gone.
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let recording = {
                let shared = inner.lock();
                shared.generation == generation && shared.state == SessionState::Recording
            };
            if recording {
                warn!("notification stream ended while recording; stopping session");
                // stop() aborts this task, so it runs on its own.
                tokio::spawn(async move { inner.stop(Some(generation)).await });
            }
        })
    }

    fn schedule_stop(self: &Arc<Self>, generation: u64, secs: u64) -> oneshot::Sender<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    if let Some(inner) = weak.upgrade() {
                        info!("record duration of {secs} s reached");
                        inner.stop(Some(generation)).await;
                    }
                }
                _ = cancel_rx => {}
            }
        });
        cancel_tx
    }

    /// Tear down the session. With `only` set, do nothing unless that
    /// generation is still current.
    async fn stop(&self, only: Option<u64>) {
        let teardown = {
            let mut shared = self.lock();
            if only.is_some_and(|g| g != shared.generation) {
                return;
            }
            let send_stop_writes = match shared.state {
                SessionState::Idle | SessionState::Stopping => return,
                SessionState::Starting => shared.start_writes_issued,
                SessionState::Recording => true,
            };
            shared.state = SessionState::Stopping;
            if let Some(cancel) = shared.auto_stop.take() {
                let _ = cancel.send(());
            }
            if let Some(task) = shared.decode_task.take() {
                task.abort();
            }
            Teardown {
                peripheral_id: shared
                    .session
                    .as_ref()
                    .map(|s| s.peripheral_id().to_owned())
                    .unwrap_or_default(),
                profile: shared.session.as_ref().map(Session::profile),
                subscriptions: std::mem::take(&mut shared.subscriptions),
                send_stop_writes,
            }
        };

        if let (true, Some(profile)) = (teardown.send_stop_writes, teardown.profile) {
            write_all_best_effort(
                self.transport.as_ref(),
                &teardown.peripheral_id,
                &profile.stop_writes(),
            )
            .await;
        }
        self.release(&teardown.subscriptions).await;

        let mut shared = self.lock();
        shared.state = SessionState::Idle;
        if let Some((id, service)) = shared.claim.take() {
            self.registry.release(&id, service);
        }
        info!("session on {} stopped", teardown.peripheral_id);
    }

    /// Unsubscribe every handle, logging failures.
    async fn release(&self, subscriptions: &[SubscriptionHandle]) {
        for s in subscriptions {
            if let Err(e) = self
                .transport
                .unsubscribe(&s.peripheral_id, s.service, s.characteristic)
                .await
            {
                warn!(
                    "unsubscribe {} on {} failed: {e}",
                    s.characteristic, s.peripheral_id
                );
            }
        }
    }
}

impl<T: PeripheralTransport> Drop for Inner<T> {
    fn drop(&mut self) {
        let (subscriptions, claim) = {
            let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let Some(cancel) = shared.auto_stop.take() {
                let _ = cancel.send(());
            }
            if let Some(task) = shared.decode_task.take() {
                task.abort();
            }
            (std::mem::take(&mut shared.subscriptions), shared.claim.take())
        };
        if let Some((id, service)) = claim {
            self.registry.release(&id, service);
        }
        if subscriptions.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = Arc::clone(&self.transport);
                handle.spawn(async move {
                    for s in subscriptions {
                        if let Err(e) = transport
                            .unsubscribe(&s.peripheral_id, s.service, s.characteristic)
                            .await
                        {
                            warn!("unsubscribe {} on drop failed: {e}", s.characteristic);
                        }
                    }
                });
            }
            Err(_) => warn!(
                "controller dropped outside a runtime; {} subscription(s) left active",
                subscriptions.len()
            ),
        }
    }
}
