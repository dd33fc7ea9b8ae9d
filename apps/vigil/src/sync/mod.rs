//! The real-time synchronization subsystem: one event loop owns the push
//! connection, the throttle registry, the batch scheduler, and the fallback
//! poller. Timers and transport tasks never touch state directly; they send
//! events back into the loop.

use futures_util::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

pub mod batch;
pub mod connection;
pub mod coordinator;
pub mod poller;
pub mod throttle;

pub use connection::{ConnectionState, ReconnectPolicy};
pub use coordinator::{LifecycleCoordinator, LIVE_VIEW};

use crate::protocol::{AlertNotice, ClientMessage, Envelope, MessageKind, ResourceKind};
use crate::refresh::{NoopNotifier, NoopRefresher, Notifier, Refresher};
use crate::telemetry;
use crate::transport::{LinkEvent, OutboundFrame, Transport};
use batch::{BatchScheduler, UpdateFn};
use connection::{ConnectionManager, DropOutcome};
use poller::FallbackPoller;
use throttle::{Admission, ThrottleRegistry};

/// Tunables for the sync subsystem.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    /// Throttle window for resource-changed notifications.
    pub resource_window: Duration,
    /// Throttle window for vibration telemetry pushes.
    pub telemetry_window: Duration,
    /// Quiet period before a batched refresh flush.
    pub batch_delay: Duration,
    /// Fallback poll cadence per resource.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000/ws/live".to_string(),
            reconnect: ReconnectPolicy::default(),
            resource_window: Duration::from_secs(2),
            telemetry_window: Duration::from_secs(1),
            batch_delay: Duration::from_millis(250),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// External collaborators the subsystem drives. All slots are filled; an
/// absent collaborator is a no-op implementation.
#[derive(Clone)]
pub struct Collaborators {
    pub machines: Arc<dyn Refresher>,
    pub sensors: Arc<dyn Refresher>,
    pub models: Arc<dyn Refresher>,
    pub charts: Arc<dyn Refresher>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            machines: Arc::new(NoopRefresher),
            sensors: Arc::new(NoopRefresher),
            models: Arc::new(NoopRefresher),
            charts: Arc::new(NoopRefresher),
            notifier: Arc::new(NoopNotifier),
        }
    }
}

impl Collaborators {
    fn refresher(&self, kind: ResourceKind) -> Arc<dyn Refresher> {
        match kind {
            ResourceKind::Machines => self.machines.clone(),
            ResourceKind::Sensors => self.sensors.clone(),
            ResourceKind::Models => self.models.clone(),
        }
    }
}

/// Events consumed by the sync runtime's single event loop.
#[derive(Debug)]
pub(crate) enum SyncEvent {
    ConnectRequested,
    LinkOpened(mpsc::UnboundedSender<OutboundFrame>),
    FrameReceived(String),
    LinkClosed(Option<u16>),
    LinkFailed(String),
    ReconnectDue,
    ThrottleFired(&'static str),
    FlushBatch,
    PollDue(ResourceKind),
    Shutdown,
}

/// Owns all mutable sync state. Only `run` (or a test) calls
/// `handle_event`, so state is never concurrently mutated.
pub(crate) struct SyncRuntime<T: Transport> {
    cfg: SyncConfig,
    transport: Arc<T>,
    client_id: String,
    conn: ConnectionManager,
    throttle: ThrottleRegistry,
    batch: BatchScheduler,
    poller: FallbackPoller,
    collab: Collaborators,
    update_fns: HashMap<ResourceKind, UpdateFn>,
    charts_fn: UpdateFn,
    events: mpsc::UnboundedSender<SyncEvent>,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    pump: Option<tokio::task::JoinHandle<()>>,
    reconnect_timer: Option<tokio::task::JoinHandle<()>>,
    running: bool,
}

fn update_fn(refresher: Arc<dyn Refresher>) -> UpdateFn {
    Arc::new(move || {
        let refresher = refresher.clone();
        async move { refresher.refresh().await }.boxed()
    })
}

impl<T: Transport> SyncRuntime<T> {
    pub fn new(
        cfg: SyncConfig,
        transport: Arc<T>,
        collab: Collaborators,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (conn, state_rx) = ConnectionManager::new(cfg.reconnect.clone());
        let throttle = ThrottleRegistry::new(events.clone());
        let batch = BatchScheduler::new(cfg.batch_delay, events.clone());
        let poller = FallbackPoller::new(cfg.poll_interval, events.clone());

        // Built once so every queue of the same resource carries the same
        // Arc identity, which is what the batch dedupe keys on.
        let update_fns = ResourceKind::ALL
            .iter()
            .map(|&kind| (kind, update_fn(collab.refresher(kind))))
            .collect();
        let charts_fn = update_fn(collab.charts.clone());

        (
            Self {
                cfg,
                transport,
                client_id: uuid::Uuid::new_v4().to_string(),
                conn,
                throttle,
                batch,
                poller,
                collab,
                update_fns,
                charts_fn,
                events,
                outbound: None,
                pump: None,
                reconnect_timer: None,
                running: true,
            },
            state_rx,
        )
    }

    pub async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<SyncEvent>) {
        debug!(target: "sync::loop", "sync loop started");
        while let Some(event) = events_rx.recv().await {
            self.handle_event(event).await;
            if !self.running {
                break;
            }
        }
        debug!(target: "sync::loop", "sync loop stopped");
    }

    pub async fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::ConnectRequested => {
                self.conn.begin_connect();
                self.spawn_connect();
            }
            SyncEvent::LinkOpened(outbound) => self.on_open(outbound),
            SyncEvent::FrameReceived(text) => self.on_frame(&text),
            SyncEvent::LinkClosed(code) => {
                debug!(target: "sync::connection", ?code, "link closed");
                self.drop_link();
                let outcome = self.conn.mark_closed(code);
                self.after_drop(outcome);
            }
            SyncEvent::LinkFailed(reason) => {
                warn!(target: "sync::connection", %reason, "transport error");
                self.drop_link();
                let outcome = self.conn.mark_error();
                self.after_drop(outcome);
            }
            SyncEvent::ReconnectDue => {
                if self.conn.resume_connect() {
                    self.spawn_connect();
                }
            }
            SyncEvent::ThrottleFired(key) => {
                let Some(kind) = MessageKind::from_tag(key) else {
                    return;
                };
                if let Some(envelope) = self.throttle.take_due(key) {
                    trace!(target: "sync::throttle", key, payload = %envelope.data, "deferred fire");
                    self.apply(kind);
                }
            }
            SyncEvent::FlushBatch => self.flush_batch().await,
            SyncEvent::PollDue(kind) => self.poll_tick(kind).await,
            SyncEvent::Shutdown => self.teardown(),
        }
    }

    fn spawn_connect(&mut self) {
        let transport = self.transport.clone();
        let url = self.cfg.ws_url.clone();
        let events = self.events.clone();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.pump = Some(tokio::spawn(async move {
            match transport.connect(&url).await {
                Ok(mut link) => {
                    if events.send(SyncEvent::LinkOpened(link.sender())).is_err() {
                        return;
                    }
                    while let Some(link_event) = link.recv().await {
                        let forwarded = match link_event {
                            LinkEvent::Frame(text) => {
                                events.send(SyncEvent::FrameReceived(text))
                            }
                            LinkEvent::Closed(code) => {
                                let _ = events.send(SyncEvent::LinkClosed(code));
                                return;
                            }
                        };
                        if forwarded.is_err() {
                            return;
                        }
                    }
                    let _ = events.send(SyncEvent::LinkClosed(None));
                }
                Err(err) => {
                    let _ = events.send(SyncEvent::LinkFailed(err.to_string()));
                }
            }
        }));
    }

    fn on_open(&mut self, outbound: mpsc::UnboundedSender<OutboundFrame>) {
        if self.conn.state() != ConnectionState::Connecting {
            debug!(target: "sync::connection", state = self.conn.state().as_str(), "stale open ignored");
            return;
        }
        self.conn.mark_open();
        self.collab.notifier.connection_status(ConnectionState::Connected);
        self.poller.stop();

        let request = ClientMessage::RequestInitialData {
            client_id: self.client_id.clone(),
            resources: ResourceKind::ALL.to_vec(),
        };
        match request.encode() {
            Ok(text) => {
                let _ = outbound.send(OutboundFrame::Text(text));
            }
            Err(err) => warn!(target: "sync::connection", error = %err, "encode failed"),
        }
        self.outbound = Some(outbound);

        // The snapshot we just asked for supersedes change notifications
        // arriving inside the next window; they coalesce instead of
        // triggering an immediate re-fetch.
        for kind in MessageKind::THROTTLED {
            self.throttle.prime(kind.tag());
        }
    }

    fn on_frame(&mut self, raw: &str) {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                telemetry::incr("sync.decode_failures");
                warn!(target: "sync::loop", error = %err, "dropping undecodable frame");
                return;
            }
        };
        telemetry::incr("sync.frames");

        let Some(kind) = envelope.message_kind() else {
            debug!(target: "sync::loop", kind = %envelope.kind, "dropping unknown message kind");
            return;
        };

        match kind {
            MessageKind::Ping => {
                telemetry::incr("sync.pings");
                trace!(target: "sync::loop", "ping");
            }
            MessageKind::ResyncAll => {
                debug!(target: "sync::loop", "bulk resync requested by server");
                for kind in ResourceKind::ALL {
                    self.queue_resource(kind);
                }
                self.batch.queue("charts", self.charts_fn.clone());
                for kind in MessageKind::THROTTLED {
                    self.throttle.prime(kind.tag());
                }
            }
            MessageKind::Alert => match serde_json::from_value::<AlertNotice>(envelope.data) {
                Ok(alert) => self.collab.notifier.alert_raised(&alert),
                Err(err) => {
                    telemetry::incr("sync.decode_failures");
                    warn!(target: "sync::loop", error = %err, "dropping malformed alert");
                }
            },
            MessageKind::MachineChanged
            | MessageKind::SensorChanged
            | MessageKind::ModelChanged
            | MessageKind::VibrationData => {
                let window = match kind {
                    MessageKind::VibrationData => self.cfg.telemetry_window,
                    _ => self.cfg.resource_window,
                };
                match self.throttle.admit(kind.tag(), window, envelope) {
                    Admission::Immediate => self.apply(kind),
                    Admission::Coalesced => {
                        telemetry::incr("sync.coalesced");
                        trace!(target: "sync::throttle", key = kind.tag(), "coalesced");
                    }
                }
            }
        }
    }

    fn apply(&mut self, kind: MessageKind) {
        if let Some(resource) = kind.resource() {
            self.queue_resource(resource);
        } else if kind == MessageKind::VibrationData {
            self.batch.queue("charts", self.charts_fn.clone());
        }
    }

    fn queue_resource(&mut self, kind: ResourceKind) {
        if let Some(update) = self.update_fns.get(&kind) {
            self.batch.queue(kind.as_str(), update.clone());
        }
    }

    async fn flush_batch(&mut self) {
        let pending = self.batch.take_pending();
        if pending.is_empty() {
            return;
        }
        telemetry::incr("sync.batch_flushes");
        trace!(target: "sync::batch", count = pending.len(), "flushing");
        for (label, update) in pending {
            if let Err(err) = update().await {
                warn!(target: "sync::batch", collaborator = label, error = %err, "refresh failed");
            }
        }
    }

    async fn poll_tick(&mut self, kind: ResourceKind) {
        if self.conn.state() == ConnectionState::Connected {
            telemetry::incr("sync.poll_suppressed");
            trace!(target: "sync::poller", resource = kind.as_str(), "tick suppressed");
            return;
        }
        trace!(target: "sync::poller", resource = kind.as_str(), "poll tick");
        if let Some(update) = self.update_fns.get(&kind) {
            if let Err(err) = update().await {
                warn!(target: "sync::poller", resource = kind.as_str(), error = %err, "poll refresh failed");
            }
        }
    }

    fn after_drop(&mut self, outcome: DropOutcome) {
        self.collab
            .notifier
            .connection_status(ConnectionState::Disconnected);
        // The poller is the safety net for every drop, normal or not.
        self.poller.start(&ResourceKind::ALL);
        match outcome {
            DropOutcome::NormalClosure => {}
            DropOutcome::Retry { attempt, delay } => {
                telemetry::incr("sync.reconnect_attempts");
                info!(
                    target: "sync::connection",
                    attempt,
                    max = self.cfg.reconnect.max_attempts,
                    "scheduling reconnect"
                );
                if let Some(timer) = self.reconnect_timer.take() {
                    timer.abort();
                }
                let events = self.events.clone();
                self.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SyncEvent::ReconnectDue);
                }));
            }
            DropOutcome::Exhausted => {
                warn!(target: "sync::connection", "reconnect budget exhausted");
                self.collab.notifier.reconnect_exhausted();
            }
        }
    }

    fn drop_link(&mut self) {
        self.outbound = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn teardown(&mut self) {
        debug!(target: "sync::loop", "tearing down");
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(OutboundFrame::Close);
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.conn.mark_shutdown();
        self.batch.cancel_all();
        self.poller.stop();
        self.throttle.clear();
        self.running = false;
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    #[cfg(test)]
    pub fn poller_active(&self) -> bool {
        self.poller.is_active()
    }

    #[cfg(test)]
    pub fn batch_pending(&self) -> usize {
        self.batch.pending_len()
    }

    #[cfg(test)]
    pub fn current_attempt(&self) -> u32 {
        self.conn.current_attempt()
    }
}

/// A live sync session: the spawned event loop plus the handles the
/// coordinator needs to observe and stop it.
pub struct SyncSession {
    events: mpsc::UnboundedSender<SyncEvent>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SyncSession {
    pub fn spawn<T: Transport>(cfg: SyncConfig, transport: Arc<T>, collab: Collaborators) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (runtime, state_rx) = SyncRuntime::new(cfg, transport, collab, events_tx.clone());
        let _ = events_tx.send(SyncEvent::ConnectRequested);
        tokio::spawn(runtime.run(events_rx));
        Self {
            events: events_tx,
            state_rx,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.events.send(SyncEvent::Shutdown);
    }
}
