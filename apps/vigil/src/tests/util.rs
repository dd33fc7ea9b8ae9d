//! Shared fixtures: recording collaborators and a harness that drives the
//! sync runtime's event loop by hand.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::protocol::AlertNotice;
use crate::refresh::{Notifier, Refresher};
use crate::sync::batch::UpdateFn;
use crate::sync::{Collaborators, ConnectionState, ReconnectPolicy, SyncConfig, SyncEvent, SyncRuntime};
use crate::transport::mock::MockTransport;

/// Shared, ordered record of refresh invocations.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn push(&self, label: &'static str) {
        self.0.lock().push(label);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }
}

pub struct RecordingRefresher {
    label: &'static str,
    log: CallLog,
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingRefresher {
    pub fn new(label: &'static str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            label,
            log: log.clone(),
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing(label: &'static str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            label,
            log: log.clone(),
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresher for RecordingRefresher {
    async fn refresh(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(self.label);
        if self.fail {
            Err(anyhow!("scripted refresh failure"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub statuses: Mutex<Vec<ConnectionState>>,
    exhausted: AtomicUsize,
    pub alerts: Mutex<Vec<AlertNotice>>,
}

impl RecordingNotifier {
    pub fn exhausted_count(&self) -> usize {
        self.exhausted.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn connection_status(&self, state: ConnectionState) {
        self.statuses.lock().push(state);
    }

    fn reconnect_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::SeqCst);
    }

    fn alert_raised(&self, alert: &AlertNotice) {
        self.alerts.lock().push(alert.clone());
    }
}

/// Recording collaborators plus the handles tests assert on.
pub struct TestCollab {
    pub collab: Collaborators,
    pub log: CallLog,
    pub machines: Arc<RecordingRefresher>,
    pub sensors: Arc<RecordingRefresher>,
    pub models: Arc<RecordingRefresher>,
    pub charts: Arc<RecordingRefresher>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn recording_collab() -> TestCollab {
    recording_collab_with(|log| RecordingRefresher::new("machines", log))
}

pub fn recording_collab_with(
    make_machines: impl FnOnce(&CallLog) -> Arc<RecordingRefresher>,
) -> TestCollab {
    let log = CallLog::default();
    let machines = make_machines(&log);
    let sensors = RecordingRefresher::new("sensors", &log);
    let models = RecordingRefresher::new("models", &log);
    let charts = RecordingRefresher::new("charts", &log);
    let notifier = Arc::new(RecordingNotifier::default());
    TestCollab {
        collab: Collaborators {
            machines: machines.clone(),
            sensors: sensors.clone(),
            models: models.clone(),
            charts: charts.clone(),
            notifier: notifier.clone(),
        },
        log,
        machines,
        sensors,
        models,
        charts,
        notifier,
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        ws_url: "ws://127.0.0.1:9/ws/live".to_string(),
        reconnect: ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        },
        resource_window: Duration::from_secs(2),
        telemetry_window: Duration::from_secs(1),
        batch_delay: Duration::from_millis(250),
        poll_interval: Duration::from_secs(15),
    }
}

/// Drives a [`SyncRuntime`] directly, standing in for the spawned loop.
pub struct Harness {
    pub rt: SyncRuntime<MockTransport>,
    pub events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    pub transport: MockTransport,
}

pub fn harness(cfg: SyncConfig, collab: Collaborators) -> Harness {
    let transport = MockTransport::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (rt, _state_rx) = SyncRuntime::new(cfg, Arc::new(transport.clone()), collab, events_tx);
    Harness {
        rt,
        events_rx,
        transport,
    }
}

impl Harness {
    /// Let spawned tasks run, then feed queued events back into the loop
    /// until it goes quiet.
    pub async fn settle(&mut self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
            while let Ok(event) = self.events_rx.try_recv() {
                self.rt.handle_event(event).await;
            }
        }
    }

    /// Advance the paused clock, then settle whatever timers fired.
    pub async fn advance(&mut self, duration: Duration) {
        tokio::time::advance(duration).await;
        self.settle().await;
    }

    pub async fn connect(&mut self) {
        self.rt.handle_event(SyncEvent::ConnectRequested).await;
        self.settle().await;
    }

    pub async fn push_frame(&mut self, frame: &str) {
        self.transport
            .last_link()
            .expect("no open link")
            .push_frame(frame);
        self.settle().await;
    }
}

pub fn make_update(label: &'static str, log: &CallLog) -> UpdateFn {
    let log = log.clone();
    Arc::new(move || {
        let log = log.clone();
        async move {
            log.push(label);
            Ok(())
        }
        .boxed()
    })
}

pub fn envelope_json(kind: &str, data: serde_json::Value) -> String {
    serde_json::json!({ "type": kind, "data": data }).to_string()
}
