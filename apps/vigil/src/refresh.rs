//! Capability interfaces for the external collaborators the sync subsystem
//! drives: per-resource refreshers and the user-facing notifier. Absence of
//! a collaborator is a typed no-op, never a runtime existence check.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Machine, MlModel, Sensor};
use crate::protocol::{AlertNotice, ResourceKind, TelemetryFrame};
use crate::sync::ConnectionState;

/// Re-fetches and re-renders one resource view. Invoked with no arguments;
/// failures are tolerated (and logged) by the caller.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

pub struct NoopRefresher;

#[async_trait]
impl Refresher for NoopRefresher {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// User-visible signals: the status indicator and transient notices.
pub trait Notifier: Send + Sync {
    fn connection_status(&self, state: ConnectionState);
    fn reconnect_exhausted(&self);
    fn alert_raised(&self, alert: &AlertNotice);
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn connection_status(&self, _state: ConnectionState) {}
    fn reconnect_exhausted(&self) {}
    fn alert_raised(&self, _alert: &AlertNotice) {}
}

/// Notifier that renders signals into the log stream.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn connection_status(&self, state: ConnectionState) {
        info!(target: "vigil::status", status = state.as_str(), "connection status");
    }

    fn reconnect_exhausted(&self) {
        warn!(
            target: "vigil::status",
            "live updates unavailable; showing polled data until the view is reopened"
        );
    }

    fn alert_raised(&self, alert: &AlertNotice) {
        warn!(
            target: "vigil::alerts",
            sensor_id = alert.sensor_id,
            severity = alert.severity_label(),
            "alert raised"
        );
    }
}

/// The last fetched resource lists, i.e. what the chart/table layer renders
/// from. The sync subsystem only ever writes through refreshers; it never
/// reads this back.
#[derive(Default)]
pub struct DashboardState {
    pub machines: RwLock<Vec<Machine>>,
    pub sensors: RwLock<Vec<Sensor>>,
    pub models: RwLock<Vec<MlModel>>,
    pub telemetry: RwLock<Vec<TelemetryFrame>>,
    refreshed_at: RwLock<HashMap<&'static str, Instant>>,
}

impl DashboardState {
    fn stamp(&self, area: &'static str) {
        self.refreshed_at.write().insert(area, Instant::now());
    }

    pub fn refreshed_at(&self, area: &'static str) -> Option<Instant> {
        self.refreshed_at.read().get(area).copied()
    }
}

/// What an [`HttpRefresher`] refreshes.
#[derive(Debug, Clone, Copy)]
pub enum RefreshTarget {
    Resource(ResourceKind),
    Charts,
}

/// Production refresher: re-fetch through the REST API into the shared
/// dashboard snapshot.
pub struct HttpRefresher {
    api: Arc<ApiClient>,
    state: Arc<DashboardState>,
    target: RefreshTarget,
}

impl HttpRefresher {
    pub fn new(api: Arc<ApiClient>, state: Arc<DashboardState>, target: RefreshTarget) -> Self {
        Self { api, state, target }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self) -> Result<()> {
        match self.target {
            RefreshTarget::Resource(ResourceKind::Machines) => {
                let rows = self.api.machines().await?;
                debug!(target: "vigil::refresh", count = rows.len(), "machines refreshed");
                *self.state.machines.write() = rows;
                self.state.stamp("machines");
            }
            RefreshTarget::Resource(ResourceKind::Sensors) => {
                let rows = self.api.sensors().await?;
                debug!(target: "vigil::refresh", count = rows.len(), "sensors refreshed");
                *self.state.sensors.write() = rows;
                self.state.stamp("sensors");
            }
            RefreshTarget::Resource(ResourceKind::Models) => {
                let rows = self.api.models().await?;
                debug!(target: "vigil::refresh", count = rows.len(), "models refreshed");
                *self.state.models.write() = rows;
                self.state.stamp("models");
            }
            RefreshTarget::Charts => {
                let rows = self.api.recent_vibration_data(None, 200).await?;
                debug!(target: "vigil::refresh", count = rows.len(), "telemetry refreshed");
                *self.state.telemetry.write() = rows;
                self.state.stamp("telemetry");
            }
        }
        Ok(())
    }
}
