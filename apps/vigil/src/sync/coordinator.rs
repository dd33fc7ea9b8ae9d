use std::sync::Arc;
use tracing::{debug, info};

use super::{Collaborators, ConnectionState, SyncConfig, SyncSession};
use crate::transport::Transport;

/// The view that owns the live connection by default.
pub const LIVE_VIEW: &str = "dashboard";

/// Reacts to router navigation: builds the sync subsystem when the live view
/// is entered and tears it down when the view is left. Only one designated
/// view uses the push connection; every other view is ignored.
pub struct LifecycleCoordinator<T: Transport> {
    cfg: SyncConfig,
    transport: Arc<T>,
    collab: Collaborators,
    live_view: String,
    active: Option<SyncSession>,
}

impl<T: Transport> LifecycleCoordinator<T> {
    pub fn new(cfg: SyncConfig, transport: Arc<T>, collab: Collaborators) -> Self {
        Self {
            cfg,
            transport,
            collab,
            live_view: LIVE_VIEW.to_string(),
            active: None,
        }
    }

    pub fn with_live_view(mut self, view: impl Into<String>) -> Self {
        self.live_view = view.into();
        self
    }

    pub fn on_view_enter(&mut self, view: &str) {
        if view != self.live_view {
            debug!(target: "sync::lifecycle", view, "view does not use live updates");
            return;
        }
        if self.active.is_some() {
            debug!(target: "sync::lifecycle", view, "session already active");
            return;
        }
        info!(target: "sync::lifecycle", view, "starting live session");
        self.active = Some(SyncSession::spawn(
            self.cfg.clone(),
            self.transport.clone(),
            self.collab.clone(),
        ));
    }

    /// Safe to call even when no session was ever started.
    pub fn on_view_leave(&mut self, view: &str) {
        if view != self.live_view {
            return;
        }
        if let Some(session) = self.active.take() {
            info!(target: "sync::lifecycle", view, "stopping live session");
            session.shutdown();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.active.as_ref().map(SyncSession::connection_state)
    }

    pub fn state_watch(&self) -> Option<tokio::sync::watch::Receiver<ConnectionState>> {
        self.active.as_ref().map(SyncSession::state_watch)
    }
}

impl<T: Transport> Drop for LifecycleCoordinator<T> {
    fn drop(&mut self) {
        if let Some(session) = self.active.take() {
            session.shutdown();
        }
    }
}
