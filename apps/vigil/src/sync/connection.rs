use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Close code for a deliberate, normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Lifecycle states of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

/// Bounded fixed-delay reconnection budget.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// What the event loop should do after the link dropped.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DropOutcome {
    /// Normal closure; no automatic reconnection.
    NormalClosure,
    /// Schedule another connect after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Budget spent; polling is the sole data source from here on.
    Exhausted,
}

/// Owns the connection state machine. Transitions happen here and nowhere
/// else; observers follow along through the watch channel.
pub(crate) struct ConnectionManager {
    state: ConnectionState,
    policy: ReconnectPolicy,
    current_attempt: u32,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                state: ConnectionState::Disconnected,
                policy,
                current_attempt: 0,
                state_tx,
            },
            state_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(
            target: "sync::connection",
            from = self.state.as_str(),
            to = next.as_str(),
            "connection state"
        );
        self.state = next;
        let _ = self.state_tx.send(next);
    }

    pub fn begin_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
    }

    /// The link opened: reset the retry budget.
    pub fn mark_open(&mut self) {
        self.current_attempt = 0;
        self.set_state(ConnectionState::Connected);
    }

    /// The link closed with the given close code.
    pub fn mark_closed(&mut self, code: Option<u16>) -> DropOutcome {
        self.set_state(ConnectionState::Disconnected);
        if code == Some(CLOSE_NORMAL) {
            return DropOutcome::NormalClosure;
        }
        self.next_attempt()
    }

    /// A transport error, treated like an abnormal close.
    pub fn mark_error(&mut self) -> DropOutcome {
        self.set_state(ConnectionState::Disconnected);
        self.next_attempt()
    }

    /// Deliberate teardown; never reconnects.
    pub fn mark_shutdown(&mut self) {
        self.set_state(ConnectionState::Disconnected);
    }

    fn next_attempt(&mut self) -> DropOutcome {
        self.set_state(ConnectionState::Reconnecting);
        if self.current_attempt < self.policy.max_attempts {
            self.current_attempt += 1;
            DropOutcome::Retry {
                attempt: self.current_attempt,
                delay: self.policy.delay,
            }
        } else {
            self.set_state(ConnectionState::Failed);
            DropOutcome::Exhausted
        }
    }

    /// The reconnect delay elapsed; move back into Connecting. Returns false
    /// if the state moved on in the meantime (teardown, explicit connect).
    pub fn resume_connect(&mut self) -> bool {
        if self.state != ConnectionState::Reconnecting {
            return false;
        }
        self.set_state(ConnectionState::Connecting);
        true
    }
}
