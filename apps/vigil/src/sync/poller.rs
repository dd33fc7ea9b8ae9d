use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::SyncEvent;
use crate::protocol::ResourceKind;

/// Timer-driven periodic refresh, the data path while the push connection is
/// down. Ticks are delivered as events; whether a tick actually refreshes is
/// decided at handling time against the current connection state, so a tick
/// already in flight when the connection comes back is simply suppressed.
pub(crate) struct FallbackPoller {
    interval: Duration,
    timers: HashMap<ResourceKind, tokio::task::JoinHandle<()>>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl FallbackPoller {
    pub fn new(interval: Duration, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self {
            interval,
            timers: HashMap::new(),
            events,
        }
    }

    /// Start one recurring tick per resource kind; the first tick fires
    /// immediately. Idempotent: an already-running poller is restarted.
    pub fn start(&mut self, kinds: &[ResourceKind]) {
        self.stop();
        for &kind in kinds {
            let events = self.events.clone();
            let period = self.interval;
            self.timers.insert(
                kind,
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        if events.send(SyncEvent::PollDue(kind)).is_err() {
                            break;
                        }
                    }
                }),
            );
        }
    }

    pub fn stop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        !self.timers.is_empty()
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
