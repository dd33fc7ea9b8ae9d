use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::SyncEvent;

/// A pending refresh action. Identity (the Arc pointer) is what dedupes it:
/// queueing the same action twice before a flush runs it once.
pub type UpdateFn =
    Arc<dyn Fn() -> futures_util::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Collects distinct refresh actions and flushes them together after a quiet
/// period, so a burst of triggers does the work once.
pub(crate) struct BatchScheduler {
    pending: Vec<(&'static str, UpdateFn)>,
    quiet_period: Duration,
    timer: Option<tokio::task::JoinHandle<()>>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl BatchScheduler {
    pub fn new(quiet_period: Duration, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self {
            pending: Vec::new(),
            quiet_period,
            timer: None,
            events,
        }
    }

    /// Add an action (no-op if already queued) and restart the quiet-period
    /// timer.
    pub fn queue(&mut self, label: &'static str, update: UpdateFn) {
        let already_queued = self
            .pending
            .iter()
            .any(|(_, existing)| Arc::ptr_eq(existing, &update));
        if !already_queued {
            self.pending.push((label, update));
        }
        self.restart_timer();
    }

    fn restart_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let events = self.events.clone();
        let delay = self.quiet_period;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SyncEvent::FlushBatch);
        }));
    }

    /// Take everything queued, in first-queued order, cancelling the timer.
    pub fn take_pending(&mut self) -> Vec<(&'static str, UpdateFn)> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        std::mem::take(&mut self.pending)
    }

    /// Clear the set and cancel the timer without executing anything.
    pub fn cancel_all(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.clear();
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
