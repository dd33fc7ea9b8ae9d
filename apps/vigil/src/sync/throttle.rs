use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::SyncEvent;
use crate::protocol::Envelope;

/// Outcome of offering an envelope to the registry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Process now; the window clock was stamped.
    Immediate,
    /// Stored as the pending envelope for this key. A deferred fire will
    /// deliver whichever envelope is latest when the window elapses.
    Coalesced,
}

struct ThrottleEntry {
    last_processed: Instant,
    pending: Option<Envelope>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

/// Per-key trailing-edge rate limiter for inbound messages.
pub(crate) struct ThrottleRegistry {
    entries: HashMap<&'static str, ThrottleEntry>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl ThrottleRegistry {
    pub fn new(events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self {
            entries: HashMap::new(),
            events,
        }
    }

    /// Gate one envelope. The first message of a key, or one arriving after
    /// the window has elapsed with nothing pending, passes through; anything
    /// else supersedes the pending envelope for that key. The deferred
    /// timer's deadline stays anchored to `last_processed`, so a burst fires
    /// exactly once, one window after the last processed message.
    pub fn admit(
        &mut self,
        key: &'static str,
        min_interval: Duration,
        envelope: Envelope,
    ) -> Admission {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            None => {
                self.entries.insert(
                    key,
                    ThrottleEntry {
                        last_processed: now,
                        pending: None,
                        timer: None,
                    },
                );
                Admission::Immediate
            }
            Some(entry) => {
                let elapsed = now.duration_since(entry.last_processed);
                if entry.pending.is_none() && elapsed >= min_interval {
                    entry.last_processed = now;
                    Admission::Immediate
                } else {
                    entry.pending = Some(envelope);
                    if entry.timer.is_none() {
                        let due = entry.last_processed + min_interval;
                        let events = self.events.clone();
                        entry.timer = Some(tokio::spawn(async move {
                            tokio::time::sleep_until(due).await;
                            let _ = events.send(SyncEvent::ThrottleFired(key));
                        }));
                    }
                    Admission::Coalesced
                }
            }
        }
    }

    /// Stamp the window clock without processing anything. Used right after
    /// a bulk resync is requested: change notifications arriving inside the
    /// window are redundant with the snapshot and coalesce into one deferred
    /// refresh.
    pub fn prime(&mut self, key: &'static str) {
        let now = Instant::now();
        self.entries
            .entry(key)
            .and_modify(|entry| entry.last_processed = now)
            .or_insert(ThrottleEntry {
                last_processed: now,
                pending: None,
                timer: None,
            });
    }

    /// Hand back the pending envelope for `key`, stamping the window clock.
    /// None if nothing is pending (the fire raced a clear).
    pub fn take_due(&mut self, key: &'static str) -> Option<Envelope> {
        let entry = self.entries.get_mut(key)?;
        entry.timer = None;
        let envelope = entry.pending.take()?;
        entry.last_processed = Instant::now();
        Some(envelope)
    }

    /// Drop all entries and cancel any pending timers.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.pending.is_some())
            .count()
    }
}

impl Drop for ThrottleRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
