//! Scriptable in-memory transport for tests: inject inbound frames and
//! close events, capture outbound frames, and fail a configurable number of
//! connection attempts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{LinkEvent, OutboundFrame, Transport, TransportError, TransportLink};

#[derive(Default)]
struct MockState {
    /// Fail this many `connect` calls before allowing one to succeed.
    connect_failures: u32,
    connect_calls: u32,
    links: Vec<MockLinkHandle>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle to one scripted link.
#[derive(Clone)]
pub struct MockLinkHandle {
    inbound: mpsc::UnboundedSender<LinkEvent>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<OutboundFrame>>>,
    seen: Arc<Mutex<Vec<OutboundFrame>>>,
}

impl MockLinkHandle {
    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.inbound.send(LinkEvent::Frame(text.into()));
    }

    pub fn push_close(&self, code: Option<u16>) {
        let _ = self.inbound.send(LinkEvent::Closed(code));
    }

    /// Everything the client has written to the link so far.
    pub fn sent(&self) -> Vec<OutboundFrame> {
        let mut rx = self.outbound_rx.lock();
        let mut seen = self.seen.lock();
        while let Ok(frame) = rx.try_recv() {
            seen.push(frame);
        }
        seen.clone()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: u32) {
        self.state.lock().connect_failures = count;
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().connect_calls
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Handle to the most recently opened link.
    pub fn last_link(&self) -> Option<MockLinkHandle> {
        self.state.lock().links.last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(TransportError::Connect("scripted failure".into()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        state.links.push(MockLinkHandle {
            inbound: inbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            seen: Arc::new(Mutex::new(Vec::new())),
        });

        Ok(Box::new(MockLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        }))
    }
}

struct MockLink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait]
impl TransportLink for MockLink {
    fn sender(&self) -> mpsc::UnboundedSender<OutboundFrame> {
        self.outbound.clone()
    }

    async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }
}
