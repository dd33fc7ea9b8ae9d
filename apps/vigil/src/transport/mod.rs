use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mock;
pub mod websocket;

pub use websocket::WebSocketTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// Events surfaced by an open link.
#[derive(Debug)]
pub enum LinkEvent {
    /// A complete text frame from the server.
    Frame(String),
    /// The link closed; carries the close code when the peer supplied one.
    Closed(Option<u16>),
}

/// Frames the client writes to the link.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Transport trait for abstracting the push connection
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link to the server. Transport failures come back as errors
    /// here; once a link exists, failures surface as [`LinkEvent::Closed`].
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError>;
}

/// One open bidirectional link.
#[async_trait]
pub trait TransportLink: Send {
    /// Handle for writing frames. Cheap to clone and usable after the link
    /// itself has been handed off to a read pump.
    fn sender(&self) -> mpsc::UnboundedSender<OutboundFrame>;

    /// Next inbound event; `None` once the stream is exhausted.
    async fn recv(&mut self) -> Option<LinkEvent>;
}
