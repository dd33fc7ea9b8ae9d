use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{LinkEvent, OutboundFrame, Transport, TransportError, TransportLink};

/// WebSocket implementation of the Transport trait
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (mut ws_sender, ws_receiver) = ws_stream.split();
        let (tx_out, mut rx_out) = mpsc::unbounded_channel::<OutboundFrame>();

        // Forward outgoing frames to the socket; a Close frame ends the task.
        let send_task = tokio::spawn(async move {
            while let Some(frame) = rx_out.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    OutboundFrame::Close => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        Ok(Box::new(WebSocketLink {
            outbound: tx_out,
            inbound: ws_receiver,
            send_task,
        }))
    }
}

struct WebSocketLink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    inbound: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    send_task: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl TransportLink for WebSocketLink {
    fn sender(&self) -> mpsc::UnboundedSender<OutboundFrame> {
        self.outbound.clone()
    }

    async fn recv(&mut self) -> Option<LinkEvent> {
        while let Some(msg) = self.inbound.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(LinkEvent::Frame(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(LinkEvent::Frame(text)),
                    Err(_) => {
                        tracing::warn!(target: "transport::ws", "dropping non-utf8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    return Some(LinkEvent::Closed(frame.map(|f| u16::from(f.code))));
                }
                // Ping/Pong are answered by tungstenite itself
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(target: "transport::ws", error = %err, "websocket read error");
                    return Some(LinkEvent::Closed(None));
                }
            }
        }
        None
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.send_task.abort();
    }
}
