//! End-to-end check against a real WebSocket server: the client connects,
//! asks for the initial snapshot, and a pushed change notification drives a
//! refresher through throttle and batch.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::util::recording_collab;
use crate::sync::{LifecycleCoordinator, ReconnectPolicy, SyncConfig, LIVE_VIEW};
use crate::transport::WebSocketTransport;

#[derive(Clone)]
struct ServerState {
    seen: mpsc::UnboundedSender<String>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message {
            let _ = state.seen.send(text);
            // Answer the snapshot request with one change push.
            let frame = serde_json::json!({
                "type": "sensor_changed",
                "data": { "id": 7, "action": "updated" }
            })
            .to_string();
            if socket.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
    }
}

#[test_timeout::tokio_timeout_test]
async fn test_live_sync_end_to_end() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/ws/live", get(ws_handler))
        .with_state(ServerState { seen: seen_tx });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let tc = recording_collab();
    let cfg = SyncConfig {
        ws_url: format!("ws://{addr}/ws/live"),
        reconnect: ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(100),
        },
        resource_window: Duration::from_millis(200),
        telemetry_window: Duration::from_millis(100),
        batch_delay: Duration::from_millis(50),
        poll_interval: Duration::from_secs(30),
    };
    let mut coordinator =
        LifecycleCoordinator::new(cfg, Arc::new(WebSocketTransport), tc.collab.clone());
    coordinator.on_view_enter(LIVE_VIEW);

    let request = seen_rx.recv().await.expect("client hello");
    assert!(request.contains("\"request_initial_data\""));

    // The push lands inside the primed window, so it coalesces, fires at the
    // window edge, and flushes after the quiet period.
    for _ in 0..200 {
        if tc.sensors.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(tc.sensors.calls(), 1);
    assert_eq!(tc.machines.calls(), 0);

    coordinator.on_view_leave(LIVE_VIEW);
    tokio::time::sleep(Duration::from_millis(50)).await;
}
