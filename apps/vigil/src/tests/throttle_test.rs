use std::time::Duration;
use tokio::sync::mpsc;

use crate::protocol::Envelope;
use crate::sync::throttle::{Admission, ThrottleRegistry};
use crate::sync::SyncEvent;

const WINDOW: Duration = Duration::from_secs(2);

fn env(n: i64) -> Envelope {
    Envelope {
        kind: "sensor_changed".to_string(),
        data: serde_json::json!({ "id": n, "action": "updated" }),
    }
}

#[test_timeout::tokio_timeout_test(paused)]
async fn test_burst_coalesces_to_latest() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut registry = ThrottleRegistry::new(events_tx);

    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(1)),
        Admission::Immediate
    );
    for n in 2..=5 {
        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(
            registry.admit("sensor_changed", WINDOW, env(n)),
            Admission::Coalesced
        );
    }
    assert_eq!(registry.pending_count(), 1);

    // Nothing fires before the window has elapsed since the first message.
    tokio::time::advance(Duration::from_millis(1700)).await;
    tokio::task::yield_now().await;
    assert!(events_rx.try_recv().is_err());

    tokio::time::advance(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    match events_rx.try_recv() {
        Ok(SyncEvent::ThrottleFired(key)) => assert_eq!(key, "sensor_changed"),
        other => panic!("expected deferred fire, got {other:?}"),
    }

    // Only the newest envelope of the burst survives.
    let envelope = registry
        .take_due("sensor_changed")
        .expect("pending envelope");
    assert_eq!(envelope.data["id"], 5);

    // And it fired exactly once.
    tokio::time::advance(Duration::from_secs(5)).await;
    tokio::task::yield_now().await;
    assert!(events_rx.try_recv().is_err());
}

#[test_timeout::tokio_timeout_test(paused)]
async fn test_immediate_after_quiet_window() {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut registry = ThrottleRegistry::new(events_tx);

    assert_eq!(
        registry.admit("machine_changed", WINDOW, env(1)),
        Admission::Immediate
    );
    tokio::time::advance(WINDOW + Duration::from_millis(100)).await;
    assert_eq!(
        registry.admit("machine_changed", WINDOW, env(2)),
        Admission::Immediate
    );
}

#[test_timeout::tokio_timeout_test(paused)]
async fn test_keys_throttle_independently() {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut registry = ThrottleRegistry::new(events_tx);

    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(1)),
        Admission::Immediate
    );
    assert_eq!(
        registry.admit("machine_changed", WINDOW, env(2)),
        Admission::Immediate
    );
    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(3)),
        Admission::Coalesced
    );
}

#[test_timeout::tokio_timeout_test(paused)]
async fn test_clear_cancels_pending_timers() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut registry = ThrottleRegistry::new(events_tx);

    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(1)),
        Admission::Immediate
    );
    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(2)),
        Admission::Coalesced
    );
    registry.clear();

    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    assert!(events_rx.try_recv().is_err());
    assert!(registry.take_due("sensor_changed").is_none());
}

#[test_timeout::tokio_timeout_test(paused)]
async fn test_take_due_stamps_window() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut registry = ThrottleRegistry::new(events_tx);

    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(1)),
        Admission::Immediate
    );
    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(2)),
        Admission::Coalesced
    );
    tokio::time::advance(WINDOW).await;
    tokio::task::yield_now().await;
    let _ = events_rx.try_recv().expect("deferred fire");
    assert!(registry.take_due("sensor_changed").is_some());

    // The deferred processing opened a fresh window.
    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(3)),
        Admission::Coalesced
    );
}

#[test_timeout::tokio_timeout_test(paused)]
async fn test_prime_forces_coalescing() {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut registry = ThrottleRegistry::new(events_tx);

    registry.prime("sensor_changed");
    assert_eq!(
        registry.admit("sensor_changed", WINDOW, env(1)),
        Admission::Coalesced
    );
}
