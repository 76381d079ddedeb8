use super::*;

#[tokio::test]
async fn test_send_to_delivers_in_order() {
    let hub = ConnectionHub::default();
    let (id, mut rx) = hub.register();

    hub.send_to(id, "first");
    hub.send_to(id, "second");

    assert_eq!(rx.recv().await.as_deref(), Some("first"));
    assert_eq!(rx.recv().await.as_deref(), Some("second"));
}

#[test]
fn test_send_to_unknown_connection_is_noop() {
    let hub = ConnectionHub::default();
    hub.send_to(ConnectionId::new_v4(), "nobody home");
    assert!(hub.is_empty());
}

#[test]
fn test_send_after_unregister_is_noop() {
    let hub = ConnectionHub::default();
    let (id, mut rx) = hub.register();
    hub.unregister(id);

    hub.send_to(id, "late");

    assert!(!hub.contains(id));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_broadcast_skips_except() {
    let hub = ConnectionHub::default();
    let (a, mut rx_a) = hub.register();
    let (_b, mut rx_b) = hub.register();
    let (_c, mut rx_c) = hub.register();

    hub.broadcast("hello", Some(a));

    assert!(rx_a.try_recv().is_err());
    assert_eq!(rx_b.try_recv().unwrap(), "hello");
    assert_eq!(rx_c.try_recv().unwrap(), "hello");
}

#[test]
fn test_broadcast_without_except_reaches_everyone() {
    let hub = ConnectionHub::default();
    let receivers: Vec<_> = (0..5).map(|_| hub.register()).collect();

    hub.broadcast("all", None);

    for (_, mut rx) in receivers {
        assert_eq!(rx.try_recv().unwrap(), "all");
    }
}

#[test]
fn test_full_buffer_drops_instead_of_blocking() {
    let hub = ConnectionHub::new(2);
    let (id, mut rx) = hub.register();

    hub.send_to(id, "1");
    hub.send_to(id, "2");
    hub.send_to(id, "3");

    assert_eq!(rx.try_recv().unwrap(), "1");
    assert_eq!(rx.try_recv().unwrap(), "2");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_default_broadcast_uses_send_to() {
    use crate::fanout::testing::RecordingFanout;

    let a = ConnectionId::new_v4();
    let b = ConnectionId::new_v4();
    let fanout = RecordingFanout::new(&[a, b]);

    fanout.broadcast("{}", Some(b));

    let sent = fanout.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, a);
}

#[test]
fn test_metrics_count_queued_messages() {
    let hub = ConnectionHub::default();
    let (a, _rx_a) = hub.register();
    let (_b, _rx_b) = hub.register();

    hub.send_to(a, "hello");
    hub.broadcast("abc", None);

    let snapshot = hub.metrics().snapshot();
    assert_eq!(snapshot.messages, 3);
    assert_eq!(snapshot.bytes, 5 + 3 + 3);
}

#[test]
fn test_metrics_skip_dropped_messages() {
    let hub = ConnectionHub::new(1);
    let (id, _rx) = hub.register();

    hub.send_to(id, "kept");
    hub.send_to(id, "dropped");
    hub.send_to(ConnectionId::new_v4(), "nobody");

    assert_eq!(
        hub.metrics().snapshot(),
        MetricsSnapshot {
            messages: 1,
            bytes: 4
        }
    );
}

#[test]
fn test_metrics_snapshot_since_and_rate() {
    let metrics = DeliveryMetrics::new();
    metrics.record(10);
    let earlier = metrics.snapshot();
    metrics.record(20);
    metrics.record(30);

    let delta = metrics.snapshot().since(&earlier);
    assert_eq!(delta, MetricsSnapshot { messages: 2, bytes: 50 });
    assert_eq!(delta.rate(std::time::Duration::from_millis(500)), 4.0);
    assert_eq!(delta.rate(std::time::Duration::ZERO), 0.0);
}

#[tokio::test]
async fn test_deliver_waits_for_queue_space() {
    let hub = std::sync::Arc::new(ConnectionHub::new(1));
    let (id, mut rx) = hub.register();
    hub.send_to(id, "first");

    let sender = {
        let hub = std::sync::Arc::clone(&hub);
        tokio::spawn(async move { hub.deliver(id, "second".to_string()).await })
    };

    assert_eq!(rx.recv().await.as_deref(), Some("first"));
    assert_eq!(rx.recv().await.as_deref(), Some("second"));
    sender.await.unwrap();
    assert_eq!(hub.metrics().snapshot().messages, 2);
}

#[tokio::test]
async fn test_deliver_to_unknown_connection_is_noop() {
    let hub = ConnectionHub::default();
    hub.deliver(ConnectionId::new_v4(), "nobody home".to_string())
        .await;
    assert_eq!(hub.metrics().snapshot().messages, 0);
}
