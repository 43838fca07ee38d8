//! Tests for the signal bus

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use roster_mailer::core::{RosterRecord, Signal, SignalBus, SignalKind};

#[test]
fn test_publish_routes_by_kind() {
    let bus = SignalBus::new();
    let records = Arc::new(AtomicUsize::new(0));
    let counts = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&records);
    bus.subscribe(SignalKind::RecordCreated, move |signal| {
        if let Signal::RecordCreated(record) = signal {
            assert_eq!(record.member_id(), Some(4));
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    let total = Arc::clone(&counts);
    bus.subscribe(SignalKind::EmailsEnqueued, move |signal| {
        if let Signal::EmailsEnqueued(n) = signal {
            total.fetch_add(*n, Ordering::SeqCst);
        }
    });

    assert_eq!(bus.publish(&Signal::RecordCreated(RosterRecord::new(4))), 1);
    assert_eq!(bus.publish(&Signal::EmailsEnqueued(3)), 1);
    assert_eq!(records.load(Ordering::SeqCst), 1);
    assert_eq!(counts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_publish_without_listeners() {
    let bus = SignalBus::new();
    assert_eq!(bus.publish(&Signal::EmailsEnqueued(1)), 0);
}

#[test]
fn test_unsubscribe() {
    let bus = SignalBus::new();
    let id = bus.subscribe(SignalKind::EmailsEnqueued, |_| {});
    assert_eq!(bus.listener_count(SignalKind::EmailsEnqueued), 1);
    assert!(!bus.unsubscribe(SignalKind::RecordCreated, id));
    assert!(bus.unsubscribe(SignalKind::EmailsEnqueued, id));
    assert!(!bus.unsubscribe(SignalKind::EmailsEnqueued, id));
    assert_eq!(bus.listener_count(SignalKind::EmailsEnqueued), 0);
}

#[test]
fn test_panicking_listener_does_not_stop_others() {
    let bus = SignalBus::new();
    let ran = Arc::new(AtomicUsize::new(0));
    bus.subscribe(SignalKind::EmailsEnqueued, |_| panic!("listener bug"));
    let after = Arc::clone(&ran);
    bus.subscribe(SignalKind::EmailsEnqueued, move |_| {
        after.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(bus.publish(&Signal::EmailsEnqueued(1)), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
