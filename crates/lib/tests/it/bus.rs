use std::sync::{Arc, Mutex};
use std::thread;

use tally::FixedClock;
use tally::bus::{FeedMessage, LiveFeed, UpdateBus, UpdateEvent, UpdateKind};

#[tokio::test]
async fn feed_sees_ready_then_one_alert() {
    let bus = UpdateBus::new();
    let clock = FixedClock::new(500);
    let baseline = bus.subscriber_count();

    let mut feed = LiveFeed::open(&bus, &clock);
    assert_eq!(bus.subscriber_count(), baseline + 1);

    let alert = UpdateEvent::new(1000).with_kind(UpdateKind::Alert);
    assert_eq!(bus.publish(&alert), 1);

    assert_eq!(feed.next().await, Some(FeedMessage::Ready { ts: 500 }));
    let update = feed.next().await.unwrap();
    assert_eq!(update, FeedMessage::Update(alert));
    assert_eq!(update.event_name(), "update");
    assert_eq!(update.data().unwrap(), "{\"ts\":1000,\"type\":\"alert\"}");

    drop(feed);
    assert_eq!(bus.subscriber_count(), baseline);
}

#[test]
fn concurrent_publishers_produce_one_order() {
    let bus = UpdateBus::new();
    let seen: Vec<Arc<Mutex<Vec<i64>>>> = (0..3).map(|_| Arc::default()).collect();
    let _subs: Vec<_> = seen
        .iter()
        .map(|log| {
            let log = Arc::clone(log);
            bus.subscribe(move |event| {
                log.lock().unwrap().push(event.ts);
                Ok(())
            })
        })
        .collect();

    let publishers: Vec<_> = (0..4)
        .map(|t| {
            let bus = bus.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    bus.publish(&UpdateEvent::new(t * 1000 + i));
                }
            })
        })
        .collect();
    for handle in publishers {
        handle.join().unwrap();
    }

    let first = seen[0].lock().unwrap().clone();
    assert_eq!(first.len(), 200);
    for log in &seen[1..] {
        assert_eq!(*log.lock().unwrap(), first);
    }
}

#[tokio::test]
async fn closed_feed_stops_counting_as_delivered() {
    let bus = UpdateBus::new();
    let clock = FixedClock::default();
    let mut open = LiveFeed::open(&bus, &clock);
    let mut closed = LiveFeed::open(&bus, &clock);

    closed.close();
    assert!(!closed.is_open());
    assert_eq!(bus.publish(&UpdateEvent::new(1).with_source("reports")), 1);

    assert!(matches!(open.next().await, Some(FeedMessage::Ready { .. })));
    assert!(matches!(open.next().await, Some(FeedMessage::Update(_))));
    assert!(matches!(closed.next().await, Some(FeedMessage::Ready { .. })));
    assert_eq!(closed.next().await, None);
}
