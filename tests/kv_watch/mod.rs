use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use jetkv::ChannelWatcher;
use jetkv::ClientConfig;
use jetkv::Error;
use jetkv::KvOperation;
use jetkv::KvStore;
use jetkv::WatchError;
use jetkv::WatchEvent;
use jetkv::WatchOption;
use jetkv::WatchOpts;
use jetkv::WatchState;
use tokio::time::timeout;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::common::enable_logger;
use crate::common::InMemoryBucket;

const EVENT_WAIT: Duration = Duration::from_secs(1);

fn store(bucket: &Arc<InMemoryBucket>) -> KvStore {
    KvStore::new("profiles", bucket.clone(), &ClientConfig::default()).unwrap()
}

async fn next_event(events: &mut UnboundedReceiverStream<WatchEvent>) -> WatchEvent {
    timeout(EVENT_WAIT, events.next())
        .await
        .expect("watch event not delivered in time")
        .expect("watch event stream closed")
}

async fn next_entry_key(events: &mut UnboundedReceiverStream<WatchEvent>) -> String {
    match next_event(events).await {
        WatchEvent::Entry(entry) => entry.key,
        other => panic!("expected entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_keys_reflect_latest_state() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("alice", "1");
    bucket.put("bob", "2");
    bucket.put("alice", "3");
    bucket.delete("bob");
    bucket.put("carol", "4");

    let keys = store(&bucket).keys().await.unwrap();

    assert_eq!(keys, vec!["alice".to_string(), "carol".to_string()]);
    assert_eq!(bucket.active_consumers(), 0);
}

#[tokio::test]
async fn test_keys_of_empty_bucket() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");

    assert!(store(&bucket).keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_returns_every_revision_of_one_key() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("alice", "v1");
    bucket.put("bob", "x");
    bucket.put("alice", "v2");
    bucket.purge("alice");

    let history = store(&bucket).history("alice").await.unwrap();

    let revisions: Vec<_> = history.iter().map(|e| (e.revision, e.operation)).collect();
    assert_eq!(
        revisions,
        vec![
            (1, KvOperation::Put),
            (3, KvOperation::Put),
            (4, KvOperation::Purge)
        ]
    );
    assert_eq!(&history[0].value[..], b"v1");
    assert!(history.iter().all(|e| e.bucket == "profiles"));
}

#[tokio::test]
async fn test_watch_all_replays_then_goes_live() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("alice", "1");
    bucket.put("bob", "2");

    let (watcher, mut events) = ChannelWatcher::new();
    let watch = store(&bucket)
        .watch_all(Arc::new(watcher), WatchOpts::default())
        .await
        .unwrap();

    assert_eq!(next_entry_key(&mut events).await, "alice");
    assert_eq!(next_entry_key(&mut events).await, "bob");
    assert!(matches!(next_event(&mut events).await, WatchEvent::EndOfData));
    assert_eq!(watch.state(), WatchState::Live);

    bucket.put("carol", "3");
    match next_event(&mut events).await {
        WatchEvent::Entry(entry) => {
            assert_eq!(entry.key, "carol");
            assert_eq!(entry.revision, 3);
            assert_eq!(entry.delta, 0);
            assert_eq!(&entry.value[..], b"3");
        }
        other => panic!("expected live entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_updates_only_skips_history() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("alice", "old");

    let (watcher, mut events) = ChannelWatcher::new();
    let _watch = store(&bucket)
        .watch(
            &["alice"],
            Arc::new(watcher),
            WatchOpts::with_options([WatchOption::UpdatesOnly]),
        )
        .await
        .unwrap();

    assert!(matches!(next_event(&mut events).await, WatchEvent::EndOfData));
    bucket.put("bob", "ignored");
    bucket.put("alice", "new");

    match next_event(&mut events).await {
        WatchEvent::Entry(entry) => assert_eq!(&entry.value[..], b"new"),
        other => panic!("expected live entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_from_revision_replays_from_sequence() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("a", "1");
    bucket.put("b", "2");
    bucket.put("c", "3");

    let (watcher, mut events) = ChannelWatcher::new();
    let _watch = store(&bucket)
        .watch_all(
            Arc::new(watcher),
            WatchOpts {
                from_revision: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(next_entry_key(&mut events).await, "b");
    assert_eq!(next_entry_key(&mut events).await, "c");
    assert!(matches!(next_event(&mut events).await, WatchEvent::EndOfData));
}

#[tokio::test]
async fn test_wildcard_and_meta_only_watch() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("users.alice", "secret");
    bucket.put("groups.admins", "x");
    bucket.put("users.bob", "secret");

    let (watcher, mut events) = ChannelWatcher::new();
    let _watch = store(&bucket)
        .watch(
            &["users.*"],
            Arc::new(watcher),
            WatchOpts::with_options([WatchOption::MetaOnly]),
        )
        .await
        .unwrap();

    for expected in ["users.alice", "users.bob"] {
        match next_event(&mut events).await {
            WatchEvent::Entry(entry) => {
                assert_eq!(entry.key, expected);
                assert!(entry.value.is_empty());
            }
            other => panic!("expected entry, got {other:?}"),
        }
    }
    assert!(matches!(next_event(&mut events).await, WatchEvent::EndOfData));
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery_and_tears_down_once() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");

    let (watcher, mut events) = ChannelWatcher::new();
    let watch = store(&bucket)
        .watch_all(Arc::new(watcher), WatchOpts::default())
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, WatchEvent::EndOfData));

    watch.unsubscribe();
    watch.unsubscribe();
    drop(watch);
    bucket.put("late", "x");

    assert_eq!(bucket.teardowns(), 1);
    assert_eq!(bucket.active_consumers(), 0);
    assert!(timeout(Duration::from_millis(50), events.next()).await.is_err());
}

#[tokio::test]
async fn test_missing_stream_fails_watch() {
    enable_logger();
    let bucket = InMemoryBucket::new("profiles");
    let other = KvStore::new("orders", bucket.clone(), &ClientConfig::default()).unwrap();

    let (watcher, _events) = ChannelWatcher::new();
    let result = other.watch_all(Arc::new(watcher), WatchOpts::default()).await;

    assert!(matches!(result, Err(Error::Watch(WatchError::Subscribe { .. }))));
}

#[tokio::test]
async fn test_watch_metrics_exported() {
    enable_logger();
    jetkv::register_custom_metrics(&jetkv::REGISTRY).unwrap();
    let bucket = InMemoryBucket::new("profiles");
    bucket.put("alice", "1");

    store(&bucket).keys().await.unwrap();

    let text = jetkv::gather_text(&jetkv::REGISTRY);
    assert!(text.contains("watch_entries_delivered"));
    assert!(text.contains("watch_end_of_data"));
}
