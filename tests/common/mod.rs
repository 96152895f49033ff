//! In-memory stand-in for a durable-stream server holding one bucket.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use jetkv::ConsumerConfig;
use jetkv::DeliverPolicy;
use jetkv::MessageHandler;
use jetkv::PushSubscription;
use jetkv::Result;
use jetkv::StreamContext;
use jetkv::StreamMessage;
use jetkv::WatchError;
use jetkv::KV_OPERATION_HEADER;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    Lazy::force(&LOGGER_INIT);
}

#[derive(Debug, Clone)]
struct Record {
    sequence: u64,
    subject: String,
    operation: Option<&'static str>,
    value: Bytes,
}

struct LiveConsumer {
    name: String,
    filters: Vec<String>,
    headers_only: bool,
    handler: MessageHandler,
    active: AtomicBool,
    delivered: AtomicUsize,
}

impl LiveConsumer {
    fn matches(
        &self,
        subject: &str,
    ) -> bool {
        self.filters.iter().any(|f| subject_matches(f, subject))
    }

    fn deliver(
        &self,
        stream: &str,
        record: &Record,
        pending: u64,
    ) {
        let delivered = self.delivered.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let reply = format!(
            "$JS.ACK.{stream}.{}.1.{}.{delivered}.{}.{pending}",
            self.name,
            record.sequence,
            1_700_000_000_000_000_000u64 + record.sequence
        );
        let headers = record
            .operation
            .map(|op| vec![(KV_OPERATION_HEADER.to_string(), op.to_string())])
            .unwrap_or_default();
        let payload = if self.headers_only {
            Bytes::new()
        } else {
            record.value.clone()
        };

        (self.handler)(StreamMessage {
            subject: record.subject.clone(),
            reply: Some(reply),
            headers,
            payload,
        });
    }
}

/// Bucket stream kept in memory.
///
/// Consumers replay synchronously while being created and then receive every
/// later write as it happens.
pub struct InMemoryBucket {
    bucket: String,
    stream: String,
    log: Mutex<Vec<Record>>,
    consumers: Mutex<Vec<Arc<LiveConsumer>>>,
    teardowns: Arc<AtomicUsize>,
}

impl InMemoryBucket {
    pub fn new(bucket: &str) -> Arc<Self> {
        Arc::new(Self {
            bucket: bucket.to_string(),
            stream: format!("KV_{bucket}"),
            log: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
            teardowns: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn put(
        &self,
        key: &str,
        value: &str,
    ) -> u64 {
        self.append(key, None, Bytes::copy_from_slice(value.as_bytes()))
    }

    pub fn delete(
        &self,
        key: &str,
    ) -> u64 {
        self.append(key, Some("DEL"), Bytes::new())
    }

    pub fn purge(
        &self,
        key: &str,
    ) -> u64 {
        self.append(key, Some("PURGE"), Bytes::new())
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn active_consumers(&self) -> usize {
        self.consumers
            .lock()
            .iter()
            .filter(|c| c.active.load(Ordering::SeqCst))
            .count()
    }

    fn append(
        &self,
        key: &str,
        operation: Option<&'static str>,
        value: Bytes,
    ) -> u64 {
        let record = {
            let mut log = self.log.lock();
            let record = Record {
                sequence: log.len() as u64 + 1,
                subject: format!("$KV.{}.{}", self.bucket, key),
                operation,
                value,
            };
            log.push(record.clone());
            record
        };

        let consumers: Vec<_> = self.consumers.lock().clone();
        for consumer in consumers {
            if consumer.active.load(Ordering::SeqCst) && consumer.matches(&record.subject) {
                consumer.deliver(&self.stream, &record, 0);
            }
        }
        record.sequence
    }

    fn replay_set(
        &self,
        consumer: &LiveConsumer,
        policy: DeliverPolicy,
    ) -> Vec<Record> {
        let log = self.log.lock();
        let matching = log.iter().filter(|r| consumer.matches(&r.subject));
        match policy {
            DeliverPolicy::All => matching.cloned().collect(),
            DeliverPolicy::New => Vec::new(),
            DeliverPolicy::ByStartSequence(start) => {
                matching.filter(|r| r.sequence >= start).cloned().collect()
            }
            DeliverPolicy::LastPerSubject => {
                let all: Vec<&Record> = matching.collect();
                all.iter()
                    .enumerate()
                    .filter(|(i, r)| !all[i + 1..].iter().any(|later| later.subject == r.subject))
                    .map(|(_, r)| (*r).clone())
                    .collect()
            }
        }
    }
}

#[async_trait]
impl StreamContext for InMemoryBucket {
    async fn create_ordered_push_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
        handler: MessageHandler,
    ) -> Result<Box<dyn PushSubscription>> {
        if stream != self.stream {
            return Err(WatchError::Subscribe {
                stream: stream.to_string(),
                reason: "stream not found".to_string(),
            }
            .into());
        }

        let consumer = Arc::new(LiveConsumer {
            name: config.name.clone().unwrap_or_else(|| "ordered".to_string()),
            filters: config.filter_subjects.clone(),
            headers_only: config.headers_only,
            handler,
            active: AtomicBool::new(true),
            delivered: AtomicUsize::new(0),
        });

        let replay = self.replay_set(&consumer, config.deliver_policy);
        let total = replay.len() as u64;
        for (i, record) in replay.iter().enumerate() {
            consumer.deliver(&self.stream, record, total - i as u64 - 1);
        }
        self.consumers.lock().push(consumer.clone());

        Ok(Box::new(InMemorySubscription {
            consumer,
            teardowns: self.teardowns.clone(),
        }))
    }
}

struct InMemorySubscription {
    consumer: Arc<LiveConsumer>,
    teardowns: Arc<AtomicUsize>,
}

#[async_trait]
impl PushSubscription for InMemorySubscription {
    fn unsubscribe(&self) -> Result<()> {
        if !self.consumer.active.swap(false, Ordering::SeqCst) {
            return Err(WatchError::Teardown("consumer already closed".to_string()).into());
        }
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pending(&self) -> Result<u64> {
        // Replay is delivered synchronously while the consumer is created.
        Ok(0)
    }
}

/// NATS-style subject match: `*` is one token, a trailing `>` one or more
fn subject_matches(
    filter: &str,
    subject: &str,
) -> bool {
    let mut subject_tokens = subject.split('.');
    for filter_token in filter.split('.') {
        match (filter_token, subject_tokens.next()) {
            (">", Some(_)) => return true,
            ("*", Some(_)) => {}
            (literal, Some(token)) if literal == token => {}
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}
