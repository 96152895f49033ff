//! A watch over one or more key patterns of a bucket.
//!
//! Creating a subscription resolves the watch options, opens an ordered push
//! consumer and then decides when the initial replay is over:
//!
//! - `UpdatesOnly` watches replay nothing, so end-of-data fires before the
//!   consumer even exists.
//! - Otherwise the first message whose delta is 0 fires it.
//! - If the consumer reports no pending messages right after creation there is
//!   nothing to replay and it fires immediately.
//!
//! Whichever path gets there first wins the [`EndOfDataLatch`].

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::resolve_watch_options;
use super::AckPolicy;
use super::ConsumerConfig;
use super::EndOfDataLatch;
use super::KvEntry;
use super::KvNaming;
use super::KvWatcher;
use super::MessageHandler;
use super::PushSubscription;
use super::ResolvedWatch;
use super::StreamContext;
use super::StreamMessage;
use super::WatchOption;
use crate::metrics::WATCH_ENTRIES_DELIVERED;
use crate::metrics::WATCH_ENTRIES_SUPPRESSED;
use crate::Error;
use crate::Result;

/// Caller choices for a single watch
#[derive(Debug, Clone, Default)]
pub struct WatchOpts {
    pub options: Vec<WatchOption>,
    /// Replay from this stream sequence; 0 leaves the start to `options`
    pub from_revision: u64,
    /// Name, description and metadata to put on the consumer
    pub consumer_override: Option<ConsumerConfig>,
}

impl WatchOpts {
    pub fn with_options(options: impl Into<Vec<WatchOption>>) -> Self {
        Self {
            options: options.into(),
            ..Default::default()
        }
    }
}

/// Observable lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Initial replay still running
    Replaying,
    /// End-of-data fired, only new writes arrive
    Live,
    Closed,
}

/// State shared between the subscription handle and the delivery callback
struct WatchShared {
    naming: Arc<KvNaming>,
    watcher: Arc<dyn KvWatcher>,
    latch: EndOfDataLatch,
    include_deletes: bool,
    closed: AtomicBool,
}

impl WatchShared {
    fn handle_message(
        &self,
        message: StreamMessage,
    ) {
        if self.closed.load(Ordering::Acquire) {
            trace!(subject = %message.subject, "message after unsubscribe dropped");
            return;
        }

        let entry = match KvEntry::decode(&self.naming, message) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(bucket = self.naming.bucket(), error = %e, "failed to decode watch message");
                self.watcher.on_error(Error::Decode(e));
                return;
            }
        };

        let delta = entry.delta;
        if entry.operation.is_removal() && !self.include_deletes {
            trace!(key = %entry.key, revision = entry.revision, "suppressed removal entry");
            WATCH_ENTRIES_SUPPRESSED.inc();
        } else if self.closed.load(Ordering::Acquire) {
            trace!(key = %entry.key, "entry after unsubscribe dropped");
            return;
        } else {
            WATCH_ENTRIES_DELIVERED.inc();
            self.watcher.on_entry(entry);
        }

        // Suppressed entries still count towards the end of the replay.
        if delta == 0 && !self.latch.is_set() {
            self.latch.try_signal(self.watcher.as_ref());
        }
    }
}

pub struct WatchSubscription {
    shared: Arc<WatchShared>,
    subscription: Mutex<Option<Arc<dyn PushSubscription>>>,
    resolved: ResolvedWatch,
    subjects: Vec<String>,
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("stream", &self.shared.naming.stream_name())
            .field("subjects", &self.subjects)
            .field("state", &self.state())
            .finish()
    }
}

impl WatchSubscription {
    /// Opens the consumer and starts delivering to `watcher`.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for an empty or invalid key pattern, before
    ///   any consumer is created
    /// - whatever `context` returns when the consumer cannot be created
    /// - [`crate::WatchError::Pending`] when the pending count cannot be read;
    ///   the consumer is torn down first
    pub async fn create<K: AsRef<str>>(
        context: &dyn StreamContext,
        naming: Arc<KvNaming>,
        key_patterns: &[K],
        watcher: Arc<dyn KvWatcher>,
        opts: WatchOpts,
    ) -> Result<Self> {
        if key_patterns.is_empty() {
            return Err(Error::InvalidArgument("watch needs at least one key pattern".into()));
        }
        let subjects = key_patterns
            .iter()
            .map(|k| naming.to_read_subject(k.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let resolved = resolve_watch_options(&opts.options, opts.from_revision);
        let shared = Arc::new(WatchShared {
            naming: naming.clone(),
            watcher,
            latch: EndOfDataLatch::new(),
            include_deletes: resolved.include_deletes,
            closed: AtomicBool::new(false),
        });
        if resolved.end_of_data_at_start {
            shared.latch.try_signal(shared.watcher.as_ref());
        }

        let mut config = ConsumerConfig {
            deliver_policy: resolved.deliver_policy,
            ack_policy: AckPolicy::None,
            headers_only: resolved.headers_only,
            filter_subjects: subjects.clone(),
            ..Default::default()
        };
        if let Some(overrides) = &opts.consumer_override {
            config = config.overlay(overrides);
        }

        debug!(
            stream = naming.stream_name(),
            ?subjects,
            ?resolved,
            "creating watch consumer"
        );
        let handler: MessageHandler = {
            let shared = shared.clone();
            Arc::new(move |message: StreamMessage| shared.handle_message(message))
        };
        let subscription: Arc<dyn PushSubscription> = context
            .create_ordered_push_consumer(naming.stream_name(), config, handler)
            .await?
            .into();

        // Owns the consumer from here on: an early return or a dropped future
        // tears it down through `Drop`.
        let watch = Self {
            shared,
            subscription: Mutex::new(Some(subscription.clone())),
            resolved,
            subjects,
        };

        if !watch.shared.latch.is_set() {
            match subscription.pending().await {
                Ok(0) => {
                    watch.shared.latch.try_signal(watch.shared.watcher.as_ref());
                }
                Ok(pending) => trace!(pending, "replay in progress"),
                Err(e) => {
                    warn!(
                        stream = watch.shared.naming.stream_name(),
                        error = %e,
                        "could not read consumer pending count"
                    );
                    return Err(e);
                }
            }
        }

        Ok(watch)
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn resolved(&self) -> &ResolvedWatch {
        &self.resolved
    }

    pub fn state(&self) -> WatchState {
        if self.shared.closed.load(Ordering::Acquire) {
            WatchState::Closed
        } else if self.shared.latch.is_set() {
            WatchState::Live
        } else {
            WatchState::Replaying
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == WatchState::Closed
    }

    /// Tears the consumer down. Safe to call repeatedly and from several
    /// threads; only the first call reaches the stream context, and teardown
    /// failures are logged, never returned.
    pub fn unsubscribe(&self) {
        let mut guard = self.subscription.lock();
        self.shared.closed.store(true, Ordering::Release);

        if let Some(subscription) = guard.take() {
            if let Err(e) = subscription.unsubscribe() {
                warn!(
                    stream = self.shared.naming.stream_name(),
                    error = %e,
                    "watch teardown failed"
                );
            } else {
                debug!(stream = self.shared.naming.stream_name(), "watch unsubscribed");
            }
        }
    }

    pub fn dispose(&self) {
        self.unsubscribe();
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
