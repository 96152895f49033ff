use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use tracing::warn;

use super::ChannelWatcher;
use super::ConsumerConfig;
use super::KvEntry;
use super::KvNaming;
use super::KvWatcher;
use super::StreamContext;
use super::WatchEvent;
use super::WatchOption;
use super::WatchOpts;
use super::WatchSubscription;
use super::TAIL_WILDCARD;
use crate::ClientConfig;
use crate::RequestError;
use crate::Result;
use crate::WatchConfig;

/// Read side of one key-value bucket
pub struct KvStore {
    naming: Arc<KvNaming>,
    context: Arc<dyn StreamContext>,
    watch_config: WatchConfig,
}

impl std::fmt::Debug for KvStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("naming", &self.naming)
            .field("watch_config", &self.watch_config)
            .finish()
    }
}

impl KvStore {
    pub fn new(
        bucket: &str,
        context: Arc<dyn StreamContext>,
        config: &ClientConfig,
    ) -> Result<Self> {
        Ok(Self {
            naming: Arc::new(KvNaming::new(bucket, &config.kv)?),
            context,
            watch_config: config.watch.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        self.naming.bucket()
    }

    pub fn stream_name(&self) -> &str {
        self.naming.stream_name()
    }

    pub async fn watch<K: AsRef<str>>(
        &self,
        key_patterns: &[K],
        watcher: Arc<dyn KvWatcher>,
        mut opts: WatchOpts,
    ) -> Result<WatchSubscription> {
        if let Some(prefix) = &self.watch_config.consumer_name_prefix {
            let overrides = opts.consumer_override.get_or_insert_with(ConsumerConfig::default);
            if overrides.name.as_deref().map_or(true, str::is_empty) {
                overrides.name = Some(format!("{}_{}", prefix, nanoid::nanoid!()));
            }
        }

        WatchSubscription::create(
            self.context.as_ref(),
            self.naming.clone(),
            key_patterns,
            watcher,
            opts,
        )
        .await
    }

    pub async fn watch_all(
        &self,
        watcher: Arc<dyn KvWatcher>,
        opts: WatchOpts,
    ) -> Result<WatchSubscription> {
        self.watch(&[TAIL_WILDCARD], watcher, opts).await
    }

    /// Current keys of the bucket, in first-seen order.
    ///
    /// Deleted and purged keys are left out.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let opts = WatchOpts::with_options([WatchOption::IgnoreDelete, WatchOption::MetaOnly]);
        let entries = self.collect(&[TAIL_WILDCARD], opts).await?;

        let mut seen = HashSet::new();
        let keys: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| seen.insert(entry.key.clone()).then_some(entry.key))
            .collect();
        debug!(bucket = self.bucket(), count = keys.len(), "collected keys");
        Ok(keys)
    }

    /// Every stored revision of `key`, oldest first, including removals
    pub async fn history(
        &self,
        key: &str,
    ) -> Result<Vec<KvEntry>> {
        let opts = WatchOpts::with_options([WatchOption::IncludeHistory]);
        self.collect(&[key], opts).await
    }

    /// Watches until end-of-data and returns the replayed entries.
    async fn collect(
        &self,
        key_patterns: &[&str],
        opts: WatchOpts,
    ) -> Result<Vec<KvEntry>> {
        let (watcher, events) = ChannelWatcher::new();
        let subscription = self.watch(key_patterns, Arc::new(watcher), opts).await?;

        let entries = tokio::time::timeout(self.watch_config.collect_timeout(), drain_replay(events))
            .await
            .map_err(|_| {
                warn!(bucket = self.bucket(), "replay did not finish before collect timeout");
                RequestError::TimedOut
            });
        subscription.unsubscribe();
        Ok(entries?)
    }
}

async fn drain_replay(mut events: UnboundedReceiverStream<WatchEvent>) -> Vec<KvEntry> {
    let mut entries = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            WatchEvent::Entry(entry) => entries.push(entry),
            WatchEvent::EndOfData => break,
            // Already logged by the subscription.
            WatchEvent::Error(_) => {}
        }
    }
    entries
}
