//! Seam to the durable-stream client that actually creates consumers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::DeliverPolicy;
use super::StreamMessage;
use crate::Result;

/// Acknowledgement mode of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Watches never acknowledge
    #[default]
    None,
    All,
    Explicit,
}

/// Consumer settings handed to the stream context
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsumerConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
    pub deliver_policy: DeliverPolicy,
    pub ack_policy: AckPolicy,
    pub headers_only: bool,
    pub filter_subjects: Vec<String>,
}

impl ConsumerConfig {
    /// Copies the identifying fields of `overrides` that are set and
    /// non-empty. Delivery settings always stay as resolved.
    pub fn overlay(
        mut self,
        overrides: &ConsumerConfig,
    ) -> Self {
        if let Some(name) = overrides.name.as_ref().filter(|n| !n.is_empty()) {
            self.name = Some(name.clone());
        }
        if let Some(description) = overrides.description.as_ref().filter(|d| !d.is_empty()) {
            self.description = Some(description.clone());
        }
        if !overrides.metadata.is_empty() {
            self.metadata = overrides.metadata.clone();
        }
        self
    }
}

/// Invoked for every message the consumer receives, possibly concurrently
/// with teardown
pub type MessageHandler = Arc<dyn Fn(StreamMessage) + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StreamContext: Send + Sync + 'static {
    /// Creates an ordered, unacknowledged push consumer on `stream` and
    /// starts delivering to `handler`.
    async fn create_ordered_push_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
        handler: MessageHandler,
    ) -> Result<Box<dyn PushSubscription>>;
}

/// Live consumer subscription returned by [`StreamContext`]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PushSubscription: Send + Sync {
    fn unsubscribe(&self) -> Result<()>;

    /// Messages the consumer still has to deliver
    async fn pending(&self) -> Result<u64>;
}
