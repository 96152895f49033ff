use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

use super::KvEntry;
use crate::Error;

/// Receives the events of one watch subscription.
///
/// Callbacks run on the consumer's delivery path and must not block.
pub trait KvWatcher: Send + Sync {
    fn on_entry(
        &self,
        entry: KvEntry,
    );

    /// Fired once, when the initial replay is complete
    fn on_end_of_data(&self);

    /// A message that could not be decoded; the watch keeps running
    fn on_error(
        &self,
        error: Error,
    ) {
        warn!(%error, "watch skipped undecodable message");
    }
}

#[derive(Debug)]
pub enum WatchEvent {
    Entry(KvEntry),
    EndOfData,
    Error(Error),
}

/// Forwards every callback into an unbounded channel
#[derive(Debug)]
pub struct ChannelWatcher {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl ChannelWatcher {
    pub fn new() -> (Self, UnboundedReceiverStream<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }

    fn forward(
        &self,
        event: WatchEvent,
    ) {
        // The receiving side may already be gone after a collect finished.
        let _ = self.tx.send(event);
    }
}

impl KvWatcher for ChannelWatcher {
    fn on_entry(
        &self,
        entry: KvEntry,
    ) {
        self.forward(WatchEvent::Entry(entry));
    }

    fn on_end_of_data(&self) {
        self.forward(WatchEvent::EndOfData);
    }

    fn on_error(
        &self,
        error: Error,
    ) {
        self.forward(WatchEvent::Error(error));
    }
}
