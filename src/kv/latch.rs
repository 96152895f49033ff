use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;

use super::KvWatcher;
use crate::metrics::WATCH_END_OF_DATA;

/// One-shot "initial replay complete" flag.
///
/// Both the message handler and the post-subscribe pending check race to set
/// it; only the winner notifies the watcher.
#[derive(Debug, Default)]
pub struct EndOfDataLatch {
    fired: AtomicBool,
}

impl EndOfDataLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Sets the latch and notifies `watcher` if it was still unset.
    ///
    /// Returns true for the single caller that fired the notification.
    pub fn try_signal(
        &self,
        watcher: &dyn KvWatcher,
    ) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        debug!("watch reached end of initial data");
        WATCH_END_OF_DATA.inc();
        watcher.on_end_of_data();
        true
    }
}
