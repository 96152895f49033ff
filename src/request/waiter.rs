use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::RequestError;
use crate::Result;

/// Observable state of a [`CancellableWaiter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaiterState {
    Pending = 0,
    Completed = 1,
    Cancelled = 2,
    TimedOut = 3,
}

impl WaiterState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WaiterState::Completed,
            2 => WaiterState::Cancelled,
            3 => WaiterState::TimedOut,
            _ => WaiterState::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != WaiterState::Pending
    }
}

enum Outcome<T> {
    Value(T),
    Cancelled,
    TimedOut,
}

/// Single-assignment future yielding a value, a cancellation or a timeout.
///
/// `resolve`, `cancel` and `timeout` race for the one transition out of
/// `Pending`; the first caller wins and every later attempt returns `false`.
/// The sender slot is the only synchronization point, so the state observed
/// through [`state`](Self::state) always matches what `wait` returns.
pub struct CancellableWaiter<T> {
    sender: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
    receiver: Mutex<Option<oneshot::Receiver<Outcome<T>>>>,
    state: AtomicU8,
}

impl<T> Default for CancellableWaiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CancellableWaiter<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CancellableWaiter").field("state", &self.state()).finish()
    }
}

impl<T> CancellableWaiter<T> {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            state: AtomicU8::new(WaiterState::Pending as u8),
        }
    }

    /// Completes the waiter with `value`. Returns false if already settled.
    pub fn resolve(
        &self,
        value: T,
    ) -> bool {
        self.settle(WaiterState::Completed, Outcome::Value(value))
    }

    /// Settles the waiter as cancelled. Returns false if already settled.
    pub fn cancel(&self) -> bool {
        self.settle(WaiterState::Cancelled, Outcome::Cancelled)
    }

    /// Settles the waiter as timed out. Returns false if already settled.
    pub fn timeout(&self) -> bool {
        self.settle(WaiterState::TimedOut, Outcome::TimedOut)
    }

    pub fn state(&self) -> WaiterState {
        WaiterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    /// Waits for the first terminal outcome.
    ///
    /// The outcome can be taken once; a second call fails with
    /// [`RequestError::AlreadyAwaited`].
    pub async fn wait(&self) -> Result<T> {
        let receiver = self.receiver.lock().take();
        let Some(receiver) = receiver else {
            return Err(RequestError::AlreadyAwaited.into());
        };

        match receiver.await {
            Ok(Outcome::Value(value)) => Ok(value),
            Ok(Outcome::TimedOut) => Err(RequestError::TimedOut.into()),
            // The sender lives as long as `self`, so a closed channel only
            // shows up when the waiter is torn down mid-wait.
            Ok(Outcome::Cancelled) | Err(_) => Err(RequestError::Cancelled.into()),
        }
    }

    fn settle(
        &self,
        state: WaiterState,
        outcome: Outcome<T>,
    ) -> bool {
        let mut slot = self.sender.lock();
        let Some(sender) = slot.take() else {
            return false;
        };
        self.state.store(state as u8, Ordering::Release);
        // Receiver already dropped means nobody waits; the state still counts.
        let _ = sender.send(outcome);
        true
    }
}
