//! A single outstanding request/reply call.
//!
//! An [`InFlightRequest`] races three sources for one terminal outcome:
//!
//! ```text
//!   reply (resolve) ─────────────┐
//!   caller token ──┐             ▼
//!                  ├─> signal ─> handler ─> CancellableWaiter ─> wait()
//!   timeout timer ─┘
//! ```
//!
//! `signal` is the derived cancellation controller. It only exists when a
//! timeout is configured; it is then a child of the caller token (or a fresh
//! token when the caller passed none) and the timer cancels it on expiry.
//! Without a timeout the caller token is watched directly.
//!
//! The handler re-checks the caller token itself when the signal fires: a
//! cancelled caller token, or no timeout at all, settles the waiter as
//! `Cancelled`; anything else is the internal deadline and settles `TimedOut`.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::CancellableWaiter;
use super::WaiterState;
use crate::metrics::OUTCOME_CANCELLED;
use crate::metrics::OUTCOME_DISPOSED;
use crate::metrics::OUTCOME_TIMED_OUT;
use crate::metrics::OUTCOME_VALUE;
use crate::metrics::REQUEST_OUTCOMES;
use crate::Error;
use crate::Result;

/// Completion callback invoked once with the request id on disposal
pub type OnCompleted = Arc<dyn Fn(&str) + Send + Sync>;

/// Cancellation wiring owned by one request
struct CancellationRegistration {
    /// Task awaiting the effective signal (and arming the timer, if any)
    handler: JoinHandle<()>,
    /// Derived controller, present only when a timeout is configured
    derived: Option<CancellationToken>,
}

/// Tracks one outstanding request until its first terminal outcome.
///
/// Dropping the request disposes it, so the completion callback always fires
/// exactly once.
pub struct InFlightRequest<T> {
    id: String,
    waiter: Arc<CancellableWaiter<T>>,
    registration: Option<CancellationRegistration>,
    on_completed: OnCompleted,
    disposed: AtomicBool,
}

impl<T> std::fmt::Debug for InFlightRequest<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InFlightRequest")
            .field("id", &self.id)
            .field("state", &self.waiter.state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<T: Send + 'static> InFlightRequest<T> {
    /// Creates the request and wires its cancellation sources.
    ///
    /// # Arguments
    /// * `id` - Request identifier passed back to `on_completed`
    /// * `caller_token` - Caller cancellation; `None` never fires
    /// * `timeout` - Internal deadline; `Duration::ZERO` disables it
    /// * `on_completed` - Registry notification, required
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `on_completed` is missing
    /// - [`Error::InvalidArgument`] if a cancellation source is configured
    ///   outside a tokio runtime
    pub fn new(
        id: impl Into<String>,
        caller_token: Option<CancellationToken>,
        timeout: Duration,
        on_completed: Option<OnCompleted>,
    ) -> Result<Self> {
        let id = id.into();
        let on_completed = on_completed.ok_or_else(|| {
            Error::InvalidArgument(format!("request {id}: completion callback is required"))
        })?;

        let waiter = Arc::new(CancellableWaiter::new());
        let registration = Self::register_cancellation(&id, &waiter, caller_token, timeout)?;

        trace!(request_id = %id, ?timeout, "In-flight request created");

        Ok(Self {
            id,
            waiter,
            registration,
            on_completed,
            disposed: AtomicBool::new(false),
        })
    }

    /// Same as [`new`](Self::new) with a signed millisecond timeout; values
    /// `<= 0` disable the internal deadline.
    pub fn from_millis(
        id: impl Into<String>,
        caller_token: Option<CancellationToken>,
        timeout_ms: i64,
        on_completed: Option<OnCompleted>,
    ) -> Result<Self> {
        let timeout = u64::try_from(timeout_ms).map(Duration::from_millis).unwrap_or(Duration::ZERO);
        Self::new(id, caller_token, timeout, on_completed)
    }

    fn register_cancellation(
        id: &str,
        waiter: &Arc<CancellableWaiter<T>>,
        caller_token: Option<CancellationToken>,
        timeout: Duration,
    ) -> Result<Option<CancellationRegistration>> {
        let has_timeout = !timeout.is_zero();

        let (signal, derived) = match (has_timeout, &caller_token) {
            (false, None) => return Ok(None),
            (false, Some(caller)) => (caller.clone(), None),
            (true, None) => {
                let derived = CancellationToken::new();
                (derived.clone(), Some(derived))
            }
            (true, Some(caller)) => {
                let derived = caller.child_token();
                (derived.clone(), Some(derived))
            }
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::InvalidArgument(format!(
                "request {id}: cancellation and timeouts require a tokio runtime"
            ))
        })?;

        let id = id.to_string();
        let waiter = Arc::clone(waiter);
        let handler = runtime.spawn(async move {
            if has_timeout {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => signal.cancel(),
                }
            } else {
                signal.cancelled().await;
            }

            let caller_gave_up = caller_token.as_ref().is_some_and(|t| t.is_cancelled());
            if caller_gave_up || !has_timeout {
                if waiter.cancel() {
                    REQUEST_OUTCOMES.with_label_values(&[OUTCOME_CANCELLED]).inc();
                    debug!(request_id = %id, "Request cancelled by caller");
                }
            } else if waiter.timeout() {
                REQUEST_OUTCOMES.with_label_values(&[OUTCOME_TIMED_OUT]).inc();
                debug!(request_id = %id, ?timeout, "Request timed out");
            }
        });

        Ok(Some(CancellationRegistration { handler, derived }))
    }
}

impl<T> InFlightRequest<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WaiterState {
        self.waiter.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Completes the request with a reply.
    ///
    /// Returns false when another outcome already won or the request was
    /// disposed.
    pub fn resolve(
        &self,
        value: T,
    ) -> bool {
        if self.is_disposed() {
            return false;
        }
        let won = self.waiter.resolve(value);
        if won {
            REQUEST_OUTCOMES.with_label_values(&[OUTCOME_VALUE]).inc();
        }
        won
    }

    /// Waits for the terminal outcome.
    ///
    /// # Errors
    /// - [`crate::RequestError::Cancelled`] when the caller gave up or the
    ///   request was disposed while pending
    /// - [`crate::RequestError::TimedOut`] when the internal deadline expired
    /// - [`crate::RequestError::AlreadyAwaited`] on a second call
    pub async fn wait(&self) -> Result<T> {
        self.waiter.wait().await
    }

    /// Releases the cancellation wiring and notifies the registry.
    ///
    /// Idempotent: only the first call does anything. A still-pending waiter
    /// is settled as cancelled so no `wait` is left hanging.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(registration) = &self.registration {
            registration.handler.abort();
            if let Some(derived) = &registration.derived {
                trace!(request_id = %self.id, fired = derived.is_cancelled(), "Derived controller released");
            }
        }

        if self.waiter.cancel() {
            REQUEST_OUTCOMES.with_label_values(&[OUTCOME_DISPOSED]).inc();
            debug!(request_id = %self.id, "Request disposed while pending");
        }

        (self.on_completed)(&self.id);
    }

    pub(crate) fn waiter(&self) -> Arc<CancellableWaiter<T>> {
        Arc::clone(&self.waiter)
    }
}

impl<T> Drop for InFlightRequest<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
