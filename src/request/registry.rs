use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::CancellableWaiter;
use super::InFlightRequest;
use super::OnCompleted;
use crate::metrics::OUTCOME_VALUE;
use crate::metrics::REQUEST_OUTCOMES;
use crate::Error;
use crate::RequestConfig;
use crate::Result;

type PendingMap<T> = DashMap<String, Arc<CancellableWaiter<T>>>;

/// Table of outstanding requests keyed by request id.
///
/// Replies are routed in through [`resolve`](Self::resolve). Each
/// [`InFlightRequest`] removes its own entry when disposed, through the
/// completion callback handed to it at registration.
pub struct RequestRegistry<T> {
    pending: Arc<PendingMap<T>>,
    prefix: String,
    next_id: AtomicU64,
    config: RequestConfig,
}

impl<T> std::fmt::Debug for RequestRegistry<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("prefix", &self.prefix)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> RequestRegistry<T> {
    pub fn new(config: RequestConfig) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            prefix: nanoid::nanoid!(),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Registers a request under a freshly generated id.
    ///
    /// `timeout == None` falls back to `RequestConfig::default_timeout_ms`.
    pub fn register(
        &self,
        caller_token: Option<CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<InFlightRequest<T>> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}.{}", self.prefix, n);
        self.register_with_id(id, caller_token, timeout)
    }

    /// Registers a request under a caller-chosen id.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `id` is empty or already outstanding
    pub fn register_with_id(
        &self,
        id: impl Into<String>,
        caller_token: Option<CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<InFlightRequest<T>> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidArgument("request id must not be empty".into()));
        }
        let slot = match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::InvalidArgument(format!(
                    "request id {id} is already in flight"
                )));
            }
            Entry::Vacant(slot) => slot,
        };

        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());
        let request = InFlightRequest::new(
            id.clone(),
            caller_token,
            timeout,
            Some(self.completion_callback()),
        )?;

        slot.insert(request.waiter());
        trace!(request_id = %id, "Request registered");
        Ok(request)
    }

    fn completion_callback(&self) -> OnCompleted {
        let pending = Arc::clone(&self.pending);
        Arc::new(move |id: &str| {
            if pending.remove(id).is_some() {
                trace!(request_id = %id, "Request unregistered");
            }
        })
    }
}

impl<T> RequestRegistry<T> {
    /// Routes a reply to the request registered under `id`.
    ///
    /// Returns false when the id is unknown (already completed or never
    /// registered) or when another outcome already won.
    pub fn resolve(
        &self,
        id: &str,
        value: T,
    ) -> bool {
        let Some(waiter) = self.pending.get(id).map(|w| Arc::clone(w.value())) else {
            debug!(request_id = %id, "Reply for unknown request dropped");
            return false;
        };

        let won = waiter.resolve(value);
        if won {
            REQUEST_OUTCOMES.with_label_values(&[OUTCOME_VALUE]).inc();
        }
        won
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
