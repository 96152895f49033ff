use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;


lazy_static! {
    /// Terminal outcome of every in-flight request: value, cancelled, timed_out, disposed
    pub static ref REQUEST_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("request_outcomes", "Terminal outcomes of in-flight requests"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_ENTRIES_DELIVERED: IntCounter = IntCounter::new(
        "watch_entries_delivered",
        "Key-value entries handed to watchers"
    )
    .expect("metric can not be created");

    pub static ref WATCH_ENTRIES_SUPPRESSED: IntCounter = IntCounter::new(
        "watch_entries_suppressed",
        "Delete or purge entries dropped because the watch ignores deletes"
    )
    .expect("metric can not be created");

    pub static ref WATCH_END_OF_DATA: IntCounter = IntCounter::new(
        "watch_end_of_data",
        "End-of-data notifications fired by watch subscriptions"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) const OUTCOME_VALUE: &str = "value";
pub(crate) const OUTCOME_CANCELLED: &str = "cancelled";
pub(crate) const OUTCOME_TIMED_OUT: &str = "timed_out";
pub(crate) const OUTCOME_DISPOSED: &str = "disposed";

/// Registers every client-core collector into `registry`
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(REQUEST_OUTCOMES.clone()))?;
    registry.register(Box::new(WATCH_ENTRIES_DELIVERED.clone()))?;
    registry.register(Box::new(WATCH_ENTRIES_SUPPRESSED.clone()))?;
    registry.register(Box::new(WATCH_END_OF_DATA.clone()))?;
    Ok(())
}

/// Renders `registry` in the Prometheus text exposition format
pub fn gather_text(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
        return String::default();
    }

    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
