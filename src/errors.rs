//! Client Core Error Hierarchy
//!
//! Defines the error types surfaced by request arbitration and key-value
//! watching, categorized by the subsystem that produced them.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Terminal outcomes of an in-flight request other than a reply
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Failures of the durable-stream consumer behind a watch
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// A stream message could not be turned into a key-value entry
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Client configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Construction-time misuse, never retried
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The caller gave up, or cancellation fired with no timeout configured
    #[error("Request cancelled")]
    Cancelled,

    /// The library-imposed deadline expired before a reply arrived
    #[error("Request timed out")]
    TimedOut,

    /// The outcome was already taken by an earlier `wait`
    #[error("Request outcome already awaited")]
    AlreadyAwaited,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The stream context refused to create the push consumer
    #[error("Failed to create consumer on stream {stream}: {reason}")]
    Subscribe { stream: String, reason: String },

    /// Tearing down the consumer subscription failed
    #[error("Failed to tear down subscription: {0}")]
    Teardown(String),

    /// The consumer's calculated pending count could not be read
    #[error("Failed to read consumer pending count: {0}")]
    Pending(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Subject {subject} does not belong to bucket prefix {prefix}")]
    UnexpectedSubject { subject: String, prefix: String },

    #[error("Unknown KV operation header value: {0}")]
    UnknownOperation(String),

    #[error("Message carries no stream metadata")]
    MissingMetadata,

    #[error("Malformed stream metadata in reply subject: {0}")]
    MalformedMetadata(String),
}

impl Error {
    /// Returns true when the error is one of the two request terminal states
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Request(RequestError::Cancelled))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Error::Request(RequestError::TimedOut))
    }
}
