//! Client core for a publish/subscribe broker with durable streams.
//!
//! - [`request`] arbitrates in-flight request/reply calls between a reply,
//!   caller cancellation and an optional timeout.
//! - [`kv`] watches key-value buckets stored in durable streams and reports
//!   when the initial replay is complete.

mod config;
mod errors;
pub mod kv;
mod metrics;
pub mod request;

pub use config::*;
pub use errors::*;
pub use kv::*;
pub use metrics::*;
pub use request::*;

//-----------------------------------------------------------
// Test utils
