//! Key-value watching on top of durable streams.
//!
//! A bucket `B` lives in stream `KV_B`; key `k` is written to subject
//! `$KV.B.k`. Watching a bucket means running an ordered push consumer over
//! those subjects and turning its messages into [`KvEntry`] values.

mod consumer;
mod entry;
mod latch;
mod options;
mod store;
mod subject;
mod subscription;
mod watcher;

pub use consumer::*;
pub use entry::*;
pub use latch::*;
pub use options::*;
pub use store::*;
pub use subject::*;
pub use subscription::*;
pub use watcher::*;
