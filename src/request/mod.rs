//! In-flight request arbitration
//!
//! - [`CancellableWaiter`] - single-assignment outcome slot
//! - [`InFlightRequest`] - races a reply, caller cancellation and a timeout
//! - [`RequestRegistry`] - routes replies by request id and drops entries on
//!   completion

mod in_flight;
mod registry;
mod waiter;

pub use in_flight::*;
pub use registry::*;
pub use waiter::*;
