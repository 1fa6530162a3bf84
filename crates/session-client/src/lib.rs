//! Client-side half of a replicated-state-machine session: registration,
//! hash-chained request/reply dispatch, and timer-driven retransmission.
//!
//! The transport is never a concrete dependency here — callers supply a
//! [`MessageBus`] implementation and drive the state machine tick by tick.

mod bus;
mod client;
mod error;
mod queue;
mod timer;

pub use bus::{test_support, MessageBus, OwnedMessage};
pub use client::{Client, PING_TIMEOUT_TICKS, REQUEST_TIMEOUT_INITIAL_TICKS, REQUEST_TIMEOUT_MAX_TICKS};
pub use error::ClientError;
pub use queue::{QueuedRequest, RequestCallback, RequestQueue};
pub use timer::Timer;
