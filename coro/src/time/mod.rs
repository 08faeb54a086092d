//! Time utilities.
//!
//! This module provides the runtime's clock and its timer-driven
//! suspension points:
//! - [`Time`], a microsecond value read from the monotonic clock,
//! - [`sleep`] and [`sleep_until`] for suspending a coroutine,
//! - [`timer`] for calling a function periodically.

mod clock;
mod sleep;

pub use clock::Time;

#[doc(inline)]
pub use sleep::{sleep, sleep_until, timer};
