//! Synchronization primitives for coroutines.
//!
//! - [`Event`] is a condition: coroutines wait on it, and a notification
//!   wakes every current waiter in the order they started waiting.
//! - [`Selector`] waits on several events at once and runs the callback of
//!   whichever fired.
//!
//! ## Design notes
//!
//! - Both live on one hub's thread and are `!Send`. To wake a coroutine
//!   from another thread, use a [`Remote`](crate::Remote).
//! - Notifications are not latched: an event notified while nobody waits
//!   is lost. Pair events with state and wait with
//!   [`Event::wait_until`].
//! - Waiters hold the hub weakly; an event may outlive its hub.

mod event;
mod selector;

pub use event::Event;
pub use selector::Selector;

pub(crate) use event::WaitToken;
