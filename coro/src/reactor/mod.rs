//! Readiness backend.
//!
//! The hub blocks here when no coroutine is ready to run: until a
//! registered descriptor becomes readable or writable, the earliest timer
//! is due, or another thread wakes it. Readiness for a descriptor unblocks
//! the coroutines the I/O registry has parked on it.
//!
//! Runtime users never touch the reactor directly; the networking types
//! and the hub loop are built on it.

mod event;

pub(crate) mod poller;

pub(crate) use event::Readiness;
pub(crate) use poller::{Interest, Poller, Waker};
