//! Platform-specific readiness poller.
//!
//! One interface over the OS mechanism the hub blocks in:
//! - epoll with an `eventfd` waker on Linux,
//! - kqueue with an `EVFILT_USER` waker on macOS.
//!
//! Descriptors are registered edge-triggered for both directions once, at
//! creation. Coroutines always attempt the operation before waiting, so a
//! missed edge can only mean the operation succeeds right away.
//!
//! The concrete implementation is selected at compile time.

pub(crate) mod common;

pub(crate) use common::{Interest, Waker};

#[cfg(target_os = "macos")]
mod kqueue;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "macos")]
pub(crate) type Poller = kqueue::KqueuePoller;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
compile_error!("coro needs epoll (Linux) or kqueue (macOS)");

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
