//! # coro
//!
//! **coro** runs stackful coroutines cooperatively on a single thread.
//!
//! Each coroutine has its own stack and is written as ordinary blocking
//! code. When it sleeps, waits on an [`Event`] or finds a socket not ready,
//! it suspends and the thread's *hub* switches to the next ready
//! coroutine. Nothing is preempted: a coroutine runs until it suspends.
//!
//! The crate provides:
//!
//! - **Coroutines** with an explicit lifecycle, joinable handles and
//!   cancellation that unwinds suspended stacks
//! - A **hub** per thread: FIFO ready queue, timer heap and an
//!   epoll/kqueue readiness poller
//! - **Events** and **selectors** for waiting on conditions
//! - **Timers**: [`sleep`], [`sleep_until`] and periodic [`timer`]s
//! - **TCP networking** whose reads and writes park only the caller
//! - Attribute macros `#[coro::main]` and `#[coro::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! #[coro::main]
//! fn main() {
//!     let worker = coro::start(|| {
//!         coro::sleep(Duration::from_millis(100))?;
//!         println!("worker done");
//!         Ok(())
//!     });
//!
//!     worker.join()?;
//! }
//! ```
//!
//! ## Cancellation
//!
//! Every suspending call returns [`Result`]. When a coroutine is cancelled
//! (its hub is torn down, or its last handle is dropped while it is ready
//! to run) the pending call returns [`Error::Cancelled`], and so does every
//! later one. Propagating it with `?` unwinds the coroutine's stack and
//! runs its destructors.
//!
//! ## Modules
//!
//! - [`net`]: TCP listener and stream
//! - [`sync`]: events and selectors
//! - [`time`]: monotonic clock, sleeping and timers
//!
//! ## Logging
//!
//! The hub reports through [`tracing`](https://docs.rs/tracing): spawns,
//! switches and descriptor registration at `trace`, cancellations at
//! `debug`, a hub stalled on events nothing can notify at `warn`, and
//! fatal invariant violations at `error` before aborting.

mod coroutine;
mod error;
mod hub;
mod reactor;
mod utils;

pub mod net;
pub mod sync;
pub mod time;

pub use coroutine::{Coroutine, CoroutineId, Status, block, current, yield_now};
pub use error::{Error, Result};
pub use hub::{DEFAULT_STACK_SIZE, Hub, HubBuilder, Remote, STACK_SIZE_ENV, hub, run, start};
pub use sync::{Event, Selector};
pub use time::{Time, sleep, sleep_until, timer};

pub use coro_macros::{main, test};
