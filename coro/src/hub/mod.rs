//! The hub: a single-threaded coroutine scheduler.
//!
//! A hub owns a table of coroutines, a FIFO ready queue, a timer heap and
//! a readiness poller. Its loop repeats:
//!
//! 1. read the clock once,
//! 2. apply unblocks posted by [`Remote`] handles and wake every coroutine
//!    whose timer is due,
//! 3. *quiesce*: resume every ready coroutine once, in FIFO order,
//! 4. wait for I/O readiness: not at all if work is ready, until the
//!    earliest timer if one is armed, indefinitely otherwise.
//!
//! Each thread has a lazily created default hub, reached through [`hub`]
//! and the free functions of this crate. Independent hubs can be built
//! with [`Hub::new`] or [`HubBuilder`]; tests use one per test.

mod builder;
mod core;
mod io;
mod remote;
mod timer;

pub(crate) mod context;

pub use builder::{DEFAULT_STACK_SIZE, HubBuilder, STACK_SIZE_ENV};
pub use remote::Remote;

pub(crate) use builder::Config;
pub(crate) use self::core::{HubCore, WakeHandle};
pub(crate) use io::IoSource;

use crate::coroutine::Coroutine;
use crate::error::{Error, Result};
use crate::time::Time;

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

thread_local! {
    static DEFAULT_HUB: OnceCell<Hub> = const { OnceCell::new() };
}

/// A handle to a coroutine scheduler.
///
/// Handles are cheap to clone and all refer to the same hub. A hub is not
/// `Send`: it and its coroutines stay on the thread that created them.
///
/// Dropping the last owning handle tears the hub down: every coroutine that
/// has started and not finished is cancelled and resumed once so its stack
/// unwinds, and coroutines that never started are dropped unrun.
///
/// Handles created with [`Hub::new`] or the builder, and their clones, are
/// owning. The handle [`hub`] returns inside a coroutine is not: a
/// coroutine holding it does not keep its own hub alive. Moving an owning
/// clone into a coroutine does, until that coroutine finishes.
///
/// # Examples
///
/// ```rust,ignore
/// let hub = Hub::new()?;
///
/// hub.spawn(|| {
///     coro::sleep(Duration::from_millis(10))?;
///     println!("done");
///     Ok(())
/// });
///
/// hub.run()?;
/// ```
pub struct Hub {
    core: Rc<HubCore>,
    owner: bool,
}

impl Hub {
    /// Creates a hub with default settings.
    ///
    /// Equivalent to `HubBuilder::new().build()`.
    pub fn new() -> Result<Self> {
        HubBuilder::new().build()
    }

    /// Returns a builder for a customized hub.
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    pub(crate) fn with_config(config: Config) -> Result<Self> {
        let core = HubCore::new(config)?;
        core.acquire();

        Ok(Self { core, owner: true })
    }

    /// Wraps `core` in a handle that does not take part in teardown.
    pub(crate) fn borrowed(core: Rc<HubCore>) -> Self {
        Self { core, owner: false }
    }

    pub(crate) fn core(&self) -> &HubCore {
        &self.core
    }

    /// Creates a coroutine running `f` and queues it.
    ///
    /// The coroutine does not run until the hub is driven. It runs at
    /// least until its first suspension even if the returned handle is
    /// dropped right away.
    ///
    /// # Panics
    ///
    /// Panics if the coroutine's stack cannot be mapped. Use
    /// [`try_spawn`](Self::try_spawn) to handle that case.
    pub fn spawn<F>(&self, f: F) -> Coroutine
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.try_spawn(f)
            .unwrap_or_else(|err| panic!("failed to spawn coroutine: {err}"))
    }

    /// Like [`spawn`](Self::spawn), but reports a failed stack allocation.
    pub fn try_spawn<F>(&self, f: F) -> Result<Coroutine>
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.core.spawn(Box::new(f))
    }

    /// Runs the loop until the hub is idle.
    ///
    /// Idle means no coroutine is ready, no timer is armed, none is blocked
    /// on I/O and no [`Remote`] handle is alive. Coroutines still waiting
    /// on an [`Event`](crate::Event) at that point can never be woken and
    /// are reported with a warning.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a coroutine.
    pub fn run(&self) -> Result<()> {
        self.core.drive(None, &|| false)?;
        Ok(())
    }

    /// Runs the loop until the hub is idle or `duration` has elapsed.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a coroutine.
    pub fn run_for(&self, duration: Duration) -> Result<()> {
        let stop_at = Time::deadline_after(duration);

        self.core.drive(Some(stop_at), &|| false)?;
        Ok(())
    }

    /// Runs `f` as a coroutine and drives the hub until it returns.
    ///
    /// Other coroutines keep running meanwhile. Returns
    /// [`Error::Deadlock`] if the hub goes idle while `f` is still
    /// suspended.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a coroutine.
    pub fn block_on<T, F>(&self, f: F) -> Result<T>
    where
        T: 'static,
        F: FnOnce() -> Result<T> + 'static,
    {
        let slot = Rc::new(Cell::new(None));

        let root = self.spawn({
            let slot = slot.clone();
            move || {
                slot.set(Some(f()));
                Ok(())
            }
        });

        self.core.drive(None, &|| root.is_dead())?;

        slot.take().unwrap_or(Err(Error::Deadlock))
    }

    /// Resumes every currently ready coroutine once.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a coroutine.
    pub fn quiesce(&self) {
        self.core.quiesce_once();
    }

    /// Returns a thread-safe handle for waking this hub's coroutines.
    pub fn remote(&self) -> Remote {
        self.core.remote()
    }

    /// Number of coroutines whose records are still held.
    pub fn coroutines(&self) -> usize {
        self.core.counts().0
    }

    /// Number of coroutines queued for the next pass.
    pub fn ready(&self) -> usize {
        self.core.counts().1
    }

    /// Number of coroutines BLOCKED on I/O or a [`Remote`].
    pub fn blocked(&self) -> usize {
        self.core.counts().2
    }

    /// Number of coroutines WAITING on events or timers.
    pub fn waiting(&self) -> usize {
        self.core.counts().3
    }
}

impl Clone for Hub {
    fn clone(&self) -> Self {
        if self.owner {
            self.core.acquire();
        }

        Self {
            core: self.core.clone(),
            owner: self.owner,
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        if self.owner && self.core.release_owner() {
            self.core.teardown();
        }
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (coroutines, ready, blocked, waiting) = self.core.counts();

        f.debug_struct("Hub")
            .field("coroutines", &coroutines)
            .field("ready", &ready)
            .field("blocked", &blocked)
            .field("waiting", &waiting)
            .finish()
    }
}

/// Returns the hub running the current coroutine, or this thread's
/// default hub outside of one.
///
/// # Panics
///
/// Panics if the default hub has to be created and that fails.
pub fn hub() -> Hub {
    if let Some(hub) = context::try_with(HubCore::handle).flatten() {
        return hub;
    }

    DEFAULT_HUB.with(|cell| {
        cell.get_or_init(|| {
            Hub::new().unwrap_or_else(|err| panic!("failed to create the default hub: {err}"))
        })
        .clone()
    })
}

/// Spawns a coroutine on the current hub (see [`hub`]).
pub fn start<F>(f: F) -> Coroutine
where
    F: FnOnce() -> Result<()> + 'static,
{
    hub().spawn(f)
}

/// Runs this thread's default hub until it is idle.
pub fn run() -> Result<()> {
    hub().run()
}
