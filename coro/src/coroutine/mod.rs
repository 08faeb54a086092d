//! Stackful coroutines.
//!
//! A coroutine is a function running on its own [`Stack`], suspended and
//! resumed at explicit points. Each coroutine lives in its hub's table as
//! a record; everything else (ready queue, timers, event waiter lists, the
//! I/O registry) refers to it by [`CoroutineId`] only.
//!
//! Lifecycle:
//!
//! ```text
//!   NEW ──resume──▶ RUNNING ──yield──▶ RUNNABLE ──resume──▶ RUNNING
//!                      │    ──block──▶ BLOCKED  ──unblock─▶ RUNNABLE
//!                      │    ──wait───▶ WAITING  ──notify──▶ RUNNABLE
//!                      └──returns──▶ DEAD
//!   any suspended state ──orphaned / hub dropped──▶ DELETED ──unwinds──▶ DEAD
//! ```
//!
//! Every suspension point returns [`Result`]. Once a coroutine is DELETED
//! they all return [`Error::Cancelled`] without suspending, so `?` unwinds
//! the stack through ordinary drops.

mod context;
mod stack;

pub(crate) use context::{Context, switch};
pub(crate) use stack::Stack;

use crate::error::{Error, Result, fatal};
use crate::hub::{HubCore, context as hub_context};
use crate::sync::Event;
use crate::utils::Key;

use std::cell::{Cell, UnsafeCell};
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Scheduling state of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Created, stack primed, never run.
    New,
    /// Currently executing on its own stack.
    Running,
    /// Waiting in the ready queue.
    Runnable,
    /// Suspended until something external unblocks it (I/O readiness, a
    /// [`Remote`](crate::Remote) post).
    Blocked,
    /// Suspended on an [`Event`] or a timer.
    Waiting,
    /// Finished; the stack is gone.
    Dead,
    /// Lost its last owner while suspended; being unwound.
    Deleted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::New => "new",
            Status::Running => "running",
            Status::Runnable => "runnable",
            Status::Blocked => "blocked",
            Status::Waiting => "waiting",
            Status::Dead => "dead",
            Status::Deleted => "deleted",
        };

        f.write_str(name)
    }
}

/// Identifies a coroutine within its hub.
///
/// Ids are generation checked: an id kept past its coroutine's reclamation
/// never refers to a later coroutine. Ids are `Send`, so other threads can
/// hold them and wake the coroutine through a [`Remote`](crate::Remote).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroutineId(pub(crate) Key);

impl fmt::Debug for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoroutineId({:?})", self.0)
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}

pub(crate) type Body = Box<dyn FnOnce() -> Result<()>>;

/// A coroutine as the hub's table stores it.
pub(crate) struct Record {
    pub(crate) context: UnsafeCell<Context>,
    pub(crate) status: Cell<Status>,
    pub(crate) stack: Cell<Option<Stack>>,
    pub(crate) body: Cell<Option<Body>>,
    /// Live [`Coroutine`] handles.
    pub(crate) handles: Cell<usize>,
    pub(crate) detached: Cell<bool>,
    /// Bumped on every wait; a timer only wakes the wait it was armed for.
    pub(crate) epoch: Cell<u64>,
    /// Notified once the body has returned.
    pub(crate) exited: Event,
}

impl Record {
    pub(crate) fn new(body: Body) -> Self {
        Self {
            context: UnsafeCell::new(Context::empty()),
            status: Cell::new(Status::New),
            stack: Cell::new(None),
            body: Cell::new(Some(body)),
            handles: Cell::new(0),
            detached: Cell::new(false),
            epoch: Cell::new(0),
            exited: Event::new(),
        }
    }

    /// No handle and not detached: nothing can observe this coroutine any more.
    pub(crate) fn is_orphaned(&self) -> bool {
        self.handles.get() == 0 && !self.detached.get()
    }
}

/// First function on every coroutine stack.
///
/// `arg` is the record itself; the hub's table keeps it alive until the
/// hub has seen the coroutine DEAD.
pub(crate) extern "C" fn entry(arg: *mut c_void) -> ! {
    let record = unsafe { &*(arg as *const Record) };

    run_body(record);

    let hub = hub_context::current_core();
    if hub.is_null() {
        fatal!("coroutine finished outside of its hub");
    }

    unsafe { (*hub).exit(record) }
}

fn run_body(record: &Record) {
    let Some(body) = record.body.take() else {
        fatal!("coroutine started without a body");
    };

    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => {}
        Ok(Err(Error::Cancelled)) => tracing::trace!("coroutine unwound after cancellation"),
        Ok(Err(err)) => fatal!("coroutine returned an error: {err}"),
        Err(_) => fatal!("coroutine panicked"),
    }

    record.exited.notify_all();
}

/// An owning handle to a coroutine.
///
/// Handles are counted. While at least one exists (or the coroutine was
/// [detached](Coroutine::detach)) the coroutine keeps running. Dropping the
/// last handle of a suspended coroutine cancels it: the next time it is
/// resumed every suspension point returns [`Error::Cancelled`]. Dropping a
/// handle to a finished coroutine only releases its record.
///
/// A freshly spawned coroutine always runs at least until its first
/// suspension, even if its handle is dropped right away.
pub struct Coroutine {
    hub: Weak<HubCore>,
    id: CoroutineId,
}

impl Coroutine {
    /// Wraps a handle slot that the caller already counted.
    pub(crate) fn from_counted(hub: Weak<HubCore>, id: CoroutineId) -> Self {
        Self { hub, id }
    }

    /// Returns this coroutine's id.
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    /// Returns the current status.
    ///
    /// A coroutine whose hub is gone reports [`Status::Dead`].
    pub fn status(&self) -> Status {
        self.hub
            .upgrade()
            .and_then(|hub| hub.record(self.id))
            .map_or(Status::Dead, |record| record.status.get())
    }

    /// Returns `true` once the coroutine has finished.
    pub fn is_dead(&self) -> bool {
        self.status() == Status::Dead
    }

    /// Suspends the calling coroutine until this one is dead.
    ///
    /// # Panics
    ///
    /// Panics if called by the coroutine on itself, or outside a coroutine
    /// while this one is still alive.
    pub fn join(&self) -> Result<()> {
        let record = match self.hub.upgrade().and_then(|hub| hub.record(self.id)) {
            Some(record) => record,
            None => return Ok(()),
        };

        if record.status.get() == Status::Dead {
            return Ok(());
        }

        if hub_context::try_with(|hub| hub.running_id()) == Some(Some(self.id)) {
            panic!("coroutine {} cannot join itself", self.id);
        }

        record
            .exited
            .wait_until(|| record.status.get() == Status::Dead)
    }

    /// Lets the coroutine run to completion without a handle.
    pub fn detach(self) {
        if let Some(record) = self.hub.upgrade().and_then(|hub| hub.record(self.id)) {
            record.detached.set(true);
        }
    }

    /// Moves a BLOCKED coroutine back to the ready queue.
    ///
    /// Fatal if the coroutine is not BLOCKED. From another thread, use a
    /// [`Remote`](crate::Remote) instead.
    pub fn unblock(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unblock(self.id);
        }
    }
}

impl Clone for Coroutine {
    fn clone(&self) -> Self {
        if let Some(hub) = self.hub.upgrade() {
            hub.retain(self.id);
        }

        Self {
            hub: self.hub.clone(),
            id: self.id,
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.release(self.id);
        }
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Returns a handle to the running coroutine.
///
/// # Panics
///
/// Panics outside of a coroutine.
pub fn current() -> Coroutine {
    hub_context::with(|hub| hub.current_handle())
}

/// Gives up the processor; the coroutine runs again on the next pass.
///
/// # Panics
///
/// Panics outside of a coroutine.
pub fn yield_now() -> Result<()> {
    hub_context::with(|hub| hub.suspend(Status::Runnable))
}

/// Suspends until [`Coroutine::unblock`] or [`Remote::unblock`] is called
/// for this coroutine.
///
/// [`Remote::unblock`]: crate::Remote::unblock
///
/// # Panics
///
/// Panics outside of a coroutine.
pub fn block() -> Result<()> {
    hub_context::with(|hub| hub.suspend(Status::Blocked))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Hub;

    use std::cell::RefCell;

    #[test]
    fn status_names() {
        assert_eq!(Status::Runnable.to_string(), "runnable");
        assert_eq!(Status::Deleted.to_string(), "deleted");
    }

    #[test]
    fn new_coroutine_is_counted_once() {
        let hub = Hub::new().unwrap();
        let co = hub.spawn(|| Ok(()));

        assert_eq!(co.status(), Status::New);
        let record = hub.core().record(co.id()).unwrap();
        assert_eq!(record.handles.get(), 1);

        let other = co.clone();
        assert_eq!(record.handles.get(), 2);
        drop(other);
        assert_eq!(record.handles.get(), 1);
    }

    #[test]
    fn block_and_unblock_on_thread() {
        let hub = Hub::new().unwrap();
        let trace = Rc::new(RefCell::new(Vec::new()));

        let sleeper = hub.spawn({
            let trace = trace.clone();
            move || {
                trace.borrow_mut().push("blocking");
                block()?;
                trace.borrow_mut().push("unblocked");
                Ok(())
            }
        });

        let waker = hub.spawn({
            let trace = trace.clone();
            let sleeper = sleeper.clone();
            move || {
                yield_now()?;
                assert_eq!(sleeper.status(), Status::Blocked);
                trace.borrow_mut().push("waking");
                sleeper.unblock();
                Ok(())
            }
        });

        hub.run().unwrap();

        assert!(sleeper.is_dead());
        assert!(waker.is_dead());
        assert_eq!(*trace.borrow(), ["blocking", "waking", "unblocked"]);
    }

    #[test]
    fn current_reports_running_id() {
        let hub = Hub::new().unwrap();
        let seen = Rc::new(Cell::new(None));

        let co = hub.spawn({
            let seen = seen.clone();
            move || {
                let me = current();
                assert_eq!(me.status(), Status::Running);
                seen.set(Some(me.id()));
                Ok(())
            }
        });

        hub.run().unwrap();
        assert_eq!(seen.get(), Some(co.id()));
    }
}
