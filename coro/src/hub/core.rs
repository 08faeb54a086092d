use super::builder::Config;
use super::context;
use super::io::Source;
use super::remote::Remote;
use super::timer::{Queues, Timeout};
use crate::coroutine::{self, Body, Context, Coroutine, CoroutineId, Record, Stack, Status, switch};
use crate::error::{Error, Result, fatal};
use crate::reactor::{Interest, Poller, Readiness, Waker};
use crate::time::Time;
use crate::utils::{Key, Slab};

use std::cell::{Cell, RefCell, UnsafeCell};
use std::ffi::c_void;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Why a call to [`HubCore::drive`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stop {
    /// The caller's completion check passed.
    Done,
    /// The deadline passed.
    Elapsed,
    /// Nothing left can make progress.
    Idle,
}

/// Wakes one coroutine waiting on an [`Event`](crate::Event).
///
/// Holds the hub weakly: a waiter list outliving its hub wakes nobody.
#[derive(Clone)]
pub(crate) struct WakeHandle {
    hub: Weak<HubCore>,
    id: CoroutineId,
}

impl WakeHandle {
    pub(crate) fn notify(&self) {
        if let Some(core) = self.hub.upgrade() {
            core.notify(self.id);
        }
    }
}

/// Scheduling state of one hub.
///
/// Everything here is single-threaded except `queues`, which is shared
/// with [`Remote`] handles.
pub(crate) struct HubCore {
    this: Weak<HubCore>,
    config: Config,

    /// Live owning [`Hub`](super::Hub) handles.
    owners: Cell<usize>,

    /// Where the hub's own stack is parked while a coroutine runs.
    main: UnsafeCell<Context>,

    /// Coroutine currently running, if any.
    current: Cell<Option<CoroutineId>>,

    coroutines: RefCell<Slab<Rc<Record>>>,
    queues: Arc<Mutex<Queues>>,

    /// BLOCKED coroutines, counted when they park.
    blocked: Cell<usize>,

    /// WAITING coroutines, counted when they park.
    waiting: Cell<usize>,

    poller: RefCell<Poller>,
    waker: Arc<Waker>,
    sources: RefCell<Slab<Source>>,
    events: RefCell<Vec<Readiness>>,
}

impl HubCore {
    pub(crate) fn new(config: Config) -> Result<Rc<Self>> {
        let poller = Poller::new(config.event_capacity)?;
        let waker = poller.waker();

        Ok(Rc::new_cyclic(|this| HubCore {
            this: this.clone(),
            config,
            owners: Cell::new(0),
            main: UnsafeCell::new(Context::empty()),
            current: Cell::new(None),
            coroutines: RefCell::new(Slab::with_capacity(64)),
            queues: Arc::new(Mutex::new(Queues::default())),
            blocked: Cell::new(0),
            waiting: Cell::new(0),
            poller: RefCell::new(poller),
            waker,
            sources: RefCell::new(Slab::with_capacity(16)),
            events: RefCell::new(Vec::with_capacity(config.event_capacity)),
        }))
    }

    pub(crate) fn downgrade(&self) -> Weak<HubCore> {
        self.this.clone()
    }

    pub(crate) fn handle(&self) -> Option<super::Hub> {
        self.this.upgrade().map(super::Hub::borrowed)
    }

    pub(crate) fn acquire(&self) {
        self.owners.set(self.owners.get() + 1);
    }

    /// Drops one owner and returns `true` if it was the last.
    pub(crate) fn release_owner(&self) -> bool {
        let owners = self.owners.get().saturating_sub(1);
        self.owners.set(owners);
        owners == 0
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remote(&self) -> Remote {
        Remote::new(self.queues.clone(), self.waker.clone())
    }

    pub(crate) fn record(&self, id: CoroutineId) -> Option<Rc<Record>> {
        self.coroutines.borrow().get(id.0).cloned()
    }

    pub(crate) fn running_id(&self) -> Option<CoroutineId> {
        self.current.get()
    }

    fn running(&self) -> (CoroutineId, Rc<Record>) {
        let Some(id) = self.current.get() else {
            panic!("coro primitive used outside of a coroutine");
        };

        match self.record(id) {
            Some(record) => (id, record),
            None => fatal!("running coroutine {id} has no record"),
        }
    }

    pub(crate) fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.coroutines.borrow().len(),
            self.queues().ready.len(),
            self.blocked.get(),
            self.waiting.get(),
        )
    }

    pub(crate) fn spawn(&self, body: Body) -> Result<Coroutine> {
        let stack = Stack::new(self.config.stack_size)?;
        let record = Rc::new(Record::new(body));

        // The table keeps the record alive until the coroutine is DEAD.
        let arg = Rc::as_ptr(&record) as *mut c_void;
        unsafe { *record.context.get() = Context::prepare(&stack, coroutine::entry, arg) };

        let stack_size = stack.size();
        record.stack.set(Some(stack));
        record.handles.set(1);

        let id = CoroutineId(self.coroutines.borrow_mut().insert(record));
        self.queues().ready.push_back(id);

        tracing::trace!(%id, stack_size, "spawned");

        Ok(Coroutine::from_counted(self.downgrade(), id))
    }

    pub(crate) fn current_handle(&self) -> Coroutine {
        let (id, record) = self.running();
        record.handles.set(record.handles.get() + 1);

        Coroutine::from_counted(self.downgrade(), id)
    }

    pub(crate) fn current_wake_handle(&self) -> WakeHandle {
        let (id, _) = self.running();

        WakeHandle {
            hub: self.downgrade(),
            id,
        }
    }

    pub(crate) fn retain(&self, id: CoroutineId) {
        if let Some(record) = self.record(id) {
            record.handles.set(record.handles.get() + 1);
        }
    }

    /// Drops one handle; the last one decides the coroutine's fate.
    pub(crate) fn release(&self, id: CoroutineId) {
        let Some(record) = self.record(id) else {
            return;
        };

        let handles = record.handles.get().saturating_sub(1);
        record.handles.set(handles);

        if handles > 0 || record.detached.get() {
            return;
        }

        match record.status.get() {
            Status::Dead => {
                let removed = self.coroutines.borrow_mut().remove(id.0);
                drop(removed);
            }
            Status::Runnable => {
                tracing::debug!(%id, "last handle dropped, cancelling");
                record.status.set(Status::Deleted);
            }
            // NEW still gets its first run; BLOCKED and WAITING stay pinned
            // until woken, then the orphan check in `quiesce` applies.
            _ => {}
        }
    }

    /// Switches from the hub to coroutine `id` until it suspends or exits.
    fn resume(&self, id: CoroutineId, record: &Record) {
        match record.status.get() {
            Status::New | Status::Runnable | Status::Blocked | Status::Waiting => {
                record.status.set(Status::Running)
            }
            Status::Deleted => {}
            Status::Running => fatal!("coroutine {id} resumed while already running"),
            Status::Dead => fatal!("coroutine {id} resumed after it died"),
        }

        if let Some(other) = self.current.replace(Some(id)) {
            fatal!("coroutine {id} resumed from inside coroutine {other}");
        }

        tracing::trace!(%id, "resume");
        unsafe { switch(self.main.get(), record.context.get()) };

        self.current.set(None);
    }

    /// Parks the running coroutine as `next` and returns to the hub.
    ///
    /// Returns `Err(Cancelled)` without switching if the coroutine is
    /// already DELETED, and after being resumed for teardown.
    pub(crate) fn suspend(&self, next: Status) -> Result<()> {
        let (id, record) = self.running();

        match record.status.get() {
            Status::Running => record.status.set(next),
            Status::Deleted => return Err(Error::Cancelled),
            other => fatal!("coroutine {id} suspended while {other}"),
        }

        tracing::trace!(%id, status = %next, "suspend");
        unsafe { switch(record.context.get(), self.main.get()) };

        match record.status.get() {
            Status::Running => Ok(()),
            Status::Deleted => Err(Error::Cancelled),
            other => fatal!("coroutine {id} came back {other}"),
        }
    }

    /// Final switch of a coroutine whose body has returned.
    pub(crate) fn exit(&self, record: &Record) -> ! {
        match record.status.get() {
            Status::Running | Status::Deleted => record.status.set(Status::Dead),
            other => fatal!("coroutine exited while {other}"),
        }

        unsafe { switch(record.context.get(), self.main.get()) };
        fatal!("dead coroutine was resumed");
    }

    /// Waits as WAITING, optionally with a timer armed for this wait only.
    pub(crate) fn wait_current(&self, deadline: Option<Time>) -> Result<()> {
        let (id, record) = self.running();

        if record.status.get() == Status::Deleted {
            return Err(Error::Cancelled);
        }

        let epoch = record.epoch.get().wrapping_add(1);
        record.epoch.set(epoch);

        if let Some(deadline) = deadline {
            self.queues().push_timer(deadline, id, Some(epoch));
        }

        self.suspend(Status::Waiting)
    }

    pub(crate) fn sleep_until(&self, deadline: Time) -> Result<()> {
        loop {
            self.wait_current(Some(deadline))?;

            if Time::now() >= deadline {
                return Ok(());
            }
        }
    }

    fn make_runnable(&self, id: CoroutineId, record: &Record) {
        match record.status.get() {
            Status::Blocked => self.blocked.set(self.blocked.get().saturating_sub(1)),
            Status::Waiting => self.waiting.set(self.waiting.get().saturating_sub(1)),
            other => fatal!("coroutine {id} made runnable while {other}"),
        }

        record.status.set(Status::Runnable);
        self.queues().ready.push_back(id);
    }

    /// BLOCKED → RUNNABLE. Anything but BLOCKED is fatal.
    pub(crate) fn unblock(&self, id: CoroutineId) {
        let Some(record) = self.record(id) else {
            return;
        };

        match record.status.get() {
            Status::Blocked => self.make_runnable(id, &record),
            other => fatal!("unblock of coroutine {id} while {other}"),
        }
    }

    /// WAITING → RUNNABLE. Already woken or finished coroutines are left
    /// alone, so batched wakeups collapse into one.
    pub(crate) fn notify(&self, id: CoroutineId) {
        let Some(record) = self.record(id) else {
            return;
        };

        match record.status.get() {
            Status::Waiting => self.make_runnable(id, &record),
            Status::Runnable | Status::Deleted | Status::Dead => {}
            other => fatal!("notify of coroutine {id} while {other}"),
        }
    }

    /// Unblocks `id` only if it is still BLOCKED.
    fn wake_blocked(&self, id: CoroutineId) {
        if let Some(record) = self.record(id)
            && record.status.get() == Status::Blocked
        {
            self.make_runnable(id, &record);
        }
    }

    fn expire(&self, timeout: Timeout) {
        let Some(record) = self.record(timeout.coroutine) else {
            return;
        };

        if timeout.epoch.is_some_and(|epoch| epoch != record.epoch.get()) {
            return;
        }

        if record.status.get() == Status::Waiting {
            self.make_runnable(timeout.coroutine, &record);
        }
    }

    /// Applies posted unblocks, then wakes every coroutine whose timer is
    /// due at `now`, in deadline order.
    fn fire_timers(&self, now: Time) {
        let posted = mem::take(&mut self.queues().posted);
        for id in posted {
            self.wake_blocked(id);
        }

        loop {
            let Some(timeout) = self.queues().pop_expired(now) else {
                break;
            };

            self.expire(timeout);
        }
    }

    /// Resumes every coroutine that is ready now, once, in FIFO order.
    ///
    /// Coroutines made ready during the pass run on the next one.
    pub(crate) fn quiesce(&self) {
        let batch = mem::take(&mut self.queues().ready);

        for id in batch {
            let Some(record) = self.record(id) else {
                continue;
            };

            if record.status.get() == Status::Runnable && record.is_orphaned() {
                tracing::debug!(%id, "orphaned coroutine, cancelling");
                record.status.set(Status::Deleted);
            }

            self.resume(id, &record);

            match record.status.get() {
                Status::Dead => self.reap(id, &record),
                Status::Runnable => self.queues().ready.push_back(id),
                Status::Blocked => self.blocked.set(self.blocked.get() + 1),
                Status::Waiting => self.waiting.set(self.waiting.get() + 1),
                other => fatal!("coroutine {id} returned to the hub while {other}"),
            }
        }
    }

    /// Releases a dead coroutine's stack, and its record if unreferenced.
    fn reap(&self, id: CoroutineId, record: &Record) {
        drop(record.stack.take());
        tracing::trace!(%id, "finished");

        if record.handles.get() == 0 {
            let removed = self.coroutines.borrow_mut().remove(id.0);
            drop(removed);
        }
    }

    fn is_idle(&self) -> bool {
        let queues = self.queues();

        queues.ready.is_empty()
            && queues.timers.is_empty()
            && queues.posted.is_empty()
            && queues.remotes == 0
            && self.blocked.get() == 0
    }

    /// How long the poller may block.
    fn poll_timeout(&self, stop_at: Option<Time>) -> Option<Duration> {
        let queues = self.queues();

        if !queues.ready.is_empty() || !queues.posted.is_empty() {
            return Some(Duration::ZERO);
        }

        let deadline = match (queues.next_deadline(), stop_at) {
            (Some(timer), Some(stop)) => Some(timer.min(stop)),
            (timer, stop) => timer.or(stop),
        };

        deadline.map(|deadline| (deadline - Time::now()).to_duration())
    }

    fn poll(&self, stop_at: Option<Time>) -> Result<()> {
        let timeout = self.poll_timeout(stop_at);
        let mut events = self.events.borrow_mut();

        self.poller.borrow_mut().poll(&mut events, timeout)?;

        for readiness in events.iter() {
            self.dispatch(readiness);
        }

        Ok(())
    }

    fn dispatch(&self, readiness: &Readiness) {
        let (reader, writer) = {
            let mut sources = self.sources.borrow_mut();
            let Some(source) = sources.get_mut(Key::from_bits(readiness.token)) else {
                return;
            };

            (
                readiness.readable.then(|| source.reader.take()).flatten(),
                readiness.writable.then(|| source.writer.take()).flatten(),
            )
        };

        for id in [reader, writer].into_iter().flatten() {
            self.wake_blocked(id);
        }
    }

    /// Runs the loop until `done` holds, `stop_at` passes, or the hub is
    /// idle.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a coroutine.
    pub(crate) fn drive(&self, stop_at: Option<Time>, done: &dyn Fn() -> bool) -> Result<Stop> {
        assert_not_in_coroutine("a hub cannot be driven from inside a coroutine");

        context::enter(self, || {
            loop {
                if done() {
                    return Ok(Stop::Done);
                }

                let now = Time::now();
                if stop_at.is_some_and(|end| now >= end) {
                    return Ok(Stop::Elapsed);
                }

                self.fire_timers(now);
                self.quiesce();

                if done() {
                    return Ok(Stop::Done);
                }

                if self.is_idle() {
                    self.report_stalled();
                    return Ok(Stop::Idle);
                }

                self.poll(stop_at)?;
            }
        })
    }

    /// One [`quiesce`](Self::quiesce) pass with this hub installed.
    pub(crate) fn quiesce_once(&self) {
        assert_not_in_coroutine("a hub cannot be driven from inside a coroutine");
        context::enter(self, || self.quiesce());
    }

    fn report_stalled(&self) {
        let waiting = self.waiting.get();

        if waiting > 0 {
            tracing::warn!(
                waiting,
                "hub is idle but coroutines are still waiting on events nothing can notify"
            );
        }
    }

    pub(crate) fn register_io(&self, fd: RawFd) -> Result<Key> {
        let token = self.sources.borrow_mut().insert(Source {
            fd,
            reader: None,
            writer: None,
        });

        if let Err(err) = self
            .poller
            .borrow()
            .register(fd, token.to_bits(), Interest::BOTH)
        {
            self.sources.borrow_mut().remove(token);
            return Err(err.into());
        }

        tracing::trace!(fd, ?token, "registered descriptor");
        Ok(token)
    }

    pub(crate) fn deregister_io(&self, token: Key) {
        let removed = self.sources.borrow_mut().remove(token);

        if let Some(source) = removed {
            self.poller.borrow().deregister(source.fd);
            tracing::trace!(fd = source.fd, ?token, "deregistered descriptor");
        }
    }

    /// Parks the running coroutine on one direction of a descriptor.
    pub(crate) fn wait_io(&self, token: Key, interest: Interest) -> Result<()> {
        let (id, _) = self.running();

        {
            let mut sources = self.sources.borrow_mut();
            let Some(source) = sources.get_mut(token) else {
                return Err(io::Error::from(io::ErrorKind::NotConnected).into());
            };

            let slot = if interest.read {
                &mut source.reader
            } else {
                &mut source.writer
            };

            if slot.is_some_and(|other| other != id) {
                return Err(io::Error::new(
                    io::ErrorKind::ResourceBusy,
                    "another coroutine is already waiting on this descriptor",
                )
                .into());
            }

            *slot = Some(id);
        }

        let result = self.suspend(Status::Blocked);

        if let Some(source) = self.sources.borrow_mut().get_mut(token) {
            let slot = if interest.read {
                &mut source.reader
            } else {
                &mut source.writer
            };

            if *slot == Some(id) {
                *slot = None;
            }
        }

        result
    }

    /// Unwinds every started coroutine and drops never-started bodies.
    ///
    /// Repeats until a pass resumes nothing, since unwinding code may
    /// wake or spawn other coroutines.
    pub(crate) fn teardown(&self) {
        if context::try_with(|core| core.running_id().is_some()) == Some(true) {
            tracing::warn!("hub dropped from inside a coroutine, leaving its coroutines suspended");
            return;
        }

        context::enter(self, || {
            loop {
                let keys: Vec<Key> = self.coroutines.borrow().keys().collect();
                let mut resumed = false;

                for key in keys {
                    let id = CoroutineId(key);
                    let Some(record) = self.record(id) else {
                        continue;
                    };

                    match record.status.get() {
                        Status::New => drop(record.body.take()),
                        Status::Runnable | Status::Blocked | Status::Waiting | Status::Deleted => {
                            tracing::debug!(%id, "unwinding coroutine at hub teardown");
                            record.status.set(Status::Deleted);
                            self.resume(id, &record);

                            match record.status.get() {
                                Status::Dead => self.reap(id, &record),
                                other => fatal!("coroutine {id} survived teardown as {other}"),
                            }

                            resumed = true;
                        }
                        Status::Running | Status::Dead => {}
                    }
                }

                if !resumed {
                    break;
                }
            }
        });
    }
}

impl Drop for HubCore {
    fn drop(&mut self) {
        self.queues().closed = true;
    }
}

fn assert_not_in_coroutine(message: &str) {
    if context::try_with(|core| core.running_id().is_some()) == Some(true) {
        panic!("{message}");
    }
}
