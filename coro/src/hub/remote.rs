use super::timer::Queues;
use crate::coroutine::CoroutineId;
use crate::reactor::Waker;
use crate::time::Time;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A thread-safe handle for waking coroutines of one hub from elsewhere.
///
/// Requests are queued under the hub's single lock and the hub's poller
/// is interrupted; the hub applies them on its next loop iteration. While
/// any `Remote` exists, [`Hub::run`](crate::Hub::run) does not treat the
/// hub as idle. Requests made after the hub is gone are dropped.
///
/// # Examples
///
/// ```rust,ignore
/// let remote = hub.remote();
/// let id = hub.spawn(|| coro::block()).id();
///
/// std::thread::spawn(move || remote.unblock(id));
/// hub.run()?;
/// ```
pub struct Remote {
    queues: Arc<Mutex<Queues>>,
    waker: Arc<Waker>,
}

impl Remote {
    pub(crate) fn new(queues: Arc<Mutex<Queues>>, waker: Arc<Waker>) -> Self {
        lock(&queues).remotes += 1;
        Self { queues, waker }
    }

    /// Moves a BLOCKED coroutine back to the ready queue.
    ///
    /// Ignored if, by the time the hub applies it, the coroutine is gone
    /// or not BLOCKED.
    pub fn unblock(&self, id: CoroutineId) {
        let mut queues = lock(&self.queues);
        queues.posted.push(id);
        self.wake(&queues);
    }

    /// Interrupts the poller, unless the hub is gone. Called with the lock
    /// held so the hub cannot close its poller in between.
    fn wake(&self, queues: &Queues) {
        if !queues.closed {
            self.waker.wake();
        }
    }

    /// Wakes a WAITING coroutine at `deadline`, whatever it waits on.
    pub fn wake_at(&self, id: CoroutineId, deadline: Time) {
        let mut queues = lock(&self.queues);
        queues.push_timer(deadline, id, None);
        self.wake(&queues);
    }
}

impl Clone for Remote {
    fn clone(&self) -> Self {
        Self::new(self.queues.clone(), self.waker.clone())
    }
}

impl Drop for Remote {
    /// Wakes the hub so a loop kept alive only by this handle can notice
    /// it is idle.
    fn drop(&mut self) {
        let mut queues = lock(&self.queues);
        queues.remotes -= 1;
        self.wake(&queues);
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote").finish_non_exhaustive()
    }
}

fn lock(queues: &Mutex<Queues>) -> MutexGuard<'_, Queues> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}
