use crate::coroutine::CoroutineId;
use crate::time::Time;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// A scheduled wake-up of one coroutine.
///
/// Stored in a `BinaryHeap` ordered by deadline. Entries are never
/// removed early: a coroutine that stopped waiting bumps its wait epoch,
/// and the stale entry is discarded when it fires.
pub(crate) struct Timeout {
    /// When to wake the coroutine.
    pub(crate) deadline: Time,

    /// Registration order, breaks ties between equal deadlines.
    pub(crate) seq: u64,

    /// Coroutine to notify.
    pub(crate) coroutine: CoroutineId,

    /// Wait epoch the timeout was armed for; `None` wakes whatever wait
    /// the coroutine is in when it fires.
    pub(crate) epoch: Option<u64>,
}

impl Eq for Timeout {}

impl PartialEq for Timeout {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Timeout {
    /// Orders by deadline, then registration order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<Timeout>`
    /// pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Timeout {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scheduling queues shared with [`Remote`](crate::Remote) handles.
///
/// Everything another thread may touch lives here, behind the hub's one
/// mutex.
#[derive(Default)]
pub(crate) struct Queues {
    /// Coroutines to resume on the next pass, in FIFO order.
    pub(crate) ready: VecDeque<CoroutineId>,

    /// Pending timeouts.
    pub(crate) timers: BinaryHeap<Timeout>,

    /// Unblock requests posted from other threads.
    pub(crate) posted: Vec<CoroutineId>,

    /// Live [`Remote`](crate::Remote) handles.
    pub(crate) remotes: usize,

    /// Set once the hub is gone and its poller closed.
    pub(crate) closed: bool,

    next_seq: u64,
}

impl Queues {
    pub(crate) fn push_timer(&mut self, deadline: Time, coroutine: CoroutineId, epoch: Option<u64>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.timers.push(Timeout {
            deadline,
            seq,
            coroutine,
            epoch,
        });
    }

    /// Pops the earliest timeout if it is due at `now`.
    pub(crate) fn pop_expired(&mut self, now: Time) -> Option<Timeout> {
        if self.timers.peek()?.deadline <= now {
            self.timers.pop()
        } else {
            None
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Time> {
        self.timers.peek().map(|timeout| timeout.deadline)
    }
}
