//! macOS `kqueue`-based poller implementation.
//!
//! Same interface as the Linux `epoll` backend. Descriptors get one
//! `EV_CLEAR` (edge-triggered) filter per direction, and cross-thread
//! wake-ups use an `EVFILT_USER` event on the kqueue itself, so no extra
//! descriptor is needed.
//!
//! This backend is selected automatically on macOS targets.

use super::common::Interest;
use crate::reactor::Readiness;
use crate::reactor::poller::Waker;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_USER, EVFILT_WRITE,
    NOTE_TRIGGER, kevent, kqueue, timespec,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

/// Identifier of the user event used for wake-ups.
const WAKE_IDENT: usize = usize::MAX;

fn change(ident: usize, filter: i16, flags: u16, fflags: u32, token: u64) -> kevent {
    kevent {
        ident,
        filter,
        flags,
        fflags,
        data: 0,
        udata: token as usize as *mut _,
    }
}

fn apply(kq: RawFd, changes: &[kevent]) -> io::Result<()> {
    let rc = unsafe {
        kevent(
            kq,
            changes.as_ptr(),
            changes.len() as i32,
            ptr::null_mut(),
            0,
            ptr::null(),
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// macOS `kqueue` poller.
pub(crate) struct KqueuePoller {
    kq: RawFd,

    /// Reusable buffer for kernel events.
    events: Vec<kevent>,

    /// Waker triggering the user event on `kq`.
    waker: Arc<Waker>,
}

impl Waker {
    /// Wakes the poller by triggering its user event.
    pub(crate) fn wake(&self) {
        let trigger = change(WAKE_IDENT, EVFILT_USER, 0, NOTE_TRIGGER, 0);
        let _ = apply(self.0, &[trigger]);
    }
}

impl KqueuePoller {
    /// Creates a new `KqueuePoller` delivering up to `capacity` events per
    /// wait.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let kq = unsafe { kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        unsafe { libc::fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC) };

        let user = change(WAKE_IDENT, EVFILT_USER, EV_ADD | EV_CLEAR, 0, 0);
        if let Err(err) = apply(kq, &[user]) {
            unsafe { libc::close(kq) };
            return Err(err);
        }

        Ok(Self {
            kq,
            events: vec![change(0, 0, 0, 0, 0); capacity.max(1)],
            waker: Arc::new(Waker(kq)),
        })
    }

    /// Returns the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Registers a file descriptor, edge-triggered.
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let mut changes = Vec::with_capacity(2);

        if interest.read {
            changes.push(change(fd as usize, EVFILT_READ, EV_ADD | EV_CLEAR, 0, token));
        }
        if interest.write {
            changes.push(change(fd as usize, EVFILT_WRITE, EV_ADD | EV_CLEAR, 0, token));
        }

        apply(self.kq, &changes)
    }

    /// Removes a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        // Either filter may be missing; deleting them one at a time keeps
        // one failure from hiding the other.
        for filter in [EVFILT_READ, EVFILT_WRITE] {
            let _ = apply(self.kq, &[change(fd as usize, filter, EV_DELETE, 0, 0)]);
        }
    }

    /// Polls for readiness events.
    ///
    /// Blocks until a descriptor is ready, the waker fires, or the
    /// optional timeout expires. An interrupted wait returns with no
    /// events.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Readiness>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        let ts = timeout.map(|t| timespec {
            tv_sec: t.as_secs().min(i64::MAX as u64) as _,
            tv_nsec: t.subsec_nanos() as _,
        });
        let ts_ptr = ts.as_ref().map_or(ptr::null(), |ts| ts as *const timespec);

        let n = unsafe {
            kevent(
                self.kq,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                ts_ptr,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for ev in &self.events[..n as usize] {
            if ev.filter == EVFILT_USER {
                continue;
            }

            let token = ev.udata as usize as u64;
            let failed = ev.flags & (EV_ERROR | EV_EOF) != 0;
            let readable = ev.filter == EVFILT_READ || failed;
            let writable = ev.filter == EVFILT_WRITE || failed;

            if let Some(e) = events.iter_mut().find(|e| e.token == token) {
                e.readable |= readable;
                e.writable |= writable;
            } else {
                events.push(Readiness {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}
