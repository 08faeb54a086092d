//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register descriptors edge-triggered for read and write readiness
//! - Block waiting for readiness, bounded by the hub's next timer
//! - Let other threads interrupt the wait through an `eventfd`
//!
//! This backend is selected automatically on Linux targets.

use super::common::Interest;
use crate::reactor::Readiness;
use crate::reactor::poller::Waker;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token used internally for the wake-up event.
///
/// Registry tokens are packed slab keys; `u64::MAX` would need both a
/// `u32::MAX` index and generation, which the registry never reaches.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal,
/// - a reusable event buffer.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Waker wrapping the internal eventfd.
    waker: Arc<Waker>,
}

impl Waker {
    /// Wakes the poller.
    ///
    /// Writes to the internal `eventfd`, causing `epoll_wait` to return
    /// immediately. Wakes before the next wait are not lost: the counter
    /// stays readable until drained.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const u64 as *const _, 8);
        }
    }
}

impl EpollPoller {
    /// Creates a new `EpollPoller` delivering up to `capacity` events per
    /// wait.
    ///
    /// This:
    /// - creates the epoll instance,
    /// - creates a non-blocking `eventfd`,
    /// - registers the eventfd into epoll as a persistent wake source.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        if unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) } < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(eventfd);
                libc::close(epoll);
            }
            return Err(err);
        }

        Ok(Self {
            epoll,
            events: vec![epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            waker: Arc::new(Waker(eventfd)),
        })
    }

    /// Returns the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Registers a file descriptor, edge-triggered.
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let mut flags = EPOLLET | EPOLLRDHUP;

        if interest.read {
            flags |= EPOLLIN;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: token,
        };

        if unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Removes a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Polls for readiness events.
    ///
    /// Blocks until:
    /// - at least one file descriptor becomes ready,
    /// - the wake event is triggered,
    /// - or the optional timeout expires.
    ///
    /// Timeouts are rounded up to whole milliseconds so that a wait for a
    /// timer never returns before the timer is due. An interrupted wait
    /// returns with no events.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Readiness>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        let timeout_ms = timeout
            .map(|t| t.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
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
            let flags = ev.events;
            let token = ev.u64;

            if token == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut buf as *mut u64 as *mut _, 8);
                }
                continue;
            }

            let readable = flags & ((EPOLLIN | EPOLLERR | EPOLLHUP | EPOLLRDHUP) as u32) != 0;
            let writable = flags & ((EPOLLOUT | EPOLLERR | EPOLLHUP) as u32) != 0;

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

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.waker.0);
            libc::close(self.epoll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    #[test]
    fn wake_interrupts_an_indefinite_wait() {
        let mut poller = EpollPoller::new(8).unwrap();
        let waker = poller.waker();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            waker.wake();
        });

        let mut events = Vec::new();
        poller.poll(&mut events, None).unwrap();
        handle.join().unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn timeout_is_not_cut_short() {
        let mut poller = EpollPoller::new(8).unwrap();
        let mut events = Vec::new();

        let start = Instant::now();
        poller
            .poll(&mut events, Some(Duration::from_micros(1500)))
            .unwrap();

        assert!(start.elapsed() >= Duration::from_micros(1500));
    }

    #[test]
    fn pipe_readiness_is_reported_with_its_token() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK) }, 0);

        let mut poller = EpollPoller::new(8).unwrap();
        poller.register(fds[0], 42, Interest::READ).unwrap();

        unsafe { libc::write(fds[1], b"x".as_ptr() as *const _, 1) };

        let mut events = Vec::new();
        poller
            .poll(&mut events, Some(Duration::from_secs(1)))
            .unwrap();

        assert_eq!(
            events,
            [Readiness {
                token: 42,
                readable: true,
                writable: false
            }]
        );

        poller.deregister(fds[0]);
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
