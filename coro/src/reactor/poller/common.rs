use std::os::fd::RawFd;

/// Which readiness a descriptor is registered for, or which one a
/// coroutine waits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub(crate) const WRITE: Interest = Interest {
        read: false,
        write: true,
    };

    pub(crate) const BOTH: Interest = Interest {
        read: true,
        write: true,
    };
}

/// Interrupts a blocking poll from any thread.
///
/// Wraps the poller's wake descriptor: an `eventfd` on Linux, the kqueue
/// itself (with a user event) on macOS.
#[derive(Debug)]
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
