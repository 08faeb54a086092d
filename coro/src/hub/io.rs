use super::{HubCore, context};
use crate::coroutine::CoroutineId;
use crate::error::{Error, Result};
use crate::reactor::Interest;
use crate::reactor::poller::platform::sys_close;
use crate::utils::Key;

use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::rc::Weak;

/// Registry entry for one descriptor: who is parked on it.
pub(crate) struct Source {
    pub(crate) fd: RawFd,
    pub(crate) reader: Option<CoroutineId>,
    pub(crate) writer: Option<CoroutineId>,
}

/// A descriptor owned by a coroutine and registered with a hub's poller.
///
/// Registration happens once, for both directions, edge-triggered. The
/// descriptor is deregistered and closed on drop.
pub(crate) struct IoSource {
    fd: RawFd,
    token: Key,
    hub: Weak<HubCore>,
}

impl IoSource {
    /// Registers `fd` with the running hub, or the thread's default hub
    /// outside of one. Takes ownership of `fd`; it is closed on failure.
    pub(crate) fn register(fd: RawFd) -> Result<Self> {
        let hub = crate::hub::hub();
        let core = hub.core();

        match core.register_io(fd) {
            Ok(token) => Ok(Self {
                fd,
                token,
                hub: core.downgrade(),
            }),
            Err(err) => {
                sys_close(fd);
                Err(err)
            }
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Parks the running coroutine until the descriptor is ready for
    /// `interest` (exactly one direction).
    pub(crate) fn wait(&self, interest: Interest) -> Result<()> {
        context::with(|core| {
            if !ptr::eq(core, self.hub.as_ptr()) {
                return Err(Error::Io(io::Error::other(
                    "descriptor used outside of the hub it was registered with",
                )));
            }

            core.wait_io(self.token, interest)
        })
    }
}

impl Drop for IoSource {
    fn drop(&mut self) {
        if let Some(core) = self.hub.upgrade() {
            core.deregister_io(self.token);
        }

        sys_close(self.fd);
    }
}
