use super::stream::TcpStream;
use crate::error::Result;
use crate::hub::IoSource;
use crate::net::{Listener, each_addr};
use crate::reactor::Interest;
use crate::reactor::poller::platform::{
    domain_of, sys_accept, sys_bind, sys_close, sys_ipv6_is_necessary, sys_listen,
    sys_set_reuseaddr, sys_socket, sys_sockname,
};

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};

/// Backlog used by [`TcpListener::bind`].
const DEFAULT_BACKLOG: i32 = 128;

/// A TCP listening socket driven by the hub.
///
/// `accept` parks the calling coroutine until a client connects.
pub struct TcpListener {
    source: IoSource,
}

impl TcpListener {
    /// Binds a listener to `addr` with a backlog of 128.
    ///
    /// This function:
    /// - creates a non-blocking socket,
    /// - enables `SO_REUSEADDR`,
    /// - configures IPv6 dual-stack if applicable,
    /// - binds and starts listening.
    ///
    /// Bind to port 0 to let the system pick one; see
    /// [`local_addr`](Self::local_addr).
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::bind_with_backlog(addr, DEFAULT_BACKLOG)
    }

    /// Binds a listener to `addr` with an explicit `listen(2)` backlog.
    pub fn bind_with_backlog<A: ToSocketAddrs>(addr: A, backlog: i32) -> Result<Self> {
        each_addr(addr, |addr| Self::bind_addr(addr, backlog))
    }

    fn bind_addr(addr: &SocketAddr, backlog: i32) -> Result<Self> {
        let domain = domain_of(addr);
        let fd = sys_socket(domain)?;

        let setup = sys_set_reuseaddr(fd)
            .and_then(|()| sys_ipv6_is_necessary(fd, domain))
            .and_then(|()| sys_bind(fd, addr))
            .and_then(|()| sys_listen(fd, backlog));

        if let Err(e) = setup {
            sys_close(fd);
            return Err(e.into());
        }

        Ok(Self {
            source: IoSource::register(fd)?,
        })
    }

    /// Waits for an incoming connection.
    ///
    /// Returns the connected stream and the peer address.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        loop {
            match sys_accept(self.source.fd()) {
                Ok((fd, addr)) => return Ok((TcpStream::from_raw(fd)?, addr)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.source.wait(Interest::READ)?
                }
                Err(e) if matches!(e.raw_os_error(), Some(libc::EINTR | libc::ECONNABORTED)) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns the local socket address of this listener.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(sys_sockname(self.source.fd())?)
    }
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

impl AsRawFd for TcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.source.fd()
    }
}

impl std::fmt::Debug for TcpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpListener")
            .field("fd", &self.source.fd())
            .finish()
    }
}
