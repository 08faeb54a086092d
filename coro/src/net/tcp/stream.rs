use crate::error::Result;
use crate::hub::IoSource;
use crate::net::{Stream, each_addr};
use crate::reactor::Interest;
use crate::reactor::poller::platform::{
    domain_of, sys_close, sys_connect, sys_ipv6_is_necessary, sys_peername, sys_recv, sys_send,
    sys_set_nodelay, sys_shutdown, sys_socket, sys_sockname, sys_take_error,
};

use std::io;
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};

/// A TCP connection driven by the hub.
///
/// `TcpStream` is a non-blocking socket registered with the poller of the
/// hub that created it, and must be used by coroutines of that hub. Reads
/// and writes park only the calling coroutine.
///
/// At most one coroutine may wait to read, and one to write, at a time.
pub struct TcpStream {
    source: IoSource,
}

impl TcpStream {
    /// Wraps a connected, non-blocking socket and registers it.
    pub(crate) fn from_raw(fd: RawFd) -> Result<Self> {
        Ok(Self {
            source: IoSource::register(fd)?,
        })
    }

    /// Opens a connection to `addr`.
    ///
    /// Every address `addr` resolves to is tried in turn. The calling
    /// coroutine is parked while the handshake is in progress.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let stream = TcpStream::connect("127.0.0.1:8080")?;
    /// stream.write_all(b"ping")?;
    /// ```
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        each_addr(addr, Self::connect_addr)
    }

    fn connect_addr(addr: &SocketAddr) -> Result<Self> {
        let domain = domain_of(addr);
        let fd = sys_socket(domain)?;

        let started = sys_ipv6_is_necessary(fd, domain).and_then(|()| match sys_connect(fd, addr) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINPROGRESS | libc::EINTR)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        });

        let connected = match started {
            Ok(connected) => connected,
            Err(e) => {
                sys_close(fd);
                return Err(e.into());
            }
        };

        // Registered only once the handshake is under way, so the first
        // writable edge is the one that completes it.
        let stream = Self::from_raw(fd)?;
        if connected {
            return Ok(stream);
        }

        loop {
            stream.source.wait(Interest::WRITE)?;

            if let Some(err) = sys_take_error(fd)? {
                return Err(err.into());
            }

            match sys_peername(fd) {
                Ok(_) => return Ok(stream),
                Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads at most `buf.len()` bytes; `Ok(0)` means the peer closed its
    /// side.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match sys_recv(self.source.fd(), buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.source.wait(Interest::READ)?
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Writes at most `buf.len()` bytes, returning how many were sent.
    ///
    /// Writing to a connection the peer has closed fails with `EPIPE`
    /// rather than raising `SIGPIPE`.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        loop {
            match sys_send(self.source.fd(), buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.source.wait(Interest::WRITE)?
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Shuts down the read, write, or both halves of this connection.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        Ok(sys_shutdown(self.source.fd(), how)?)
    }

    /// Returns the local address of this connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(sys_sockname(self.source.fd())?)
    }

    /// Returns the remote address of this connection.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(sys_peername(self.source.fd())?)
    }

    /// Enables or disables Nagle's algorithm (`TCP_NODELAY`).
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Ok(sys_set_nodelay(self.source.fd(), nodelay)?)
    }
}

impl Stream for TcpStream {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        TcpStream::read(self, buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        TcpStream::write(self, buf)
    }

    fn shutdown(&self, how: Shutdown) -> Result<()> {
        TcpStream::shutdown(self, how)
    }
}

impl AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.source.fd()
    }
}

impl std::fmt::Debug for TcpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpStream")
            .field("fd", &self.source.fd())
            .finish()
    }
}
