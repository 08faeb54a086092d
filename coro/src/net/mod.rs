//! Networking on top of the hub's readiness poller.
//!
//! Sockets are non-blocking and registered with the poller when created.
//! An operation makes exactly one attempt; if it would block, the calling
//! coroutine is parked on the socket (BLOCKED) until the poller reports
//! readiness, then retries. Other coroutines run meanwhile.
//!
//! [`Stream`] and [`Listener`] are the capability interfaces code is
//! written against; plain TCP is the provided implementation.

mod tcp;

pub use tcp::listener::TcpListener;
pub use tcp::stream::TcpStream;

use crate::error::{Error, Result};

use std::io;
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};

/// A bidirectional byte stream.
pub trait Stream {
    /// Reads at most `buf.len()` bytes; `Ok(0)` means end of stream.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes at most `buf.len()` bytes, returning how many were taken.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Shuts down one or both directions.
    fn shutdown(&self, how: Shutdown) -> Result<()>;

    /// Fills `buf` completely.
    ///
    /// # Errors
    ///
    /// [`Error::PeerClosed`] if the stream ends first.
    fn read_all(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Err(Error::PeerClosed),
                n => filled += n,
            }
        }

        Ok(())
    }

    /// Writes all of `buf`.
    ///
    /// # Errors
    ///
    /// [`Error::PeerClosed`] if a write makes no progress.
    fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < buf.len() {
            match self.write(&buf[written..])? {
                0 => return Err(Error::PeerClosed),
                n => written += n,
            }
        }

        Ok(())
    }
}

/// A source of incoming streams.
pub trait Listener {
    type Stream: Stream;

    /// Waits for the next connection.
    fn accept(&self) -> Result<(Self::Stream, SocketAddr)>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Tries `f` on every address `addr` resolves to, returning the first
/// success or the last error.
fn each_addr<A, T>(addr: A, mut f: impl FnMut(&SocketAddr) -> Result<T>) -> Result<T>
where
    A: ToSocketAddrs,
{
    let mut last = None;

    for addr in addr.to_socket_addrs()? {
        match f(&addr) {
            Ok(value) => return Ok(value),
            Err(err) => last = Some(err),
        }
    }

    Err(last.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )
        .into()
    }))
}
