//! Error types for the coro runtime.

use std::io;

/// Errors surfaced by coroutine operations.
///
/// Scheduler invariant violations are not represented here; they end the
/// process through the `fatal!` macro.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The running coroutine was torn down while suspended.
    ///
    /// Returned by every suspension point once the coroutine has lost its
    /// last owner. Propagate it with `?`; the coroutine's entry wrapper
    /// treats it as a normal exit.
    #[error("coroutine cancelled")]
    Cancelled,

    /// The peer closed the stream before the requested bytes moved.
    #[error("connection closed by peer")]
    PeerClosed,

    /// The coroutine passed to `block_on` can never be resumed again.
    #[error("no coroutine can make progress")]
    Deadlock,

    /// An operating system call failed.
    #[error("system error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for coro operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` for the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the raw OS error code, if this error carries one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

/// Terminates the process after a broken scheduler invariant.
///
/// A wrong state transition means the scheduling state can no longer be
/// trusted, so there is nothing to unwind to.
#[cold]
#[track_caller]
pub(crate) fn abort_with(message: std::fmt::Arguments<'_>) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(%location, "fatal: {message}");
    eprintln!("coro: fatal: {message} at {location}");
    std::process::abort()
}

/// Calls [`abort_with`] with a formatted message.
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::abort_with(format_args!($($arg)*))
    };
}

pub(crate) use fatal;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_os_code() {
        let err: Error = io::Error::from_raw_os_error(libc::ECONNREFUSED).into();

        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
        assert!(err.to_string().starts_with("system error:"));
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::PeerClosed.is_cancelled());
        assert_eq!(Error::PeerClosed.raw_os_error(), None);
    }
}
