use super::Time;
use crate::coroutine::Coroutine;
use crate::error::Result;
use crate::hub::{self, context};

use std::time::Duration;

/// Suspends the running coroutine for at least `duration`.
///
/// A zero duration still gives up the processor once. Never returns
/// early: an unrelated wake-up before the deadline re-arms the wait.
///
/// # Panics
///
/// Panics outside of a coroutine.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// coro::sleep(Duration::from_millis(10))?;
/// ```
pub fn sleep(duration: Duration) -> Result<()> {
    sleep_until(Time::deadline_after(duration))
}

/// Suspends the running coroutine until the monotonic clock reaches
/// `deadline`.
///
/// # Panics
///
/// Panics outside of a coroutine.
pub fn sleep_until(deadline: Time) -> Result<()> {
    context::with(|core| core.sleep_until(deadline))
}

/// Spawns a coroutine calling `f` every `period`.
///
/// The first call happens one period after the coroutine starts. The
/// timer keeps firing while its handle is alive; once the handle is
/// dropped it stops at its next wake-up.
///
/// # Examples
///
/// ```rust,ignore
/// let ticker = coro::timer(Duration::from_millis(100), || println!("tick"));
/// coro::sleep(Duration::from_millis(350))?;
/// drop(ticker);
/// ```
pub fn timer<F>(period: Duration, mut f: F) -> Coroutine
where
    F: FnMut() + 'static,
{
    hub::start(move || {
        loop {
            sleep(period)?;
            f();
        }
    })
}
