use super::{Event, WaitToken};
use crate::error::Result;
use crate::hub::context;

use std::fmt;
use std::mem;

struct Registration<'a> {
    event: &'a Event,
    token: WaitToken,
    callback: Box<dyn FnOnce() + 'a>,
}

/// Waits on several events at once.
///
/// Each [`on`](Selector::on) registers the running coroutine with an event
/// right away. [`wait`](Selector::wait) suspends once; when the coroutine
/// wakes, registrations that were consumed by a notification have their
/// callbacks run, in registration order, and the rest are withdrawn so no
/// later notification reaches this coroutine through them.
///
/// Dropping a selector without calling `wait` withdraws its registrations
/// without suspending and runs no callback. If the coroutine is cancelled
/// during `wait`, registrations are withdrawn, no callback runs and `wait`
/// returns [`Error::Cancelled`](crate::Error::Cancelled).
///
/// # Examples
///
/// ```rust,ignore
/// Selector::new()
///     .on(&data_ready, || println!("data"))
///     .on(&shutdown, || println!("shutdown"))
///     .wait()?;
/// ```
#[must_use = "a selector does nothing until `wait` is called"]
pub struct Selector<'a> {
    registrations: Vec<Registration<'a>>,
}

impl<'a> Selector<'a> {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Registers interest in `event`, running `callback` if it fires.
    ///
    /// # Panics
    ///
    /// Panics outside of a coroutine.
    pub fn on(mut self, event: &'a Event, callback: impl FnOnce() + 'a) -> Self {
        let token = context::with(|core| event.register(core.current_wake_handle()));

        self.registrations.push(Registration {
            event,
            token,
            callback: Box::new(callback),
        });

        self
    }

    /// Suspends until one of the events fires, then runs the callbacks of
    /// every event that fired.
    ///
    /// An empty selector returns immediately.
    pub fn wait(mut self) -> Result<()> {
        let registrations = mem::take(&mut self.registrations);

        if registrations.is_empty() {
            return Ok(());
        }

        let woken = context::with(|core| core.wait_current(None));

        // Withdraw everything still registered before running any callback.
        let mut fired = Vec::new();
        for registration in registrations {
            if !registration.event.cancel(registration.token) {
                fired.push(registration.callback);
            }
        }

        woken?;

        for callback in fired {
            callback();
        }

        Ok(())
    }

    fn withdraw(&mut self) {
        for registration in mem::take(&mut self.registrations) {
            registration.event.cancel(registration.token);
        }
    }
}

impl Default for Selector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Selector<'_> {
    fn drop(&mut self) {
        self.withdraw();
    }
}

impl fmt::Debug for Selector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}
