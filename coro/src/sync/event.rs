use crate::error::Result;
use crate::hub::{WakeHandle, context};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;

/// Identifies one registration on one [`Event`].
///
/// Tokens come from a per-event counter and are never reused, so a token
/// is valid exactly while its registration is still in the waiter list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WaitToken(u64);

struct Waiter {
    wake: WakeHandle,
    token: WaitToken,
}

/// A condition coroutines can wait on.
///
/// [`notify_all`](Event::notify_all) wakes every coroutine waiting at that
/// moment, in the order they started waiting. A waiter is woken at most
/// once per wait: its registration is consumed by the notification.
///
/// # Examples
///
/// ```rust,ignore
/// let ready = Rc::new(Event::new());
/// let flag = Rc::new(Cell::new(false));
///
/// coro::start({
///     let (ready, flag) = (ready.clone(), flag.clone());
///     move || ready.wait_until(|| flag.get())
/// });
///
/// flag.set(true);
/// ready.notify_all();
/// ```
pub struct Event {
    waiters: RefCell<VecDeque<Waiter>>,
    next_token: Cell<u64>,
}

impl Event {
    pub const fn new() -> Self {
        Self {
            waiters: RefCell::new(VecDeque::new()),
            next_token: Cell::new(0),
        }
    }

    /// Suspends the running coroutine until the next notification.
    ///
    /// Returns `Err(Cancelled)` if the coroutine is torn down meanwhile.
    /// Spurious returns are possible (a [`Remote::wake_at`] aimed at this
    /// coroutine), so callers usually want [`wait_until`](Self::wait_until).
    ///
    /// [`Remote::wake_at`]: crate::Remote::wake_at
    ///
    /// # Panics
    ///
    /// Panics outside of a coroutine.
    pub fn wait(&self) -> Result<()> {
        context::with(|core| {
            let token = self.register(core.current_wake_handle());
            let result = core.wait_current(None);

            self.cancel(token);
            result
        })
    }

    /// Waits until `condition` holds, checking it before every wait.
    ///
    /// Returns immediately if it already holds.
    pub fn wait_until(&self, mut condition: impl FnMut() -> bool) -> Result<()> {
        while !condition() {
            self.wait()?;
        }

        Ok(())
    }

    /// Wakes every current waiter, oldest first.
    ///
    /// The waiter list is emptied before anyone is woken, so waits started
    /// as a consequence of this call wait for the next notification.
    pub fn notify_all(&self) {
        let waiters = mem::take(&mut *self.waiters.borrow_mut());

        for waiter in waiters {
            waiter.wake.notify();
        }
    }

    /// Number of registered waiters.
    pub fn waiters(&self) -> usize {
        self.waiters.borrow().len()
    }

    pub(crate) fn register(&self, wake: WakeHandle) -> WaitToken {
        let token = WaitToken(self.next_token.get());
        self.next_token.set(token.0 + 1);

        self.waiters.borrow_mut().push_back(Waiter { wake, token });
        token
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, token: WaitToken) -> bool {
        self.waiters.borrow().iter().any(|w| w.token == token)
    }

    /// Removes a registration; returns `false` if it was already consumed.
    pub(crate) fn cancel(&self, token: WaitToken) -> bool {
        let mut waiters = self.waiters.borrow_mut();

        match waiters.iter().position(|w| w.token == token) {
            Some(index) => {
                waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("waiters", &self.waiters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Hub;

    use std::rc::Rc;

    #[test]
    fn notify_wakes_in_wait_order() {
        let hub = Hub::new().unwrap();
        let event = Rc::new(Event::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        let waiters: Vec<_> = (0..3)
            .map(|n| {
                let (event, order) = (event.clone(), order.clone());
                hub.spawn(move || {
                    event.wait()?;
                    order.borrow_mut().push(n);
                    Ok(())
                })
            })
            .collect();

        hub.quiesce();
        assert_eq!(event.waiters(), 3);

        event.notify_all();
        assert_eq!(event.waiters(), 0);

        hub.run().unwrap();
        assert_eq!(*order.borrow(), [0, 1, 2]);
        assert!(waiters.iter().all(|co| co.is_dead()));
    }

    #[test]
    fn tokens_are_not_reused() {
        let hub = Hub::new().unwrap();
        let event = Rc::new(Event::new());

        hub.block_on({
            let event = event.clone();
            move || {
                let wake = context::with(|core| core.current_wake_handle());
                let first = event.register(wake.clone());
                assert!(event.cancel(first));
                assert!(!event.cancel(first));

                let second = event.register(wake);
                assert_ne!(first, second);
                assert!(event.is_registered(second));
                assert!(!event.is_registered(first));

                event.cancel(second);
                Ok(())
            }
        })
        .unwrap();

        assert_eq!(event.waiters(), 0);
    }

    #[test]
    fn notify_without_waiters_is_lost() {
        let hub = Hub::new().unwrap();
        let event = Rc::new(Event::new());
        event.notify_all();

        let co = hub.spawn({
            let event = event.clone();
            move || event.wait()
        });

        hub.run().unwrap();
        assert!(!co.is_dead());
        assert_eq!(event.waiters(), 1);
    }
}
