use super::HubCore;

use std::cell::Cell;
use std::ptr;

thread_local! {
    /// The hub currently driving this thread, if any.
    ///
    /// Set while a hub runs its loop (or tears itself down) and lets
    /// coroutine code reach its hub without passing a handle around. A raw
    /// pointer rather than an `Rc`: the hub is borrowed by whoever is
    /// driving it for the whole time the pointer is installed.
    static CURRENT_HUB: Cell<*const HubCore> = const { Cell::new(ptr::null()) };
}

/// Installs `core` as the current hub for the duration of `f`.
///
/// The previous value is restored afterwards, including when `f` unwinds.
pub(crate) fn enter<R>(core: &HubCore, f: impl FnOnce() -> R) -> R {
    struct Restore(*const HubCore);

    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT_HUB.with(|current| current.set(self.0));
        }
    }

    let _restore = Restore(CURRENT_HUB.with(|current| current.replace(core)));
    f()
}

/// Raw pointer to the current hub; null outside of [`enter`].
pub(crate) fn current_core() -> *const HubCore {
    CURRENT_HUB.with(Cell::get)
}

/// Runs `f` with the current hub, or returns `None` outside of one.
pub(crate) fn try_with<R>(f: impl FnOnce(&HubCore) -> R) -> Option<R> {
    // Non-null only inside `enter`, which borrows the core throughout.
    let core = unsafe { current_core().as_ref() }?;
    Some(f(core))
}

/// Runs `f` with the current hub.
///
/// # Panics
///
/// Panics when called outside of a running hub, i.e. not from a coroutine.
pub(crate) fn with<R>(f: impl FnOnce(&HubCore) -> R) -> R {
    try_with(f).expect("coro primitive used outside of a coroutine")
}
