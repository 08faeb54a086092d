use coro::{Error, Event, Hub, Status, yield_now};

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn dropping_handles_of_a_dead_coroutine_is_idempotent() {
    let hub = Hub::new().unwrap();
    let co = hub.spawn(|| Ok(()));
    let other = co.clone();

    hub.run().unwrap();
    assert!(co.is_dead());

    drop(co);
    assert_eq!(hub.coroutines(), 1);
    assert!(other.is_dead());

    drop(other);
    assert_eq!(hub.coroutines(), 0);
}

#[test]
fn orphaned_coroutine_unwinds_its_stack() {
    let hub = Hub::new().unwrap();
    let dropped = Rc::new(Cell::new(false));
    let cancelled = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let (flag, cancelled) = (DropFlag(dropped.clone()), cancelled.clone());
        move || {
            let _flag = flag;
            loop {
                if let Err(err) = yield_now() {
                    cancelled.set(err.is_cancelled());
                    return Err(err);
                }
            }
        }
    });

    hub.quiesce();
    assert_eq!(co.status(), Status::Runnable);

    drop(co);
    hub.run().unwrap();

    assert!(cancelled.get());
    assert!(dropped.get());
    assert_eq!(hub.coroutines(), 0);
}

#[test]
fn cancellation_is_sticky() {
    let hub = Hub::new().unwrap();
    let second = Rc::new(Cell::new(None));

    hub.spawn({
        let second = second.clone();
        move || {
            loop {
                if let Err(err) = yield_now() {
                    second.set(Some(matches!(yield_now(), Err(Error::Cancelled))));
                    return Err(err);
                }
            }
        }
    })
    .detach();

    hub.quiesce();
    drop(hub);

    assert_eq!(second.get(), Some(true));
}

#[test]
fn never_started_coroutine_is_dropped_unrun() {
    let hub = Hub::new().unwrap();
    let ran = Rc::new(Cell::new(false));
    let dropped = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let (flag, ran) = (DropFlag(dropped.clone()), ran.clone());
        move || {
            let _flag = flag;
            ran.set(true);
            Ok(())
        }
    });

    drop(hub);

    assert!(!ran.get());
    assert!(dropped.get());
    assert!(co.is_dead());
}

#[test]
fn join_waits_for_completion() {
    let hub = Hub::new().unwrap();
    let done = Rc::new(Cell::new(false));

    hub.block_on({
        let done = done.clone();
        move || {
            let child = coro::start({
                let done = done.clone();
                move || {
                    coro::sleep(Duration::from_millis(5))?;
                    done.set(true);
                    Ok(())
                }
            });

            child.join()?;
            assert!(done.get());

            // Joining a finished coroutine returns at once.
            child.join()
        }
    })
    .unwrap();

    assert!(done.get());
}

#[test]
fn several_coroutines_can_join_the_same_one() {
    let hub = Hub::new().unwrap();
    let gate = Rc::new(Event::new());
    let open = Rc::new(Cell::new(false));
    let joined = Rc::new(Cell::new(0));

    let target = hub.spawn({
        let (gate, open) = (gate.clone(), open.clone());
        move || gate.wait_until(|| open.get())
    });

    for _ in 0..3 {
        let (target, joined) = (target.clone(), joined.clone());
        hub.spawn(move || {
            target.join()?;
            joined.set(joined.get() + 1);
            Ok(())
        })
        .detach();
    }

    hub.quiesce();
    assert_eq!(joined.get(), 0);

    open.set(true);
    gate.notify_all();
    hub.run().unwrap();

    assert!(target.is_dead());
    assert_eq!(joined.get(), 3);
}

#[test]
fn detached_coroutine_runs_to_completion() {
    let hub = Hub::new().unwrap();
    let rounds = Rc::new(Cell::new(0));

    hub.spawn({
        let rounds = rounds.clone();
        move || {
            for _ in 0..5 {
                rounds.set(rounds.get() + 1);
                yield_now()?;
            }
            Ok(())
        }
    })
    .detach();

    hub.run().unwrap();

    assert_eq!(rounds.get(), 5);
    assert_eq!(hub.coroutines(), 0);
}

#[test]
fn unblock_through_a_cloned_handle() {
    let hub = Hub::new().unwrap();
    let finished = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let finished = finished.clone();
        move || {
            coro::block()?;
            finished.set(true);
            Ok(())
        }
    });

    hub.quiesce();
    assert_eq!(co.status(), Status::Blocked);
    assert_eq!(hub.blocked(), 1);

    let again = co.clone();
    drop(co);
    assert_eq!(again.status(), Status::Blocked);

    again.unblock();
    assert_eq!(hub.blocked(), 0);
    hub.run().unwrap();

    assert!(finished.get());
}

#[test]
fn block_on_surfaces_the_body_error() {
    let hub = Hub::new().unwrap();

    let result: coro::Result<()> = hub.block_on(|| Err(Error::PeerClosed));

    assert!(matches!(result, Err(Error::PeerClosed)));
}

#[test]
fn coroutine_holding_its_hub_is_unwound_at_teardown() {
    let hub = Hub::new().unwrap();
    let dropped = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let flag = DropFlag(dropped.clone());
        move || {
            let _flag = flag;
            let _hub = coro::hub();
            loop {
                yield_now()?;
            }
        }
    });

    hub.quiesce();
    assert!(!dropped.get());

    drop(hub);

    assert!(dropped.get());
    assert!(co.is_dead());
}

#[test]
fn cloned_owner_keeps_the_hub_running() {
    let hub = Hub::new().unwrap();
    let dropped = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let flag = DropFlag(dropped.clone());
        move || {
            let _flag = flag;
            loop {
                yield_now()?;
            }
        }
    });

    let other = hub.clone();
    hub.quiesce();
    drop(hub);

    assert!(!dropped.get());
    assert_eq!(co.status(), Status::Runnable);

    drop(other);
    assert!(dropped.get());
}
