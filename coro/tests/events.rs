use coro::{Event, Hub, Selector, Status};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn predicate_wait_wakes_exactly_the_satisfied_waiters() {
    let hub = Hub::new().unwrap();
    let event = Rc::new(Event::new());
    let level = Rc::new(Cell::new(0));
    let finished = Rc::new(Cell::new(0));

    for threshold in 1..=5 {
        let (event, level, finished) = (event.clone(), level.clone(), finished.clone());
        hub.spawn(move || {
            event.wait_until(|| level.get() >= threshold)?;
            finished.set(finished.get() + 1);
            Ok(())
        })
        .detach();
    }

    hub.quiesce();
    assert_eq!(event.waiters(), 5);

    level.set(3);
    event.notify_all();
    hub.run().unwrap();

    assert_eq!(finished.get(), 3);
    assert_eq!(event.waiters(), 2);
    assert_eq!(hub.waiting(), 2);

    level.set(5);
    event.notify_all();
    hub.run().unwrap();

    assert_eq!(finished.get(), 5);
    assert_eq!(hub.waiting(), 0);
}

#[test]
fn repeated_notifications_wake_a_waiter_once() {
    let hub = Hub::new().unwrap();
    let event = Rc::new(Event::new());
    let wakes = Rc::new(Cell::new(0));

    let co = hub.spawn({
        let (event, wakes) = (event.clone(), wakes.clone());
        move || {
            loop {
                event.wait()?;
                wakes.set(wakes.get() + 1);
            }
        }
    });

    hub.quiesce();
    assert_eq!(co.status(), Status::Waiting);

    event.notify_all();
    event.notify_all();
    hub.run().unwrap();

    assert_eq!(wakes.get(), 1);
    assert_eq!(co.status(), Status::Waiting);
    assert_eq!(event.waiters(), 1);
}

#[test]
fn waiter_registered_during_notify_waits_for_the_next_one() {
    let hub = Hub::new().unwrap();
    let event = Rc::new(Event::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second"] {
        let (event, log) = (event.clone(), log.clone());
        hub.spawn(move || {
            event.wait()?;
            log.borrow_mut().push(name);
            event.wait()?;
            log.borrow_mut().push(name);
            Ok(())
        })
        .detach();
    }

    hub.quiesce();
    event.notify_all();
    hub.run().unwrap();
    assert_eq!(*log.borrow(), ["first", "second"]);

    event.notify_all();
    hub.run().unwrap();
    assert_eq!(*log.borrow(), ["first", "second", "first", "second"]);
}

#[test]
fn selector_dispatches_until_shutdown() {
    let hub = Hub::new().unwrap();
    let data = Rc::new(Event::new());
    let quit = Rc::new(Event::new());

    hub.spawn({
        let (data, quit) = (data.clone(), quit.clone());
        move || {
            for _ in 0..3 {
                coro::sleep(Duration::from_millis(2))?;
                data.notify_all();
            }

            coro::sleep(Duration::from_millis(2))?;
            quit.notify_all();
            Ok(())
        }
    })
    .detach();

    let received = hub
        .block_on(move || {
            let received = Cell::new(0);
            let stop = Cell::new(false);

            while !stop.get() {
                Selector::new()
                    .on(&data, || received.set(received.get() + 1))
                    .on(&quit, || stop.set(true))
                    .wait()?;
            }

            assert_eq!(data.waiters(), 0);
            Ok(received.get())
        })
        .unwrap();

    assert_eq!(received, 3);
}

#[test]
fn selector_callbacks_run_in_registration_order() {
    let hub = Hub::new().unwrap();
    let a = Rc::new(Event::new());
    let b = Rc::new(Event::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    hub.spawn({
        let (a, b, log) = (a.clone(), b.clone(), log.clone());
        move || {
            Selector::new()
                .on(&a, || log.borrow_mut().push("a"))
                .on(&b, || log.borrow_mut().push("b"))
                .wait()
        }
    })
    .detach();

    hub.quiesce();

    b.notify_all();
    a.notify_all();
    hub.run().unwrap();

    assert_eq!(*log.borrow(), ["a", "b"]);
}

#[test]
fn cancelled_selector_runs_no_callback() {
    let hub = Hub::new().unwrap();
    let event = Rc::new(Event::new());
    let fired = Rc::new(Cell::new(false));
    let outcome = Rc::new(Cell::new(None));

    hub.spawn({
        let (event, fired, outcome) = (event.clone(), fired.clone(), outcome.clone());
        move || {
            let result = Selector::new().on(&event, || fired.set(true)).wait();
            outcome.set(Some(result.as_ref().is_err_and(|e| e.is_cancelled())));
            result
        }
    })
    .detach();

    hub.quiesce();
    assert_eq!(event.waiters(), 1);

    drop(hub);

    assert_eq!(outcome.get(), Some(true));
    assert!(!fired.get());
    assert_eq!(event.waiters(), 0);
}

#[test]
fn cancellation_during_select_stops_the_coroutine() {
    let hub = Hub::new().unwrap();
    let event = Rc::new(Event::new());
    let fired = Rc::new(Cell::new(false));
    let after = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let (event, fired, after) = (event.clone(), fired.clone(), after.clone());
        move || {
            Selector::new().on(&event, || fired.set(true)).wait()?;

            // Unreachable once cancelled: the error propagates out of the body.
            after.set(true);
            Ok(())
        }
    });

    hub.quiesce();
    drop(co);

    event.notify_all();
    hub.run().unwrap();

    assert!(!fired.get());
    assert!(!after.get());
    assert_eq!(event.waiters(), 0);
    assert_eq!(hub.coroutines(), 0);
}

#[test]
fn unwaited_selector_leaves_no_registration() {
    let hub = Hub::new().unwrap();
    let event = Rc::new(Event::new());
    let fired = Rc::new(Cell::new(false));

    hub.block_on({
        let (event, fired) = (event.clone(), fired.clone());
        move || {
            let selector = Selector::new().on(&event, || fired.set(true));
            assert_eq!(event.waiters(), 1);
            drop(selector);
            assert_eq!(event.waiters(), 0);
            Ok(())
        }
    })
    .unwrap();

    event.notify_all();
    assert!(!fired.get());
}
