use coro::{Hub, Status, yield_now};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn yielding_coroutines_interleave_in_spawn_order() {
    let hub = Hub::new().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b", "c"] {
        let log = log.clone();
        hub.spawn(move || {
            for round in 0..2 {
                log.borrow_mut().push(format!("{name}{round}"));
                yield_now()?;
            }
            Ok(())
        })
        .detach();
    }

    hub.run().unwrap();

    assert_eq!(*log.borrow(), ["a0", "b0", "c0", "a1", "b1", "c1"]);
}

#[test]
fn busy_coroutine_does_not_starve_a_sleeper() {
    let hub = Hub::new().unwrap();
    let woke = Rc::new(Cell::new(false));
    let spins = Rc::new(Cell::new(0u64));

    hub.spawn({
        let woke = woke.clone();
        move || {
            coro::sleep(Duration::from_millis(10))?;
            woke.set(true);
            Ok(())
        }
    })
    .detach();

    hub.spawn({
        let (woke, spins) = (woke.clone(), spins.clone());
        move || {
            while !woke.get() {
                spins.set(spins.get() + 1);
                yield_now()?;
            }
            Ok(())
        }
    })
    .detach();

    hub.run().unwrap();

    assert!(woke.get());
    assert!(spins.get() > 0);
}

#[test]
fn spawned_coroutine_waits_for_the_hub() {
    let hub = Hub::new().unwrap();
    let ran = Rc::new(Cell::new(false));

    let co = hub.spawn({
        let ran = ran.clone();
        move || {
            ran.set(true);
            Ok(())
        }
    });

    assert_eq!(co.status(), Status::New);
    assert!(!ran.get());
    assert_eq!(hub.ready(), 1);

    hub.run().unwrap();
    assert!(ran.get());
    assert_eq!(co.status(), Status::Dead);
}

#[test]
fn coroutines_spawned_while_running_join_the_next_pass() {
    let hub = Hub::new().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    hub.spawn({
        let log = log.clone();
        move || {
            log.borrow_mut().push("parent");
            coro::start({
                let log = log.clone();
                move || {
                    log.borrow_mut().push("child");
                    Ok(())
                }
            })
            .detach();
            log.borrow_mut().push("parent again");
            Ok(())
        }
    })
    .detach();

    hub.quiesce();
    assert_eq!(*log.borrow(), ["parent", "parent again"]);

    hub.quiesce();
    assert_eq!(*log.borrow(), ["parent", "parent again", "child"]);
}

#[test]
fn many_coroutines_on_small_stacks() {
    let hub = Hub::builder().stack_size(64 * 1024).build().unwrap();
    let total = Rc::new(Cell::new(0usize));

    for n in 0..500 {
        let total = total.clone();
        hub.spawn(move || {
            yield_now()?;
            total.set(total.get() + n);
            Ok(())
        })
        .detach();
    }

    assert_eq!(hub.coroutines(), 500);
    hub.run().unwrap();

    assert_eq!(total.get(), (0..500).sum::<usize>());
    assert_eq!(hub.coroutines(), 0);
}

#[test]
fn deep_recursion_fits_in_the_default_stack() {
    fn depth(n: u32) -> u32 {
        let pad = [n as u8; 64];
        std::hint::black_box(&pad);

        if n == 0 { 0 } else { depth(n - 1) + 1 }
    }

    let hub = Hub::new().unwrap();
    let result = hub.block_on(|| Ok(depth(2_000))).unwrap();

    assert_eq!(result, 2_000);
}

#[coro::test(stack_size = 131072)]
fn main_attribute_runs_body_in_a_coroutine() {
    let me = coro::current();
    assert_eq!(me.status(), Status::Running);

    yield_now()?;
}

#[coro::test]
fn macro_body_may_return_a_result() -> coro::Result<()> {
    coro::sleep(Duration::from_millis(1))?;
    Ok(())
}
