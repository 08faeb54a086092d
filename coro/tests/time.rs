use coro::{Hub, Time};

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[coro::test]
fn sleep_never_returns_early() {
    let start = Instant::now();
    coro::sleep(Duration::from_millis(50))?;

    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[coro::test]
fn sub_microsecond_sleeps_are_never_short() {
    let duration = Duration::from_nanos(1_999);

    for _ in 0..200 {
        let start = Instant::now();
        coro::sleep(duration)?;

        let elapsed = start.elapsed();
        assert!(elapsed >= duration, "slept {elapsed:?}");
    }
}

#[coro::test]
fn zero_sleep_only_yields() {
    let start = Instant::now();
    coro::sleep(Duration::ZERO)?;

    assert!(start.elapsed() < Duration::from_millis(50));
}

#[coro::test]
fn sleep_until_a_past_deadline_returns() {
    let past = Time::now() - Time::millisec(10);
    coro::sleep_until(past)?;
}

#[test]
fn sleep_completes_within_a_bounded_run() {
    let hub = Hub::new().unwrap();
    let co = hub.spawn(|| coro::sleep(Duration::from_millis(100)));

    hub.run_for(Duration::from_millis(150)).unwrap();

    assert!(co.is_dead());
}

#[test]
fn run_for_stops_at_its_deadline() {
    let hub = Hub::new().unwrap();
    let co = hub.spawn(|| coro::sleep(Duration::from_secs(60)));

    let start = Instant::now();
    hub.run_for(Duration::from_millis(30)).unwrap();

    assert!(start.elapsed() >= Duration::from_millis(30));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!co.is_dead());
}

#[test]
fn sleepers_wake_in_deadline_order() {
    let hub = Hub::new().unwrap();
    let order = Rc::new(std::cell::RefCell::new(Vec::new()));

    for ms in [30u64, 10, 20] {
        let order = order.clone();
        hub.spawn(move || {
            coro::sleep(Duration::from_millis(ms))?;
            order.borrow_mut().push(ms);
            Ok(())
        })
        .detach();
    }

    hub.run().unwrap();

    assert_eq!(*order.borrow(), [10, 20, 30]);
}

#[test]
fn timer_stops_once_its_handle_is_dropped() {
    let hub = Hub::new().unwrap();
    let ticks = Rc::new(Cell::new(0));

    hub.block_on({
        let ticks = ticks.clone();
        move || {
            let ticker = coro::timer(Duration::from_millis(10), {
                let ticks = ticks.clone();
                move || ticks.set(ticks.get() + 1)
            });

            coro::sleep(Duration::from_millis(55))?;
            drop(ticker);

            let seen = ticks.get();
            assert!(seen >= 2, "only {seen} ticks in 55ms");

            coro::sleep(Duration::from_millis(40))?;
            assert_eq!(ticks.get(), seen);
            Ok(())
        }
    })
    .unwrap();

    hub.run().unwrap();
    assert_eq!(hub.coroutines(), 0);
}

#[test]
fn clock_is_monotonic() {
    let a = Time::now();
    let b = Time::now();

    assert!(b >= a);
    assert!((Time::sec(1) - Time::millisec(1000)).as_micros() == 0);
}
