//! Example: a periodic timer and an event shared between coroutines

use coro::{Event, Selector};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[coro::main]
fn main() {
    let tick = Rc::new(Event::new());
    let done = Rc::new(Event::new());

    // Fires every 100ms until its handle is dropped
    let ticker = coro::timer(Duration::from_millis(100), {
        let tick = tick.clone();
        move || tick.notify_all()
    });

    coro::start({
        let done = done.clone();
        move || {
            coro::sleep(Duration::from_millis(550))?;
            done.notify_all();
            Ok(())
        }
    })
    .detach();

    let ticks = Cell::new(0);
    let finished = Cell::new(false);

    while !finished.get() {
        Selector::new()
            .on(&tick, || {
                ticks.set(ticks.get() + 1);
                println!("tick {}", ticks.get());
            })
            .on(&done, || finished.set(true))
            .wait()?;
    }

    drop(ticker);
    println!("Stopped after {} ticks", ticks.get());
}
