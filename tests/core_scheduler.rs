#![allow(missing_docs)]
//! Scheduler integration tests.
//!
//! Test Coverage:
//! - FIFO order within a tick, deferred work on the next tick
//! - Shared futures resolve every resolver exactly once, in order
//! - Event fire clears its subscribers
//! - Singleton coalescing across tasks
//! - Sleep ordering, timeouts and disposal racing a sleep
//! - Nested cores

#[macro_use]
mod common;

use common::*;
use pretzel::time::{self, timeout};
use pretzel::{Cont, Core, CoreBuilder, Event, Singleton};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn tasks_interleave_in_fifo_order() {
    init_test("tasks_interleave_in_fifo_order");
    let core = Core::new().expect("core");
    let log = Rc::new(RefCell::new(Vec::new()));
    for name in ["a", "b"] {
        let log = Rc::clone(&log);
        core.spawn(async move {
            for step in 0..3 {
                log.borrow_mut().push(format!("{name}{step}"));
                time::schedule().await;
            }
        });
    }
    let stopper = core.clone();
    core.call_later(Duration::from_millis(5), move |_| stopper.dispose());
    core.run().expect("run");
    let log = log.borrow().clone();
    assert_with_log!(
        log == ["a0", "b0", "a1", "b1", "a2", "b2"],
        "interleaving",
        ["a0", "b0", "a1", "b1", "a2", "b2"],
        log
    );
    test_complete!("tasks_interleave_in_fifo_order");
}

#[test]
fn shared_delivers_once_in_attachment_order() {
    init_test("shared_delivers_once_in_attachment_order");
    let runs = Rc::new(Cell::new(0));
    let order = Rc::new(RefCell::new(Vec::new()));
    let results = run({
        let runs = Rc::clone(&runs);
        let order = Rc::clone(&order);
        async move {
            let core = current_core();
            let shared = Cont::new(move || {
                let runs = Rc::clone(&runs);
                async move {
                    runs.set(runs.get() + 1);
                    time::sleep(Duration::from_millis(2)).await?;
                    Ok(String::from("value"))
                }
            })
            .future(&core);
            for n in 0..3 {
                let order = Rc::clone(&order);
                shared.attach(move |result| order.borrow_mut().push((n, result.is_ok())));
            }
            let first = shared.clone().await?;
            let second = shared.clone().await?;
            Ok::<_, pretzel::Error>((first, second))
        }
    })
    .expect("shared");
    assert_eq!(runs.get(), 1);
    assert_eq!(results.0, "value");
    assert_eq!(results.1, "value");
    assert_eq!(*order.borrow(), vec![(0, true), (1, true), (2, true)]);
    test_complete!("shared_delivers_once_in_attachment_order");
}

#[test]
fn event_fire_clears_subscribers() {
    init_test("event_fire_clears_subscribers");
    let event: Event<u32> = Event::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..2 {
        let seen = Rc::clone(&seen);
        event.subscribe_once(move |value| seen.borrow_mut().push(value));
    }
    assert_eq!(event.fire(1), 2);
    assert_eq!(event.fire(2), 0);
    assert_eq!(*seen.borrow(), vec![1, 1]);
    test_complete!("event_fire_clears_subscribers");
}

#[test]
fn singleton_coalesces_across_tasks() {
    init_test("singleton_coalesces_across_tasks");
    let runs = Rc::new(Cell::new(0));
    let outcomes = run({
        let runs = Rc::clone(&runs);
        async move {
            let core = current_core();
            let singleton = Singleton::new(
                core.clone(),
                Cont::new(move || {
                    let runs = Rc::clone(&runs);
                    async move {
                        runs.set(runs.get() + 1);
                        time::sleep(Duration::from_millis(2)).await?;
                        Ok(runs.get())
                    }
                }),
            );
            let outcomes = Rc::new(RefCell::new(Vec::new()));
            for _ in 0..4 {
                let call = singleton.call();
                let outcomes = Rc::clone(&outcomes);
                core.spawn(async move { outcomes.borrow_mut().push(call.await) });
            }
            time::sleep(Duration::from_millis(10)).await?;
            let later = singleton.call().await?;
            let mut outcomes = outcomes.take();
            outcomes.push(Ok(later));
            Ok::<_, pretzel::Error>(outcomes)
        }
    })
    .expect("singleton");
    let values: Vec<u32> = outcomes.into_iter().map(|r| r.expect("ok")).collect();
    assert_with_log!(values == [1, 1, 1, 1, 2], "values", [1, 1, 1, 1, 2], values);
    test_complete!("singleton_coalesces_across_tasks");
}

#[test]
fn sleeps_wake_in_deadline_order() {
    init_test("sleeps_wake_in_deadline_order");
    let order = run(async {
        let core = current_core();
        let order = Rc::new(RefCell::new(Vec::new()));
        for ms in [15_u64, 5, 10] {
            let order = Rc::clone(&order);
            core.spawn(async move {
                if time::sleep(Duration::from_millis(ms)).await.is_ok() {
                    order.borrow_mut().push(ms);
                }
            });
        }
        time::sleep(Duration::from_millis(30)).await?;
        Ok::<_, pretzel::Error>(order.take())
    })
    .expect("sleeps");
    assert_eq!(order, vec![5, 10, 15]);
    test_complete!("sleeps_wake_in_deadline_order");
}

#[test]
fn timeout_cancels_slow_work() {
    init_test("timeout_cancels_slow_work");
    let (fast, slow) = run(async {
        let fast = timeout(Duration::from_millis(50), async { 1 }).await;
        let slow = timeout(
            Duration::from_millis(5),
            time::sleep(Duration::from_secs(5)),
        )
        .await;
        (fast, slow)
    });
    assert_eq!(fast.expect("fast"), 1);
    let err = slow.expect_err("slow");
    assert_with_log!(err.is_cancelled(), "timed out", true, err.kind());
    test_complete!("timeout_cancels_slow_work");
}

#[test]
fn dispose_cancels_pending_timer() {
    init_test("dispose_cancels_pending_timer");
    let core = Core::new().expect("core");
    let outcome = Rc::new(RefCell::new(None));
    {
        let outcome = Rc::clone(&outcome);
        core.call_later(Duration::from_secs(60), move |result| {
            *outcome.borrow_mut() = Some(result);
        });
    }
    assert_eq!(core.timer_count(), 1);
    assert!(outcome.borrow().is_none());
    core.dispose();
    let result = outcome.take().expect("timer resolved");
    assert!(result.expect_err("cancelled").is_cancelled());
    test_complete!("dispose_cancels_pending_timer");
}

#[test]
fn dispose_races_sleeping_main() {
    init_test("dispose_races_sleeping_main");
    let core = Core::new().expect("core");
    let stopper = core.clone();
    core.call_later(Duration::from_millis(5), move |_| stopper.dispose());
    let outcome = core
        .block_on(time::Sleep::after(core.clone(), Duration::from_secs(60)))
        .expect("main resumed by disposal");
    let err = outcome.expect_err("sleep cancelled");
    assert_with_log!(err.is_cancelled(), "cancelled", true, err.kind());
    assert_eq!(core.task_count(), 0);
    test_complete!("dispose_races_sleeping_main");
}

#[test]
fn nested_core_restores_outer() {
    init_test("nested_core_restores_outer");
    let outer = CoreBuilder::new().buffer_size(1024).build().expect("core");
    let outer_handle = outer.clone();
    let (inner_value, restored) = outer
        .block_on(async move {
            let inner = Core::new().expect("inner core");
            let inner_value = inner
                .block_on(async { Core::current().map(|core| core.config().buffer_size) })
                .expect("inner block_on");
            let restored = Core::current().is_some_and(|core| core.same(&outer_handle));
            (inner_value, restored)
        })
        .expect("outer block_on");
    assert_eq!(inner_value, Some(pretzel::CoreConfig::default().buffer_size));
    assert!(restored);
    test_complete!("nested_core_restores_outer");
}
