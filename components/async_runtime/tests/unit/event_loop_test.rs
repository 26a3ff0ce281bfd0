//! Unit tests for EventLoop

use crate::support::{callback, logs, scheduler, scheduler_with, FakeEngine};
use async_runtime::{AsyncCompletion, EventLoop, ManualClock, RuntimeConfig, Scheduler};
use core_types::{ErrorKind, ScriptException};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn empty_event_loop_run_completes_immediately() {
    let event_loop = EventLoop::new(scheduler());
    let stats = event_loop.run_until_done(&FakeEngine::new());
    assert_eq!(stats.passes, 0);
}

#[test]
fn single_zero_delay_timer_takes_exactly_one_pass() {
    let scheduler = scheduler();
    scheduler.set_timeout(logs("tick"), Duration::ZERO).unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler.clone()).run_until_done(&engine);

    assert_eq!(stats.passes, 1);
    assert_eq!(stats.timers, 1);
    assert_eq!(engine.entries(), vec!["tick"]);
    assert!(scheduler.is_quiescent());
}

#[test]
fn equal_deadlines_fire_fifo_through_the_loop() {
    let clock = Arc::new(ManualClock::new());
    let scheduler = Rc::new(Scheduler::with_clock(RuntimeConfig::default(), clock.clone()));
    scheduler.set_timeout(logs("A"), Duration::from_millis(5)).unwrap();
    scheduler.set_timeout(logs("B"), Duration::from_millis(5)).unwrap();
    scheduler.set_timeout(logs("C"), Duration::from_millis(10)).unwrap();

    let engine = FakeEngine::new();
    let event_loop = EventLoop::new(scheduler);
    clock.advance(Duration::from_millis(10));
    event_loop.dispatch(&engine);

    assert_eq!(engine.entries(), vec!["A", "B", "C"]);
}

#[test]
fn timers_fire_in_deadline_order_in_real_time() {
    let scheduler = scheduler();
    scheduler.set_timeout(logs("slow"), Duration::from_millis(15)).unwrap();
    scheduler.set_timeout(logs("fast"), Duration::from_millis(2)).unwrap();

    let engine = FakeEngine::new();
    EventLoop::new(scheduler).run_until_done(&engine);

    assert_eq!(engine.entries(), vec!["fast", "slow"]);
}

#[test]
fn self_rescheduling_timer_keeps_loop_alive() {
    fn tick(scheduler: Rc<Scheduler<FakeEngine>>, remaining: u32) -> crate::support::Callback {
        callback(move |engine| {
            engine.record(format!("tick {remaining}"));
            if remaining > 1 {
                let next = tick(scheduler.clone(), remaining - 1);
                scheduler.set_timeout(next, Duration::ZERO).unwrap();
            }
            Ok(())
        })
    }

    let scheduler = scheduler();
    scheduler
        .set_timeout(tick(scheduler.clone(), 3), Duration::ZERO)
        .unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler.clone()).run_until_done(&engine);

    assert_eq!(engine.entries(), vec!["tick 3", "tick 2", "tick 1"]);
    assert_eq!(stats.passes, 3);
}

#[test]
fn timer_cancelled_by_earlier_timer_in_same_pass_never_fires() {
    let scheduler = scheduler();
    let victim = Rc::new(Cell::new(None));

    let s = scheduler.clone();
    let v = victim.clone();
    scheduler
        .set_timeout(
            callback(move |engine| {
                engine.record("canceller");
                if let Some(id) = v.get() {
                    s.clear_timeout(id);
                }
                Ok(())
            }),
            Duration::ZERO,
        )
        .unwrap();
    let id = scheduler.set_timeout(logs("victim"), Duration::ZERO).unwrap();
    victim.set(Some(id));

    let engine = FakeEngine::new();
    thread::sleep(Duration::from_millis(1));
    EventLoop::new(scheduler).run_until_done(&engine);

    assert_eq!(engine.entries(), vec!["canceller"]);
}

#[test]
fn microtasks_drain_between_timer_passes() {
    let scheduler = scheduler();
    scheduler
        .set_timeout(
            callback(|engine| {
                engine.record("timer 1");
                engine.queue_microtask(callback(|engine| {
                    engine.record("microtask");
                    engine.queue_microtask(logs("nested microtask"));
                    Ok(())
                }));
                Ok(())
            }),
            Duration::ZERO,
        )
        .unwrap();
    scheduler.set_timeout(logs("timer 2"), Duration::from_millis(3)).unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler).run_until_done(&engine);

    assert_eq!(
        engine.entries(),
        vec!["timer 1", "microtask", "nested microtask", "timer 2"]
    );
    assert_eq!(stats.microtasks, 2);
}

#[test]
fn pending_microtasks_run_before_first_pass() {
    let engine = FakeEngine::new();
    engine.queue_microtask(logs("settled"));

    let stats = EventLoop::new(scheduler()).run_until_done(&engine);
    assert_eq!(engine.entries(), vec!["settled"]);
    assert_eq!(stats.passes, 0);
    assert_eq!(stats.microtasks, 1);
}

#[test]
fn throwing_callbacks_are_contained() {
    let scheduler = scheduler();
    scheduler
        .set_timeout(
            callback(|engine| {
                engine.queue_microtask(callback(|_| Err(ScriptException::new("rejected"))));
                Err(ScriptException::new("Error: timer failed"))
            }),
            Duration::ZERO,
        )
        .unwrap();
    scheduler.set_timeout(logs("survivor"), Duration::from_millis(2)).unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler).run_until_done(&engine);

    assert_eq!(engine.entries(), vec!["survivor"]);
    assert_eq!(stats.callback_errors, 2);
    assert_eq!(stats.timers, 2);
}

#[test]
fn timer_over_capacity_is_dropped_without_stopping_the_loop() {
    let scheduler = scheduler_with(RuntimeConfig::new().with_timer_capacity(1));
    scheduler.set_timeout(logs("kept"), Duration::ZERO).unwrap();
    let err = scheduler
        .set_timeout(logs("dropped"), Duration::ZERO)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);

    let engine = FakeEngine::new();
    EventLoop::new(scheduler).run_until_done(&engine);
    assert_eq!(engine.entries(), vec!["kept"]);
}

#[test]
fn completions_fire_before_timers_in_a_pass() {
    let scheduler = scheduler();
    scheduler.set_timeout(logs("timer"), Duration::ZERO).unwrap();
    scheduler
        .push_completion(AsyncCompletion::new("io", |engine: &FakeEngine| {
            engine.record("completion");
            Ok(())
        }))
        .unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler).run_until_done(&engine);
    assert_eq!(engine.entries(), vec!["completion", "timer"]);
    assert_eq!(stats.passes, 1);
}

#[test]
fn loop_waits_for_reserved_completion() {
    let scheduler = scheduler();
    let slot = scheduler.reserve_completion().unwrap();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        slot.complete(AsyncCompletion::new("io", |engine: &FakeEngine| {
            engine.record("delivered");
            Ok(())
        }));
    });

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler.clone()).run_until_done(&engine);
    producer.join().unwrap();

    assert_eq!(engine.entries(), vec!["delivered"]);
    assert_eq!(stats.completions, 1);
    assert!(scheduler.is_quiescent());
}

#[test]
fn loop_terminates_when_reservation_is_abandoned() {
    let scheduler = scheduler();
    let slot = scheduler.reserve_completion().unwrap();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(5));
        drop(slot);
    });

    let stats = EventLoop::new(scheduler).run_until_done(&FakeEngine::new());
    producer.join().unwrap();
    assert_eq!(stats.completions, 0);
}

#[test]
fn completion_enqueued_by_completion_is_delivered_next_pass() {
    let scheduler = scheduler();
    let sender = scheduler.completion_sender();
    scheduler
        .push_completion(AsyncCompletion::new("outer", move |engine: &FakeEngine| {
            engine.record("outer");
            sender
                .push(AsyncCompletion::new("inner", |engine: &FakeEngine| {
                    engine.record("inner");
                    Ok(())
                }))
                .map_err(|err| ScriptException::new(err.to_string()))
        }))
        .unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler).run_until_done(&engine);
    assert_eq!(engine.entries(), vec!["outer", "inner"]);
    assert_eq!(stats.passes, 2);
}

#[test]
fn completions_from_many_producers_never_overlap() {
    let scheduler = scheduler();
    let loop_thread = thread::current().id();

    let producers: Vec<_> = (0..4)
        .map(|n| {
            let slot = scheduler.reserve_completion().unwrap();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(2 * n));
                slot.complete(AsyncCompletion::new("worker", move |engine: &FakeEngine| {
                    let _active = engine.enter();
                    assert_eq!(thread::current().id(), loop_thread);
                    engine.record(format!("worker {n}"));
                    Ok(())
                }));
            })
        })
        .collect();

    // a timer running alongside the deliveries
    scheduler.set_timeout(logs("timer"), Duration::from_millis(3)).unwrap();

    let engine = FakeEngine::new();
    let stats = EventLoop::new(scheduler).run_until_done(&engine);
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(stats.completions, 4);
    assert_eq!(engine.overlaps.get(), 0);
    assert_eq!(engine.entries().len(), 5);
}

#[test]
fn clear_drops_timers_and_queued_completions_but_not_reservations() {
    let scheduler = scheduler();
    scheduler.set_timeout(logs("timer"), Duration::from_secs(60)).unwrap();
    scheduler
        .push_completion(AsyncCompletion::new("queued", |engine: &FakeEngine| {
            engine.record("queued");
            Ok(())
        }))
        .unwrap();
    let slot = scheduler.reserve_completion().unwrap();

    scheduler.clear();
    assert_eq!(scheduler.pending_timers(), 0);
    assert_eq!(scheduler.completions().pending_len(), 0);
    assert!(!scheduler.is_quiescent());

    drop(slot);
    assert!(scheduler.is_quiescent());
}

#[test]
fn scheduler_pops_one_due_timer_at_a_time_below_the_horizon() {
    let clock = Arc::new(ManualClock::new());
    let scheduler: Scheduler<FakeEngine> =
        Scheduler::with_clock(RuntimeConfig::default(), clock.clone());
    let first = scheduler.set_timeout(logs("first"), Duration::ZERO).unwrap();
    let later = scheduler.set_timeout(logs("later"), Duration::from_millis(5)).unwrap();
    let horizon = scheduler.timer_horizon();
    let added = scheduler.set_timeout(logs("added"), Duration::ZERO).unwrap();

    let now = scheduler.now();
    let popped = scheduler.pop_due_timer(now, horizon).unwrap();
    assert_eq!(popped.id, first);
    assert!(scheduler.pop_due_timer(now, horizon).is_none());
    assert_eq!(scheduler.pending_timers(), 2);

    // Deadline order still applies: the newer timer is due first and holds
    // back the older one until the next horizon.
    clock.advance(Duration::from_millis(5));
    assert!(scheduler.pop_due_timer(scheduler.now(), horizon).is_none());

    let horizon = scheduler.timer_horizon();
    let order: Vec<_> = std::iter::from_fn(|| scheduler.pop_due_timer(scheduler.now(), horizon))
        .map(|task| task.id)
        .collect();
    assert_eq!(order, vec![added, later]);
    assert!(scheduler.is_quiescent());
}
