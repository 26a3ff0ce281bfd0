//! Unit tests for TimerQueue

use async_runtime::{DeferredTask, TimerQueue};
use core_types::{ErrorKind, TimerId};
use std::collections::HashSet;
use std::time::{Duration, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Small deterministic generator so the operation mix is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

#[test]
fn equal_deadlines_fire_in_scheduling_order() {
    let mut queue = TimerQueue::new(16);
    let t = Instant::now();
    queue.schedule("A", ms(5), t).unwrap();
    queue.schedule("B", ms(5), t).unwrap();
    queue.schedule("C", ms(10), t).unwrap();

    let fired: Vec<_> = queue
        .due(t + ms(10))
        .into_iter()
        .map(DeferredTask::into_callback)
        .collect();
    assert_eq!(fired, vec!["A", "B", "C"]);
}

#[test]
fn later_schedule_with_earlier_deadline_fires_first() {
    let mut queue = TimerQueue::new(16);
    let t = Instant::now();
    queue.schedule("slow", ms(20), t).unwrap();
    queue.schedule("fast", ms(1), t + ms(2)).unwrap();

    let fired: Vec<_> = queue
        .due(t + ms(30))
        .into_iter()
        .map(DeferredTask::into_callback)
        .collect();
    assert_eq!(fired, vec!["fast", "slow"]);
}

#[test]
fn deadline_is_inclusive() {
    let mut queue = TimerQueue::new(4);
    let t = Instant::now();
    queue.schedule((), ms(5), t).unwrap();

    assert!(queue.due(t + ms(4)).is_empty());
    assert_eq!(queue.due(t + ms(5)).len(), 1);
}

#[test]
fn due_tasks_carry_their_metadata() {
    let mut queue = TimerQueue::new(4);
    let t = Instant::now();
    let id = queue.schedule('x', ms(3), t).unwrap();

    let task = queue.due(t + ms(3)).pop().unwrap();
    assert_eq!(task.id, id);
    assert_eq!(task.deadline, t + ms(3));
    assert_eq!(*task.callback(), 'x');
    assert!(!queue.contains(id));
}

#[test]
fn capacity_is_enforced_and_recovers_after_firing() {
    let mut queue = TimerQueue::new(1);
    let t = Instant::now();
    queue.schedule(1, ms(0), t).unwrap();

    let err = queue.schedule(2, ms(0), t).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);

    queue.due(t);
    assert!(queue.schedule(3, ms(0), t).is_ok());
}

#[test]
fn cancel_unknown_handle_is_noop() {
    let mut queue = TimerQueue::new(4);
    let t = Instant::now();
    queue.schedule((), ms(1), t).unwrap();

    assert!(!queue.cancel(TimerId::new(999)));
    assert_eq!(queue.len(), 1);
}

#[test]
fn cancelled_tasks_never_fire_and_handles_stay_distinct() {
    let mut rng = Lcg(0x5eed);
    let mut queue = TimerQueue::new(64);
    let t = Instant::now();
    let mut outstanding: Vec<TimerId> = Vec::new();
    let mut cancelled: HashSet<TimerId> = HashSet::new();
    let mut fired: HashSet<TimerId> = HashSet::new();
    let mut clock = t;

    for _ in 0..2_000 {
        match rng.next() % 4 {
            0 | 1 => {
                if let Ok(id) = queue.schedule((), ms(rng.next() % 20), clock) {
                    assert!(!outstanding.contains(&id), "handle {id} reused while outstanding");
                    outstanding.push(id);
                }
            }
            2 if !outstanding.is_empty() => {
                let index = (rng.next() as usize) % outstanding.len();
                let id = outstanding.swap_remove(index);
                assert!(queue.cancel(id));
                cancelled.insert(id);
            }
            _ => {
                clock += ms(rng.next() % 8);
                for task in queue.due(clock) {
                    assert!(!cancelled.contains(&task.id), "cancelled task {} fired", task.id);
                    outstanding.retain(|id| *id != task.id);
                    fired.insert(task.id);
                }
            }
        }
        assert_eq!(queue.len(), outstanding.len());
    }

    for task in queue.due(clock + ms(1_000)) {
        assert!(!cancelled.contains(&task.id));
    }
    assert!(!fired.is_empty());
}
