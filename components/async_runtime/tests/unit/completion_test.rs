//! Unit tests for the async completion queue

use crate::support::FakeEngine;
use async_runtime::{AsyncCompletion, CompletionQueue};
use core_types::{ErrorKind, ScriptException};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Counts how many payloads are alive.
struct Payload(Arc<AtomicUsize>);

impl Drop for Payload {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn payload(live: &Arc<AtomicUsize>) -> Payload {
    live.fetch_add(1, Ordering::SeqCst);
    Payload(Arc::clone(live))
}

#[test]
fn payload_is_released_when_callback_throws() {
    let live = Arc::new(AtomicUsize::new(0));
    let queue = CompletionQueue::new(4);
    let held = payload(&live);
    queue
        .push(AsyncCompletion::new("read", move |_: &FakeEngine| {
            let _held = held;
            Err(ScriptException::new("Error: callback failed"))
        }))
        .unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let engine = FakeEngine::new();
    for completion in queue.take_all() {
        assert!(completion.deliver(&engine).is_err());
    }
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn dropped_completion_releases_payload() {
    let live = Arc::new(AtomicUsize::new(0));
    let queue: CompletionQueue<FakeEngine> = CompletionQueue::new(1);
    queue
        .push(AsyncCompletion::new("first", |_: &FakeEngine| Ok(())))
        .unwrap();

    let held = payload(&live);
    let err = queue
        .push(AsyncCompletion::new("second", move |_: &FakeEngine| {
            let _held = held;
            Ok(())
        }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn label_is_kept_for_diagnostics() {
    let completion: AsyncCompletion<FakeEngine> =
        AsyncCompletion::new("openFile", |_: &FakeEngine| Ok(()));
    assert_eq!(completion.label(), "openFile");
    assert!(format!("{completion:?}").contains("openFile"));
}

#[test]
fn sender_pushes_from_many_threads() {
    let queue: CompletionQueue<FakeEngine> = CompletionQueue::new(64);
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let sender = queue.sender();
            thread::spawn(move || {
                for i in 0..8 {
                    let entry = format!("{n}:{i}");
                    sender
                        .push(AsyncCompletion::new("worker", move |engine: &FakeEngine| {
                            engine.record(entry);
                            Ok(())
                        }))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let engine = FakeEngine::new();
    let taken = queue.take_all();
    assert_eq!(taken.len(), 32);
    for completion in taken {
        completion.deliver(&engine).unwrap();
    }
    assert_eq!(engine.entries().len(), 32);
    assert!(queue.is_idle());
}

#[test]
fn wait_wakes_when_slot_is_fulfilled() {
    let queue: CompletionQueue<FakeEngine> = CompletionQueue::new(4);
    let slot = queue.reserve().unwrap();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        slot.complete(AsyncCompletion::new("late", |_: &FakeEngine| Ok(())));
    });

    let mut woke = false;
    for _ in 0..200 {
        if queue.wait(Duration::from_millis(50)) {
            woke = true;
            break;
        }
    }
    producer.join().unwrap();
    assert!(woke);
    assert_eq!(queue.reserved(), 0);
}
