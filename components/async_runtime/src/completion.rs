//! Async completion queue.
//!
//! Native operations that finish (possibly on another thread) push an
//! [`AsyncCompletion`] here. The loop thread swaps the whole pending set out
//! under the lock and invokes each completion with the lock released, so a
//! completion that enqueues another completion cannot deadlock.
//!
//! Producers that hand work to another thread first take a
//! [`CompletionSlot`] on the loop thread. A slot counts as outstanding work
//! until it is fulfilled or dropped, which keeps the loop from declaring
//! quiescence while an operation is still in flight.

use core_types::{RuntimeError, ScriptException};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

type CompletionFn<E> = Box<dyn FnOnce(&E) -> Result<(), ScriptException> + Send>;

/// The result of a finished native operation, waiting to be delivered to a
/// script callback on the loop thread.
///
/// The closure owns the operation's payload; everything it captured is
/// released when it returns, whether or not the script callback threw.
pub struct AsyncCompletion<E> {
    label: &'static str,
    callback: CompletionFn<E>,
}

impl<E> AsyncCompletion<E> {
    /// Wraps a delivery closure. `label` names the operation in diagnostics.
    pub fn new<F>(label: &'static str, callback: F) -> Self
    where
        F: FnOnce(&E) -> Result<(), ScriptException> + Send + 'static,
    {
        Self {
            label,
            callback: Box::new(callback),
        }
    }

    /// Name of the operation that produced this completion.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Runs the delivery closure against the engine, consuming it.
    pub fn deliver(self, engine: &E) -> Result<(), ScriptException> {
        (self.callback)(engine)
    }
}

impl<E> fmt::Debug for AsyncCompletion<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncCompletion {{ label: {:?}, .. }}", self.label)
    }
}

struct State<E> {
    pending: Vec<AsyncCompletion<E>>,
    reserved: usize,
}

struct Shared<E> {
    state: Mutex<State<E>>,
    ready: Condvar,
    capacity: usize,
}

impl<E> Shared<E> {
    fn push(&self, completion: AsyncCompletion<E>) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if state.pending.len() + state.reserved >= self.capacity {
            let label = completion.label();
            drop(state);
            warn!(
                operation = label,
                capacity = self.capacity,
                "completion queue full, dropping completion"
            );
            return Err(RuntimeError::capacity_exceeded(format!(
                "completion queue is full ({} entries)",
                self.capacity
            )));
        }
        state.pending.push(completion);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    fn release_reservation(&self, completion: Option<AsyncCompletion<E>>) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        if let Some(completion) = completion {
            state.pending.push(completion);
        }
        drop(state);
        self.ready.notify_one();
    }
}

/// The loop-side handle of the completion queue.
pub struct CompletionQueue<E> {
    shared: Arc<Shared<E>>,
}

impl<E> CompletionQueue<E> {
    /// Creates a queue holding at most `capacity` queued plus reserved
    /// completions.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    pending: Vec::new(),
                    reserved: 0,
                }),
                ready: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Returns a cloneable producer handle that can move to other threads.
    pub fn sender(&self) -> CompletionSender<E> {
        CompletionSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Enqueues a completion from the loop thread.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the queue is full; the completion is dropped.
    pub fn push(&self, completion: AsyncCompletion<E>) -> Result<(), RuntimeError> {
        self.shared.push(completion)
    }

    /// Reserves room for one completion to be delivered later, possibly from
    /// another thread.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the queue is full.
    pub fn reserve(&self) -> Result<CompletionSlot<E>, RuntimeError> {
        let mut state = self.shared.state.lock();
        if state.pending.len() + state.reserved >= self.shared.capacity {
            drop(state);
            warn!(
                capacity = self.shared.capacity,
                "completion queue full, refusing reservation"
            );
            return Err(RuntimeError::capacity_exceeded(format!(
                "completion queue is full ({} entries)",
                self.shared.capacity
            )));
        }
        state.reserved += 1;
        Ok(CompletionSlot {
            shared: Some(Arc::clone(&self.shared)),
        })
    }

    /// Swaps out every pending completion under the lock.
    pub fn take_all(&self) -> Vec<AsyncCompletion<E>> {
        let taken = std::mem::take(&mut self.shared.state.lock().pending);
        if !taken.is_empty() {
            trace!(count = taken.len(), "took pending completions");
        }
        taken
    }

    /// Blocks until a completion is pending or `timeout` lapses.
    ///
    /// Returns true if at least one completion is pending.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if state.pending.is_empty() && !timeout.is_zero() {
            let _ = self.shared.ready.wait_for(&mut state, timeout);
        }
        !state.pending.is_empty()
    }

    /// Number of completions waiting for delivery.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of outstanding reservations.
    pub fn reserved(&self) -> usize {
        self.shared.state.lock().reserved
    }

    /// Returns true if nothing is queued and nothing is reserved.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending.is_empty() && state.reserved == 0
    }

    /// Maximum number of queued plus reserved completions.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<E> fmt::Debug for CompletionQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("CompletionQueue")
            .field("pending", &state.pending.len())
            .field("reserved", &state.reserved)
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Producer handle for the completion queue.
pub struct CompletionSender<E> {
    shared: Arc<Shared<E>>,
}

impl<E> CompletionSender<E> {
    /// Enqueues a completion.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the queue is full; the completion is dropped
    /// and its payload released. Producers that need guaranteed delivery
    /// should reserve a [`CompletionSlot`] instead.
    pub fn push(&self, completion: AsyncCompletion<E>) -> Result<(), RuntimeError> {
        self.shared.push(completion)
    }
}

impl<E> Clone for CompletionSender<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> fmt::Debug for CompletionSender<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionSender { .. }")
    }
}

/// A reservation for exactly one future completion.
///
/// Fulfilling the slot cannot fail. Dropping it unfulfilled gives the room
/// back and wakes the loop so it can re-check quiescence.
pub struct CompletionSlot<E> {
    shared: Option<Arc<Shared<E>>>,
}

impl<E> CompletionSlot<E> {
    /// Delivers the reserved completion.
    pub fn complete(mut self, completion: AsyncCompletion<E>) {
        if let Some(shared) = self.shared.take() {
            shared.release_reservation(Some(completion));
        }
    }
}

impl<E> Drop for CompletionSlot<E> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            trace!("completion slot dropped unfulfilled");
            shared.release_reservation(None);
        }
    }
}

impl<E> fmt::Debug for CompletionSlot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSlot")
            .field("fulfilled", &self.shared.is_none())
            .finish()
    }
}
