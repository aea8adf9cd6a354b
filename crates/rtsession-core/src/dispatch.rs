//! Deferred-action queue bridging network tasks and the host loop.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Zero-argument operation executed once on the host's main turn.
pub type PendingAction = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Pending {
    actions: VecDeque<PendingAction>,
    /// Bumped by every `clear`.
    generation: u64,
}

/// FIFO queue of pending actions.
///
/// Any task may enqueue; only the host loop drains. Clones share the same
/// underlying queue.
#[derive(Clone, Default)]
pub struct DispatchQueue {
    inner: Arc<Mutex<Pending>>,
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl DispatchQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an action to the back of the queue.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().actions.push_back(Box::new(action));
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().actions.is_empty()
    }

    /// Drop every queued action. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        pending.generation = pending.generation.wrapping_add(1);
        let count = pending.actions.len();
        pending.actions.clear();
        count
    }

    /// Run the actions queued at call start, in FIFO order.
    ///
    /// Actions enqueued while draining wait for the next call. The lock is
    /// released before each action runs, so actions may enqueue or clear.
    /// A `clear` ends the pass, even if new actions were enqueued after it.
    /// Returns the number of actions executed.
    pub fn drain(&self) -> usize {
        let (snapshot, generation) = {
            let pending = self.lock();
            (pending.actions.len(), pending.generation)
        };
        let mut executed = 0;

        for _ in 0..snapshot {
            let action = {
                let mut pending = self.lock();
                if pending.generation != generation {
                    break;
                }
                pending.actions.pop_front()
            };
            let Some(action) = action else {
                break;
            };
            action();
            executed += 1;
        }

        executed
    }
}
