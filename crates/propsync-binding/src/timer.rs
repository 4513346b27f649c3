//! One-shot timers for delayed reverts
//!
//! Bindings never sleep themselves; they ask a [`TimerScheduler`] to run a
//! callback later. [`LocalTokioScheduler`] drives real hosts and
//! [`ManualClock`] gives tests deterministic control over time.

use propsync_core::types::SharedHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle of a scheduled callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub type TimerCallback = Box<dyn FnOnce()>;

/// Schedules one-shot callbacks on the UI thread
pub trait TimerScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancel a pending callback; false if it already ran or was cancelled
    fn cancel(&self, handle: TimerHandle) -> bool;
}

struct PendingTimer {
    handle: TimerHandle,
    due: Duration,
    callback: TimerCallback,
}

/// Clock that only moves when told to
#[derive(Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    next_handle: Cell<u64>,
    pending: RefCell<Vec<PendingTimer>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the clock was created
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Move time forward, running every callback that falls due, in due order
    ///
    /// Callbacks may schedule further timers; those run too if they fall due
    /// before the target time. Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now.get() + by;
        let mut fired = 0;

        loop {
            let next = {
                let mut pending = self.pending.borrow_mut();
                let earliest = pending
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.handle.0))
                    .map(|(i, _)| i);
                earliest.map(|i| pending.remove(i))
            };
            let Some(timer) = next else { break };

            self.now.set(timer.due);
            (timer.callback)();
            fired += 1;
        }

        self.now.set(target);
        fired
    }
}

impl TimerScheduler for ManualClock {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.pending.borrow_mut().push(PendingTimer {
            handle,
            due: self.now.get() + delay,
            callback,
        });
        handle
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let mut pending = self.pending.borrow_mut();
        match pending.iter().position(|t| t.handle == handle) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Scheduler backed by tokio's timer on the current thread
///
/// Callbacks are spawned with `spawn_local`, so scheduling must happen inside
/// a `tokio::task::LocalSet`.
#[derive(Default)]
pub struct LocalTokioScheduler {
    next_handle: Cell<u64>,
    tasks: SharedHashMap<u64, JoinHandle<()>>,
}

impl LocalTokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl TimerScheduler for LocalTokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);

        let tasks = Rc::downgrade(&self.tasks);
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(tasks) = tasks.upgrade() {
                tasks.borrow_mut().remove(&id);
            }
            callback();
        });
        self.tasks.borrow_mut().insert(id, task);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        match self.tasks.borrow_mut().remove(&handle.0) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for LocalTokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.borrow_mut().drain() {
            task.abort();
        }
    }
}
