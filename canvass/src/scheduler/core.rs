//! The scheduler: the single timing authority for the protocol core.
//!
//! Every delayed action in the crate — request timeouts, promise reaction
//! dispatch, deferred handler execution, simulated channel delivery — goes
//! through one `Scheduler`. Application code never spawns its own timers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Scheduler                            │
//! │                                      │
//! │  ┌────────────────────────────────┐  │
//! │  │ heap: BinaryHeap<Task>         │  │  min-heap by (deadline, seq)
//! │  └────────────────────────────────┘  │
//! │  ┌────────────────────────────────┐  │
//! │  │ notify: Notify                 │  │  wakes run() on earlier work
//! │  └────────────────────────────────┘  │
//! └──────────────────────────────────────┘
//! ```
//!
//! The `seq` tiebreak makes tasks with equal deadlines fire in scheduling
//! order. The promise engine relies on this: reactions queued back-to-back at
//! delay zero dispatch in attachment order.
//!
//! # Single-Threaded Design
//!
//! Uses `Rc`, `Cell`, and `RefCell` for interior mutability (no Send/Sync
//! required). Compatible with tokio's `current_thread` runtime; deadlines are
//! `tokio::time::Instant`, so tests running under a paused clock advance
//! virtual time deterministically.
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new();
//!
//! scheduler.schedule(Duration::from_millis(100), || {
//!     println!("fired");
//! });
//!
//! scheduler.run_until_idle().await;
//! ```

use crate::scheduler::task::{Task, TaskCall, TaskHandle, TaskId};
use std::cell::{Cell, RefCell};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

struct SchedulerInner {
    heap: RefCell<BinaryHeap<Task>>,
    next_id: Cell<u64>,
    next_seq: Cell<u64>,
    notify: Notify,
}

/// Cooperative task scheduler.
///
/// Cheap to clone; all clones share the same task table. Scheduled callables
/// run outside any internal borrow, so they may freely schedule further
/// tasks, cancel handles, or settle promises.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler with an empty task table.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                heap: RefCell::new(BinaryHeap::new()),
                next_id: Cell::new(1),
                next_seq: Cell::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Schedule a one-shot task to fire after `delay`.
    ///
    /// Returns a handle whose `cancel` removes the task if it has not fired
    /// yet (best-effort against a concurrent fire).
    pub fn schedule(&self, delay: Duration, f: impl FnOnce() + 'static) -> TaskHandle {
        self.push(delay, None, TaskCall::Once(Some(Box::new(f))))
    }

    /// Schedule a repeating task firing every `period`, first fire after one
    /// full period. Repeats until cancelled.
    pub fn schedule_repeating(&self, period: Duration, f: impl FnMut() + 'static) -> TaskHandle {
        self.push(period, Some(period), TaskCall::Repeating(Box::new(f)))
    }

    fn push(&self, delay: Duration, period: Option<Duration>, call: TaskCall) -> TaskHandle {
        let id = TaskId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);

        let cancelled = Rc::new(Cell::new(false));
        let task = Task {
            id,
            deadline: Instant::now() + delay,
            seq,
            period,
            call,
            cancelled: Rc::clone(&cancelled),
        };

        tracing::trace!(task = %id, ?delay, repeating = period.is_some(), "task scheduled");

        self.inner.heap.borrow_mut().push(task);
        self.inner.notify.notify_one();

        TaskHandle::new(id, cancelled)
    }

    /// Number of tasks currently armed (including cancelled ones not yet
    /// reaped).
    pub fn task_count(&self) -> usize {
        self.inner.heap.borrow().len()
    }

    /// Deadline of the earliest armed task, if any.
    fn next_deadline(&self) -> Option<Instant> {
        self.inner.heap.borrow().peek().map(|task| task.deadline)
    }

    /// Pop and run every task due at `now`. Repeating tasks are re-armed
    /// after their callable returns.
    fn fire_due(&self, now: Instant) {
        loop {
            // Take the task out of the heap before running it so the
            // callable can re-enter the scheduler.
            let task = {
                let mut heap = self.inner.heap.borrow_mut();
                match heap.peek() {
                    Some(task) if task.deadline <= now => heap.pop(),
                    _ => None,
                }
            };

            let Some(mut task) = task else { break };

            if task.cancelled.get() {
                continue;
            }

            match &mut task.call {
                TaskCall::Once(f) => {
                    if let Some(f) = f.take() {
                        f();
                    }
                }
                TaskCall::Repeating(f) => {
                    f();
                    if !task.cancelled.get() {
                        // Re-arm relative to the nominal deadline, not the
                        // fire time, so periods do not drift.
                        let period = task.period.unwrap_or(Duration::ZERO);
                        task.deadline += period;
                        let seq = self.inner.next_seq.get();
                        self.inner.next_seq.set(seq + 1);
                        task.seq = seq;
                        self.inner.heap.borrow_mut().push(task);
                    }
                }
            }
        }
    }

    /// Drive the scheduler forever.
    ///
    /// Sleeps until the earliest deadline, fires everything due, and starts
    /// over. A newly scheduled earlier task wakes the loop immediately.
    pub async fn run(&self) {
        loop {
            match self.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            self.fire_due(Instant::now());
                        }
                        _ = self.inner.notify.notified() => {}
                    }
                }
                None => self.inner.notify.notified().await,
            }
        }
    }

    /// Drive the scheduler until the task table is empty.
    ///
    /// Intended for tests. Never returns while a repeating task is armed;
    /// use [`run_for`](Self::run_for) for those.
    pub async fn run_until_idle(&self) {
        while let Some(deadline) = self.next_deadline() {
            tokio::time::sleep_until(deadline).await;
            self.fire_due(Instant::now());
        }
    }

    /// Drive the scheduler across a fixed window of time, firing everything
    /// that falls due inside it, then sleep out the remainder of the window.
    pub async fn run_for(&self, window: Duration) {
        let end = Instant::now() + window;
        loop {
            match self.next_deadline() {
                Some(deadline) if deadline <= end => {
                    tokio::time::sleep_until(deadline).await;
                    self.fire_due(Instant::now());
                }
                _ => break,
            }
        }
        tokio::time::sleep_until(end).await;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
