//! Scheduled task bookkeeping.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

/// Identifier for a scheduled task, unique within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Callable carried by a task.
///
/// One-shot tasks consume their closure on firing; repeating tasks keep
/// theirs and are re-armed after every fire.
pub(crate) enum TaskCall {
    Once(Option<Box<dyn FnOnce()>>),
    Repeating(Box<dyn FnMut()>),
}

/// A task owned by the scheduler's heap.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) deadline: Instant,
    /// Heap tiebreak: tasks with equal deadlines fire in scheduling order.
    pub(crate) seq: u64,
    pub(crate) period: Option<Duration>,
    pub(crate) call: TaskCall,
    pub(crate) cancelled: Rc<Cell<bool>>,
}

// Min-heap ordering by (deadline, seq); std's BinaryHeap is a max-heap, so
// comparisons are reversed here.
impl Ord for Task {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Task {}

/// Cancellation handle for a scheduled task.
///
/// Cancellation is best-effort: a cancel racing the task's own fire may
/// still observe the fire. Cancelling an already-fired one-shot task is a
/// no-op. Dropping the handle does not cancel the task.
///
/// # Example
///
/// ```rust,ignore
/// let handle = scheduler.schedule(Duration::from_secs(5), || cleanup());
/// // The work finished early, the cleanup is no longer needed.
/// handle.cancel();
/// ```
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    cancelled: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, cancelled: Rc<Cell<bool>>) -> Self {
        Self { id, cancelled }
    }

    /// The task's identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel the task if it has not fired yet.
    pub fn cancel(&self) {
        if !self.cancelled.replace(true) {
            tracing::debug!(task = %self.id, "task cancelled");
        }
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}
