//! Future values with one-shot settlement and ordered reaction dispatch.
//!
//! A [`Promise`] starts pending, settles exactly once as fulfilled or
//! rejected, and dispatches its reactions through the [`Scheduler`] — never
//! inline. Caller code therefore always finishes before any reaction runs,
//! whether the promise was settled before or after the reaction was attached.
//!
//! # Settlement
//!
//! ```text
//! PENDING ──resolve(Step::Value(v))──────────▶ FULFILLED(v)
//!    │
//!    ├──resolve(Step::Pending(p))──▶ adopts p's eventual state
//!    │                              (p == self rejects with SelfSettle)
//!    │
//!    └──reject(e)───────────────────────────▶ REJECTED(e)
//! ```
//!
//! Both terminal states are irreversible; later settlement attempts are
//! dropped silently. While pending, reactions queue in attachment order and
//! drain in that order on settlement.
//!
//! # Handler outcomes
//!
//! Fulfillment and rejection handlers return [`Produced`], an explicit
//! `Result` of the next [`Step`]: a plain value, a further promise the child
//! adopts, or an error rejecting the child. There is no unwinding path; a
//! failing handler can never disturb the scheduler loop or other pending
//! work.
//!
//! # Example
//!
//! ```rust,ignore
//! let promise: Promise<u32> = Promise::new(&scheduler);
//!
//! let doubled = promise.then(|value| Ok(Step::Value(value * 2)));
//! doubled.then(|value| {
//!     println!("{value}");
//!     Ok(Step::Value(()))
//! });
//!
//! promise.resolve(21);
//! scheduler.run_until_idle().await; // prints "42"
//! ```

use crate::error::PromiseError;
use crate::scheduler::Scheduler;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// A settled result: the fulfillment value or the rejection error.
pub type Outcome<T> = Result<T, PromiseError>;

/// What a handler produced: the next step, or a rejection.
pub type Produced<T> = Result<Step<T>, PromiseError>;

/// The closed sum a promise can be resolved with.
///
/// Flattening is a static match on this type: resolving with
/// `Step::Pending(p)` subscribes to `p`'s eventual state (one level), while
/// `Step::Value(v)` fulfills directly. There is no runtime capability probe
/// for "thenable" values.
pub enum Step<T> {
    /// A plain value; fulfills immediately.
    Value(T),
    /// Another promise whose eventual state is adopted.
    Pending(Promise<T>),
}

impl<T> From<T> for Step<T> {
    fn from(value: T) -> Self {
        Step::Value(value)
    }
}

impl<T> From<Promise<T>> for Step<T> {
    fn from(promise: Promise<T>) -> Self {
        Step::Pending(promise)
    }
}

type Reaction<T> = Box<dyn FnOnce(Outcome<T>)>;

enum State<T> {
    Pending(Vec<Reaction<T>>),
    Settled(Outcome<T>),
}

struct Shared<T> {
    scheduler: Scheduler,
    state: RefCell<State<T>>,
    /// Latch for the public `resolve`/`reject` pair: only the first call
    /// takes effect, even when it locks onto a still-pending promise.
    locked: Cell<bool>,
}

/// A future value container with one-shot settlement.
///
/// Cheap to clone; clones share the same settlement state. The value type
/// must be `Clone` because a settled outcome is re-delivered to every
/// attached reaction.
pub struct Promise<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Create a pending promise whose reactions dispatch via `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            shared: Rc::new(Shared {
                scheduler: scheduler.clone(),
                state: RefCell::new(State::Pending(Vec::new())),
                locked: Cell::new(false),
            }),
        }
    }

    /// Resolve with a value or another promise.
    ///
    /// Accepts anything convertible into a [`Step`]: `resolve(v)` fulfills
    /// with `v`, `resolve(other_promise)` adopts `other_promise`'s eventual
    /// state, and `resolve(self.clone())` rejects with
    /// [`PromiseError::SelfSettle`]. Only the first `resolve`/`reject` call
    /// takes effect; the rest are no-ops.
    pub fn resolve(&self, step: impl Into<Step<T>>) {
        if self.shared.locked.replace(true) {
            tracing::trace!("duplicate resolve dropped");
            return;
        }
        self.follow(step.into());
    }

    /// Reject with an error. Only the first `resolve`/`reject` call takes
    /// effect; the rest are no-ops.
    pub fn reject(&self, error: PromiseError) {
        if self.shared.locked.replace(true) {
            tracing::trace!("duplicate reject dropped");
            return;
        }
        self.settle(Err(error));
    }

    /// Whether the promise is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(*self.shared.state.borrow(), State::Pending(_))
    }

    /// The settled outcome, if any.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.shared.state.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Attach a fulfillment handler; rejection passes through untouched.
    ///
    /// Returns a new promise settled from the handler's [`Produced`] result:
    /// a value fulfills it, a returned promise is adopted, an error rejects
    /// it. The handler is never invoked synchronously.
    pub fn then<U: Clone + 'static>(
        &self,
        on_fulfilled: impl FnOnce(T) -> Produced<U> + 'static,
    ) -> Promise<U> {
        let child = Promise::new(&self.shared.scheduler);
        let target = child.clone();
        self.subscribe(Box::new(move |outcome| match outcome {
            Ok(value) => target.settle_produced(on_fulfilled(value)),
            Err(error) => target.settle(Err(error)),
        }));
        child
    }

    /// Attach a rejection handler; fulfillment passes through untouched.
    pub fn or_else(
        &self,
        on_rejected: impl FnOnce(PromiseError) -> Produced<T> + 'static,
    ) -> Promise<T> {
        let child = Promise::new(&self.shared.scheduler);
        let target = child.clone();
        self.subscribe(Box::new(move |outcome| match outcome {
            Ok(value) => target.settle(Ok(value)),
            Err(error) => target.settle_produced(on_rejected(error)),
        }));
        child
    }

    /// Attach both a fulfillment and a rejection handler.
    pub fn then_or_else<U: Clone + 'static>(
        &self,
        on_fulfilled: impl FnOnce(T) -> Produced<U> + 'static,
        on_rejected: impl FnOnce(PromiseError) -> Produced<U> + 'static,
    ) -> Promise<U> {
        let child = Promise::new(&self.shared.scheduler);
        let target = child.clone();
        self.subscribe(Box::new(move |outcome| match outcome {
            Ok(value) => target.settle_produced(on_fulfilled(value)),
            Err(error) => target.settle_produced(on_rejected(error)),
        }));
        child
    }

    /// Follow a step: fulfill with the value, or adopt the other promise.
    pub(crate) fn follow(&self, step: Step<T>) {
        match step {
            Step::Value(value) => self.settle(Ok(value)),
            Step::Pending(other) => {
                if Rc::ptr_eq(&self.shared, &other.shared) {
                    self.settle(Err(PromiseError::SelfSettle));
                } else {
                    let target = self.clone();
                    other.subscribe(Box::new(move |outcome| target.settle(outcome)));
                }
            }
        }
    }

    /// Settle from a handler's produced result.
    pub(crate) fn settle_produced(&self, produced: Produced<T>) {
        match produced {
            Ok(step) => self.follow(step),
            Err(error) => self.settle(Err(error)),
        }
    }

    /// Transition to a terminal state, draining queued reactions in
    /// attachment order. Idempotent: settling a settled promise is a no-op.
    pub(crate) fn settle(&self, outcome: Outcome<T>) {
        let reactions = {
            let mut state = self.shared.state.borrow_mut();
            match &mut *state {
                State::Pending(reactions) => {
                    let reactions = std::mem::take(reactions);
                    *state = State::Settled(outcome.clone());
                    reactions
                }
                State::Settled(_) => {
                    tracing::trace!("settlement dropped; promise already settled");
                    return;
                }
            }
        };

        for reaction in reactions {
            self.dispatch(reaction, outcome.clone());
        }
    }

    /// Register a reaction: queued while pending, scheduled immediately
    /// against the settled outcome otherwise. Never invoked synchronously.
    pub(crate) fn subscribe(&self, reaction: Reaction<T>) {
        let settled = {
            let mut state = self.shared.state.borrow_mut();
            match &mut *state {
                State::Pending(reactions) => {
                    reactions.push(reaction);
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        self.dispatch(reaction, settled);
    }

    fn dispatch(&self, reaction: Reaction<T>, outcome: Outcome<T>) {
        self.shared
            .scheduler
            .schedule(Duration::ZERO, move || reaction(outcome));
    }
}
