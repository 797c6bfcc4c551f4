//! Deferred execution of a thunk into a promise.
//!
//! A [`Deferred`] is the ephemeral unit pairing one zero-argument thunk with
//! exactly one target promise. Running it executes the thunk and settles the
//! target with whatever was produced: a plain value, a further promise the
//! target adopts, or an error rejecting it.
//!
//! [`Scheduler::defer`] is the usual entry point: it queues a `Deferred` at
//! delay zero and hands back the target promise, so the caller can never
//! observe the result synchronously.

use crate::promise::core::{Produced, Promise};
use crate::scheduler::Scheduler;
use std::time::Duration;

/// One thunk, one target promise.
pub struct Deferred<T: Clone + 'static> {
    target: Promise<T>,
    thunk: Box<dyn FnOnce() -> Produced<T>>,
}

impl<T: Clone + 'static> Deferred<T> {
    /// Pair `thunk` with `target`.
    pub fn new(target: Promise<T>, thunk: impl FnOnce() -> Produced<T> + 'static) -> Self {
        Self {
            target,
            thunk: Box::new(thunk),
        }
    }

    /// A handle on the target promise.
    pub fn promise(&self) -> Promise<T> {
        self.target.clone()
    }

    /// Execute the thunk and settle the target.
    pub fn run(self) {
        let produced = (self.thunk)();
        self.target.settle_produced(produced);
    }
}

impl Scheduler {
    /// Run `thunk` at the next opportunity and return a promise for its
    /// result.
    ///
    /// The thunk runs inside a [`Deferred`] on this scheduler at delay zero;
    /// the promise is returned immediately and settles only once the
    /// scheduler fires.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let promise = scheduler.defer(|| Ok(Step::Value(compute())));
    /// promise.then(|value| {
    ///     println!("{value:?}");
    ///     Ok(Step::Value(()))
    /// });
    /// ```
    pub fn defer<T: Clone + 'static>(
        &self,
        thunk: impl FnOnce() -> Produced<T> + 'static,
    ) -> Promise<T> {
        let deferred = Deferred::new(Promise::new(self), thunk);
        let promise = deferred.promise();
        self.schedule(Duration::ZERO, move || deferred.run());
        promise
    }
}
