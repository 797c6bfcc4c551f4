//! Pending-request bookkeeping for the correlator.
//!
//! A [`PendingQuery`] tracks one outstanding request from send until it is
//! removed — by its first response in [`QueryMode::Single`], or by its
//! timeout in [`QueryMode::Gather`] (and for a `Single` that never got an
//! answer). Results accumulate here between those two points.

use crate::error::PromiseError;
use crate::payload::ResultCollection;
use crate::promise::Promise;
use std::time::Duration;

/// Resolution policy for an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// First responder wins: the promise settles on the first matching
    /// response; later responses for the same id are ignored.
    Single,
    /// Gather until timeout: every matching response accumulates; only the
    /// timeout settles the promise.
    Gather,
}

/// One outstanding request awaiting responses.
pub struct PendingQuery {
    mode: QueryMode,
    promise: Promise<ResultCollection>,
    gathered: ResultCollection,
}

impl PendingQuery {
    /// Track a freshly sent request.
    pub fn new(mode: QueryMode, promise: Promise<ResultCollection>) -> Self {
        Self {
            mode,
            promise,
            gathered: ResultCollection::new(),
        }
    }

    /// The resolution policy.
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// A handle on the caller-visible promise.
    pub fn promise(&self) -> Promise<ResultCollection> {
        self.promise.clone()
    }

    /// Absorb one decoded response into the accumulator.
    pub fn absorb(&mut self, response: ResultCollection) {
        self.gathered.extend_from(response);
    }

    /// Settle with everything gathered so far (possibly nothing). Consumes
    /// the entry; a timeout is a defined outcome, never a rejection.
    pub fn settle(self) {
        self.promise.resolve(self.gathered);
    }

    /// Settle immediately with a single response's full collection
    /// (`Single` mode fast path).
    pub fn settle_with(self, response: ResultCollection) {
        self.promise.resolve(response);
    }

    /// Reject the caller-visible promise. Used when the request could not be
    /// sent at all.
    pub fn fail(self, error: PromiseError) {
        self.promise.reject(error);
    }
}

/// Shared configuration for the query bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Timeout applied when a request does not specify one.
    pub default_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
        }
    }
}

impl BusConfig {
    /// A config with a custom default timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: timeout,
        }
    }
}
