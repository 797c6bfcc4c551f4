//! Error types for the canvass protocol core.

use thiserror::Error;

/// Rejection values carried by promises.
///
/// A rejection is re-delivered to every reaction attached to a settled
/// promise, so the type is `Clone` and keeps its payloads as plain strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromiseError {
    /// A promise was resolved with itself (settlement cycle).
    #[error("promise settled with itself")]
    SelfSettle,

    /// A fulfillment or rejection handler failed.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Explicit application-level rejection.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl PromiseError {
    /// Build an application-level rejection from any displayable value.
    pub fn rejected(reason: impl std::fmt::Display) -> Self {
        PromiseError::Rejected(reason.to_string())
    }

    /// Build a handler-failure rejection from any displayable value.
    pub fn handler(reason: impl std::fmt::Display) -> Self {
        PromiseError::Handler(reason.to_string())
    }
}

/// Errors raised when an envelope does not fit its kind's shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The envelope body does not match what its kind requires.
    #[error("unexpected body for {kind}: {detail}")]
    UnexpectedBody {
        /// Wire kind of the offending envelope.
        kind: String,
        /// What was expected or missing.
        detail: String,
    },

    /// A correlated envelope arrived without a correlation id.
    #[error("missing correlation id")]
    MissingCorrelationId,
}

/// Errors reported by channel transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel has not been joined yet.
    #[error("channel not joined")]
    NotJoined,

    /// The envelope could not be encoded for the wire.
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Delivery failed for a transport-specific reason.
    #[error("delivery failed: {0}")]
    Delivery(String),
}
