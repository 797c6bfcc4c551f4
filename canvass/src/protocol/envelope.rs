//! Wire envelope for channel traffic.
//!
//! The envelope is the single logical unit exchanged on the shared channel:
//! a kind discriminant, an optional correlation id pairing requests with
//! their responses, an optional body, and optional source provenance for
//! responses that identify their responder.

use crate::error::EnvelopeError;
use crate::payload::{FieldSet, ResultCollection, SourceRef};
use serde::{Deserialize, Serialize};

/// Wire kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Correlated query expecting one authoritative answer.
    Request,
    /// Answer to a [`Request`](Self::Request).
    Response,
    /// Unsolicited notification that a node was created.
    Create,
    /// Unsolicited notification that a node was updated.
    Update,
    /// Correlated query canvassing every peer.
    SearchRequest,
    /// Answer to a [`SearchRequest`](Self::SearchRequest), optionally
    /// carrying a source locator.
    SearchResponse,
    /// Anything this peer does not understand. Logged and ignored.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EnvelopeKind::Request => "request",
            EnvelopeKind::Response => "response",
            EnvelopeKind::Create => "create",
            EnvelopeKind::Update => "update",
            EnvelopeKind::SearchRequest => "search_request",
            EnvelopeKind::SearchResponse => "search_response",
            EnvelopeKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Envelope body.
///
/// Requests and notifications carry a field-set document describing what is
/// asked for or announced; responses carry the result collection answering a
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    /// A field-set document.
    Fields(FieldSet),
    /// A result collection.
    Results(ResultCollection),
}

/// The logical unit exchanged on the shared channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire kind.
    pub kind: EnvelopeKind,

    /// Token pairing a request with its response(s). Absent on
    /// notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,

    /// Responder identity, on responses that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

impl Envelope {
    /// A correlated request envelope.
    pub fn request(kind: EnvelopeKind, correlation_id: impl Into<String>, fields: FieldSet) -> Self {
        Self {
            kind,
            correlation_id: Some(correlation_id.into()),
            body: Some(Body::Fields(fields)),
            source: None,
        }
    }

    /// A correlated response envelope.
    pub fn response(
        kind: EnvelopeKind,
        correlation_id: impl Into<String>,
        results: ResultCollection,
        source: Option<SourceRef>,
    ) -> Self {
        Self {
            kind,
            correlation_id: Some(correlation_id.into()),
            body: Some(Body::Results(results)),
            source,
        }
    }

    /// An uncorrelated notification envelope.
    pub fn notification(kind: EnvelopeKind, fields: FieldSet) -> Self {
        Self {
            kind,
            correlation_id: None,
            body: Some(Body::Fields(fields)),
            source: None,
        }
    }

    /// The field-set body, if this envelope carries one.
    pub fn fields(&self) -> Option<&FieldSet> {
        match &self.body {
            Some(Body::Fields(fields)) => Some(fields),
            _ => None,
        }
    }

    /// The result-collection body, if this envelope carries one.
    pub fn results(&self) -> Option<&ResultCollection> {
        match &self.body {
            Some(Body::Results(results)) => Some(results),
            _ => None,
        }
    }

    /// The field-set body a query envelope must carry.
    pub fn expect_fields(&self) -> Result<&FieldSet, EnvelopeError> {
        self.fields().ok_or_else(|| EnvelopeError::UnexpectedBody {
            kind: self.kind.to_string(),
            detail: "field-set body required".into(),
        })
    }

    /// The result-collection body a response envelope must carry.
    pub fn expect_results(&self) -> Result<&ResultCollection, EnvelopeError> {
        self.results().ok_or_else(|| EnvelopeError::UnexpectedBody {
            kind: self.kind.to_string(),
            detail: "result-collection body required".into(),
        })
    }

    /// The correlation id a correlated envelope must carry.
    pub fn expect_correlation_id(&self) -> Result<&str, EnvelopeError> {
        self.correlation_id
            .as_deref()
            .ok_or(EnvelopeError::MissingCorrelationId)
    }
}
