//! Channel transport seam.
//!
//! The transport is an external collaborator: it owns channel membership,
//! actual delivery, and echo suppression. The core only needs the small
//! surface defined by [`ChannelTransport`]. An in-memory implementation for
//! tests and loopback use lives in [`local`].

pub mod local;

pub use local::{LocalChannel, LocalHub};

use crate::error::TransportError;
use crate::payload::SourceRef;
use crate::protocol::Envelope;
use std::rc::Rc;

/// Callback invoked for every inbound envelope not authored by self.
pub type MessageCallback = Rc<dyn Fn(Envelope)>;

/// A shared broadcast channel between peers.
///
/// Implementations must suppress echo: the callback registered with
/// [`on_message`](Self::on_message) is never invoked for envelopes this peer
/// broadcast itself.
pub trait ChannelTransport {
    /// Join the shared channel. Broadcasting before joining fails.
    fn join(&self) -> Result<(), TransportError>;

    /// Send an envelope to every other channel member.
    fn broadcast(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Register the inbound-envelope callback, replacing any previous one.
    fn on_message(&self, callback: MessageCallback);

    /// This peer's stable identity, used for echo suppression and response
    /// provenance.
    fn identity(&self) -> SourceRef;
}
