//! In-memory channel for tests and loopback use.
//!
//! A [`LocalHub`] plays the role of the shared channel; each peer holds a
//! [`LocalChannel`] endpoint created from the hub. Broadcasts are JSON
//! round-tripped (so the wire shape is exercised on every message) and
//! delivered to every other joined member through the scheduler, which keeps
//! delivery asynchronous relative to the sender — exactly like a real
//! channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let hub = LocalHub::new(&scheduler);
//! let alice = hub.endpoint("alice", "urn:peer:alice");
//! let bob = hub.endpoint("bob", "urn:peer:bob");
//!
//! alice.join()?;
//! bob.join()?;
//!
//! bob.on_message(Rc::new(|envelope| println!("{envelope:?}")));
//! alice.broadcast(&envelope)?; // delivered to bob on the next tick
//! ```

use crate::error::TransportError;
use crate::payload::SourceRef;
use crate::protocol::Envelope;
use crate::scheduler::Scheduler;
use crate::transport::{ChannelTransport, MessageCallback};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

struct Member {
    identity: SourceRef,
    joined: Cell<bool>,
    callback: RefCell<Option<MessageCallback>>,
}

struct HubInner {
    scheduler: Scheduler,
    members: RefCell<Vec<Rc<Member>>>,
    latency: Cell<Duration>,
}

/// The shared in-memory channel.
#[derive(Clone)]
pub struct LocalHub {
    inner: Rc<HubInner>,
}

impl LocalHub {
    /// Create a hub delivering through `scheduler` with zero latency.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(HubInner {
                scheduler: scheduler.clone(),
                members: RefCell::new(Vec::new()),
                latency: Cell::new(Duration::ZERO),
            }),
        }
    }

    /// Simulated one-way delivery latency for subsequent broadcasts.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.latency.set(latency);
    }

    /// Create a channel endpoint for a peer with the given identity.
    pub fn endpoint(&self, name: impl Into<String>, locator: impl Into<String>) -> LocalChannel {
        let member = Rc::new(Member {
            identity: SourceRef::new(name, locator),
            joined: Cell::new(false),
            callback: RefCell::new(None),
        });
        self.inner.members.borrow_mut().push(Rc::clone(&member));
        LocalChannel {
            hub: Rc::downgrade(&self.inner),
            member,
        }
    }

    fn deliver(&self, from: &SourceRef, envelope: &Envelope) -> Result<(), TransportError> {
        // JSON round-trip: receivers get what the wire would have carried.
        let wire = serde_json::to_string(envelope)?;

        for member in self.inner.members.borrow().iter() {
            if !member.joined.get() || member.identity == *from {
                continue;
            }
            let Some(callback) = member.callback.borrow().clone() else {
                continue;
            };
            let decoded: Envelope = serde_json::from_str(&wire)?;
            self.inner
                .scheduler
                .schedule(self.inner.latency.get(), move || callback(decoded));
        }
        Ok(())
    }
}

/// One peer's endpoint on a [`LocalHub`].
pub struct LocalChannel {
    hub: Weak<HubInner>,
    member: Rc<Member>,
}

impl ChannelTransport for LocalChannel {
    fn join(&self) -> Result<(), TransportError> {
        self.member.joined.set(true);
        tracing::debug!(peer = %self.member.identity.name, "joined channel");
        Ok(())
    }

    fn broadcast(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.member.joined.get() {
            return Err(TransportError::NotJoined);
        }
        let hub = self
            .hub
            .upgrade()
            .ok_or_else(|| TransportError::Delivery("channel hub is gone".into()))?;
        tracing::trace!(
            peer = %self.member.identity.name,
            kind = %envelope.kind,
            "broadcast"
        );
        LocalHub { inner: hub }.deliver(&self.member.identity, envelope)
    }

    fn on_message(&self, callback: MessageCallback) {
        *self.member.callback.borrow_mut() = Some(callback);
    }

    fn identity(&self) -> SourceRef {
        self.member.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FieldSet;
    use crate::protocol::EnvelopeKind;

    fn notification() -> Envelope {
        Envelope::notification(EnvelopeKind::Create, FieldSet::about("urn:a"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_reaches_other_members_only() {
        let scheduler = Scheduler::new();
        let hub = LocalHub::new(&scheduler);
        let alice = hub.endpoint("alice", "urn:peer:alice");
        let bob = hub.endpoint("bob", "urn:peer:bob");

        alice.join().unwrap();
        bob.join().unwrap();

        let alice_seen = Rc::new(Cell::new(0u32));
        let bob_seen = Rc::new(Cell::new(0u32));

        let counter = Rc::clone(&alice_seen);
        alice.on_message(Rc::new(move |_| counter.set(counter.get() + 1)));
        let counter = Rc::clone(&bob_seen);
        bob.on_message(Rc::new(move |_| counter.set(counter.get() + 1)));

        alice.broadcast(&notification()).unwrap();
        scheduler.run_until_idle().await;

        assert_eq!(alice_seen.get(), 0, "echo must be suppressed");
        assert_eq!(bob_seen.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_is_asynchronous() {
        let scheduler = Scheduler::new();
        let hub = LocalHub::new(&scheduler);
        let alice = hub.endpoint("alice", "urn:peer:alice");
        let bob = hub.endpoint("bob", "urn:peer:bob");

        alice.join().unwrap();
        bob.join().unwrap();

        let seen = Rc::new(Cell::new(false));
        let seen_clone = Rc::clone(&seen);
        bob.on_message(Rc::new(move |_| seen_clone.set(true)));

        alice.broadcast(&notification()).unwrap();
        assert!(!seen.get(), "delivery happened inside broadcast()");

        scheduler.run_until_idle().await;
        assert!(seen.get());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_before_join_fails() {
        let scheduler = Scheduler::new();
        let hub = LocalHub::new(&scheduler);
        let alice = hub.endpoint("alice", "urn:peer:alice");

        let result = alice.broadcast(&notification());
        assert!(matches!(result, Err(TransportError::NotJoined)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unjoined_member_receives_nothing() {
        let scheduler = Scheduler::new();
        let hub = LocalHub::new(&scheduler);
        let alice = hub.endpoint("alice", "urn:peer:alice");
        let bob = hub.endpoint("bob", "urn:peer:bob");

        alice.join().unwrap();

        let seen = Rc::new(Cell::new(false));
        let seen_clone = Rc::clone(&seen);
        bob.on_message(Rc::new(move |_| seen_clone.set(true)));

        alice.broadcast(&notification()).unwrap();
        scheduler.run_until_idle().await;
        assert!(!seen.get());
    }
}
