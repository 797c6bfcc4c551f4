//! Correlated request/response/broadcast protocol.
//!
//! Three layers, bottom up: [`envelope`] defines the wire model,
//! [`pending`] tracks outstanding requests, and [`bus`] ties the two to a
//! channel transport and the promise engine.

pub mod bus;
pub mod envelope;
pub mod pending;

pub use bus::{QueryBus, SearchReply};
pub use envelope::{Body, Envelope, EnvelopeKind};
pub use pending::{BusConfig, PendingQuery, QueryMode};
