//! # Canvass
//!
//! A correlated query/response protocol for peers on a shared broadcast
//! channel, built on a single-threaded promise engine.
//!
//! ## Why Promises on a Broadcast Channel?
//!
//! A shared channel has no addressing: every peer sees every message, and a
//! query may draw zero, one, or many answers. Canvass pairs each outbound
//! query with a correlation id and a [`Promise`], then lets a timeout decide
//! when the answer set is complete. Callers get a value they can chain
//! instead of a callback soup, and a query that nobody answers still
//! resolves (with an empty collection) rather than hanging forever.
//!
//! Key properties:
//! - **Settled means done**: a promise settles exactly once; later
//!   responses for the same id are dropped
//! - **Never synchronous**: handlers always run via the [`Scheduler`], so
//!   attachment order is observable and re-entrancy is impossible
//! - **Deterministic under test**: all timing flows through tokio's clock,
//!   so paused-clock tests replay identically
//!
//! ## Core Components
//!
//! - [`Scheduler`]: single-threaded timed task queue driving everything
//! - [`Promise`] / [`Deferred`]: settle-once futures with chaining
//! - [`FieldSet`] / [`ResultCollection`]: the field-document payload model
//! - [`QueryBus`]: correlation, timeouts, handler dispatch
//! - [`ChannelTransport`] / [`LocalHub`]: the channel seam and its
//!   in-process implementation
//!
//! ## Quick Start
//!
//! ```ignore
//! use canvass::{BusConfig, FieldSet, QueryBus, Scheduler, Step};
//!
//! let scheduler = Scheduler::new();
//! let bus = QueryBus::new(&scheduler, transport, BusConfig::default());
//! bus.join()?;
//!
//! let mut query = FieldSet::new();
//! query.add_type(["http://xmlns.com/foaf/0.1/Person"]);
//!
//! bus.send_out_request(query, None, true).then(|collection| {
//!     println!("{} results", collection.len());
//!     Ok(Step::Value(()))
//! });
//!
//! scheduler.run_until_idle().await;
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod payload;
pub mod promise;
pub mod protocol;
pub mod scheduler;
pub mod transport;

pub use error::{EnvelopeError, PromiseError, TransportError};
pub use payload::{
    FieldSet, FlagDef, ResultCollection, ResultPayload, SourceRef, WireType, CLEAR_BEFORE_WRITE,
};
pub use promise::{Deferred, Outcome, Produced, Promise, Step};
pub use protocol::{Body, BusConfig, Envelope, EnvelopeKind, QueryBus, QueryMode, SearchReply};
pub use scheduler::{Scheduler, TaskHandle, TaskId};
pub use transport::{local::LocalChannel, local::LocalHub, ChannelTransport, MessageCallback};
