//! The query bus: correlated request/response/broadcast over a shared
//! channel.
//!
//! # Architecture
//!
//! ```text
//! caller ──send_out_request──▶ QueryBus
//!                              │ 1. fresh correlation id
//!                              │ 2. register PendingQuery
//!                              │ 3. broadcast Envelope{Request, id, fields}
//!                              │ 4. arm timeout task on the Scheduler
//!                              ▼
//!                        Promise<ResultCollection>   (returned immediately)
//!
//! transport ──inbound Response──▶ QueryBus
//!                                 │ lookup by correlation id
//!                                 ├─ Single: settle promise, remove entry
//!                                 └─ Gather: absorb, wait for timeout
//! ```
//!
//! Inbound requests fan out to locally registered handlers. Every handler
//! runs via [`Scheduler::defer`], so one handler's failure cannot abort
//! dispatch to the others or to later envelopes. Non-empty replies are
//! broadcast back tagged with the inbound correlation id; an empty or absent
//! reply sends nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = QueryBus::new(&scheduler, Rc::new(channel), BusConfig::default());
//! bus.join()?;
//!
//! bus.add_request_handler(|query| Ok(Step::Value(Some(answer(query)))));
//!
//! let mut query = FieldSet::new();
//! query.add_type(["http://xmlns.com/foaf/0.1/Person"]);
//!
//! bus.send_out_request(query, None, true).then(|collection| {
//!     for result in collection.iter() {
//!         println!("{}", result.about);
//!     }
//!     Ok(Step::Value(()))
//! });
//! ```

use crate::error::{PromiseError, TransportError};
use crate::payload::{FieldSet, ResultCollection, SourceRef};
use crate::promise::{Produced, Promise, Step};
use crate::protocol::envelope::{Envelope, EnvelopeKind};
use crate::protocol::pending::{BusConfig, PendingQuery, QueryMode};
use crate::scheduler::Scheduler;
use crate::transport::ChannelTransport;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use uuid::Uuid;

/// A search handler's reply: the results plus an optional locator URI the
/// requester can use to re-query this peer directly.
#[derive(Debug, Clone)]
pub struct SearchReply {
    /// Results answering the search.
    pub results: ResultCollection,
    /// Queryable locator advertised to the requester. Falls back to the
    /// transport identity's locator when absent.
    pub locator: Option<String>,
}

impl SearchReply {
    /// A reply advertising no dedicated locator.
    pub fn new(results: ResultCollection) -> Self {
        Self {
            results,
            locator: None,
        }
    }

    /// A reply advertising `locator`.
    pub fn with_locator(results: ResultCollection, locator: impl Into<String>) -> Self {
        Self {
            results,
            locator: Some(locator.into()),
        }
    }
}

type RequestHandlerFn = dyn Fn(FieldSet) -> Produced<Option<ResultCollection>>;
type SearchHandlerFn = dyn Fn(FieldSet) -> Produced<Option<SearchReply>>;
type NotifyHandlerFn = dyn Fn(FieldSet) -> Produced<()>;

struct BusInner {
    scheduler: Scheduler,
    transport: Rc<dyn ChannelTransport>,
    config: BusConfig,
    pending: RefCell<HashMap<String, PendingQuery>>,
    request_handlers: RefCell<Vec<Rc<RequestHandlerFn>>>,
    search_handlers: RefCell<Vec<Rc<SearchHandlerFn>>>,
    create_handlers: RefCell<Vec<Rc<NotifyHandlerFn>>>,
    update_handlers: RefCell<Vec<Rc<NotifyHandlerFn>>>,
}

/// Correlated request/response/broadcast endpoint for one peer.
///
/// Cheap to clone; clones share the same pending-request table and handler
/// registries. Timeout tasks and the transport callback hold weak
/// references, so dropping every bus handle tears the bus down.
#[derive(Clone)]
pub struct QueryBus {
    inner: Rc<BusInner>,
}

impl QueryBus {
    /// Create a bus over `transport`, timing everything through
    /// `scheduler`.
    pub fn new(scheduler: &Scheduler, transport: Rc<dyn ChannelTransport>, config: BusConfig) -> Self {
        Self {
            inner: Rc::new(BusInner {
                scheduler: scheduler.clone(),
                transport,
                config,
                pending: RefCell::new(HashMap::new()),
                request_handlers: RefCell::new(Vec::new()),
                search_handlers: RefCell::new(Vec::new()),
                create_handlers: RefCell::new(Vec::new()),
                update_handlers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Hook up inbound dispatch and join the shared channel.
    pub fn join(&self) -> Result<(), TransportError> {
        let weak = Rc::downgrade(&self.inner);
        self.inner.transport.on_message(Rc::new(move |envelope| {
            if let Some(inner) = weak.upgrade() {
                QueryBus { inner }.handle_envelope(envelope);
            }
        }));
        self.inner.transport.join()
    }

    /// This peer's channel identity.
    pub fn identity(&self) -> SourceRef {
        self.inner.transport.identity()
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Broadcast a correlated request and return a promise for its results.
    ///
    /// With `allow_multiple` false the promise settles on the first matching
    /// response (later ones are ignored); with it true every response
    /// accumulates until the timeout. Either way the timeout settles the
    /// promise with whatever has been gathered — possibly an empty
    /// collection, never a rejection. `timeout` falls back to the bus
    /// config's default.
    pub fn send_out_request(
        &self,
        fields: FieldSet,
        timeout: Option<Duration>,
        allow_multiple: bool,
    ) -> Promise<ResultCollection> {
        let mode = if allow_multiple {
            QueryMode::Gather
        } else {
            QueryMode::Single
        };
        self.send_query(EnvelopeKind::Request, fields, timeout, mode)
    }

    /// Broadcast a search canvassing every peer; always gathers until the
    /// timeout.
    pub fn send_out_search(
        &self,
        fields: FieldSet,
        timeout: Option<Duration>,
    ) -> Promise<ResultCollection> {
        self.send_query(EnvelopeKind::SearchRequest, fields, timeout, QueryMode::Gather)
    }

    fn send_query(
        &self,
        kind: EnvelopeKind,
        fields: FieldSet,
        timeout: Option<Duration>,
        mode: QueryMode,
    ) -> Promise<ResultCollection> {
        let correlation_id = Uuid::new_v4().to_string();
        let timeout = timeout.unwrap_or(self.inner.config.default_timeout);

        let promise = Promise::new(&self.inner.scheduler);
        let entry = PendingQuery::new(mode, promise.clone());

        let envelope = Envelope::request(kind, correlation_id.clone(), fields);
        if let Err(error) = self.inner.transport.broadcast(&envelope) {
            tracing::warn!(%error, %kind, "failed to broadcast query");
            entry.fail(PromiseError::rejected(error));
            return promise;
        }

        tracing::debug!(
            correlation_id = %correlation_id,
            %kind,
            ?mode,
            ?timeout,
            "query sent"
        );
        self.inner
            .pending
            .borrow_mut()
            .insert(correlation_id.clone(), entry);

        let weak = Rc::downgrade(&self.inner);
        self.inner.scheduler.schedule(timeout, move || {
            if let Some(inner) = weak.upgrade() {
                QueryBus { inner }.finish_query(&correlation_id);
            }
        });

        promise
    }

    /// Settle an outstanding request with whatever has accumulated. Guarded:
    /// firing after the entry was already removed is a no-op.
    fn finish_query(&self, correlation_id: &str) {
        match self.inner.pending.borrow_mut().remove(correlation_id) {
            Some(entry) => {
                tracing::debug!(correlation_id, "query timed out; settling with gathered results");
                entry.settle();
            }
            None => {
                tracing::trace!(correlation_id, "timeout for already-settled query");
            }
        }
    }

    /// Broadcast an unsolicited creation notification. Fire-and-forget.
    pub fn publish_create(&self, fields: FieldSet) {
        self.publish(EnvelopeKind::Create, fields);
    }

    /// Broadcast an unsolicited update notification. Fire-and-forget.
    pub fn publish_update(&self, fields: FieldSet) {
        self.publish(EnvelopeKind::Update, fields);
    }

    /// Republish every result in a collection as an individual create or
    /// update notification.
    pub fn publish_all_results(&self, collection: &ResultCollection, created: bool) {
        for result in collection.iter() {
            if created {
                self.publish_create(result.to_field_set());
            } else {
                self.publish_update(result.to_field_set());
            }
        }
    }

    fn publish(&self, kind: EnvelopeKind, fields: FieldSet) {
        let envelope = Envelope::notification(kind, fields);
        if let Err(error) = self.inner.transport.broadcast(&envelope) {
            tracing::warn!(%error, %kind, "failed to broadcast notification");
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Register a listener for inbound requests. A `Some` non-empty return
    /// becomes the payload of an automatically-sent response; `None` or an
    /// empty collection sends nothing.
    pub fn add_request_handler(
        &self,
        handler: impl Fn(FieldSet) -> Produced<Option<ResultCollection>> + 'static,
    ) {
        self.inner
            .request_handlers
            .borrow_mut()
            .push(Rc::new(handler));
    }

    /// Register a listener for inbound searches. Like a request handler,
    /// but the reply may advertise a locator URI folded into the response's
    /// source provenance.
    pub fn add_search_handler(
        &self,
        handler: impl Fn(FieldSet) -> Produced<Option<SearchReply>> + 'static,
    ) {
        self.inner
            .search_handlers
            .borrow_mut()
            .push(Rc::new(handler));
    }

    /// Register a listener for creation notifications.
    pub fn add_create_handler(&self, handler: impl Fn(FieldSet) -> Produced<()> + 'static) {
        self.inner
            .create_handlers
            .borrow_mut()
            .push(Rc::new(handler));
    }

    /// Register a listener for update notifications.
    pub fn add_update_handler(&self, handler: impl Fn(FieldSet) -> Produced<()> + 'static) {
        self.inner
            .update_handlers
            .borrow_mut()
            .push(Rc::new(handler));
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn handle_envelope(&self, envelope: Envelope) {
        tracing::trace!(kind = %envelope.kind, "inbound envelope");
        match envelope.kind {
            EnvelopeKind::Request => self.dispatch_request(envelope),
            EnvelopeKind::SearchRequest => self.dispatch_search(envelope),
            EnvelopeKind::Response | EnvelopeKind::SearchResponse => {
                self.handle_response(envelope)
            }
            EnvelopeKind::Create => self.dispatch_notification(envelope, true),
            EnvelopeKind::Update => self.dispatch_notification(envelope, false),
            EnvelopeKind::Unknown => {
                tracing::debug!("ignoring envelope with unknown kind");
            }
        }
    }

    fn dispatch_request(&self, envelope: Envelope) {
        let Some((fields, correlation_id)) = Self::query_parts(&envelope) else {
            return;
        };

        let handlers = self.inner.request_handlers.borrow().clone();
        for handler in handlers {
            let fields = fields.clone();
            let correlation_id = correlation_id.clone();
            let weak = Rc::downgrade(&self.inner);

            self.inner
                .scheduler
                .defer(move || handler(fields))
                .then(move |reply| {
                    if let Some(results) = reply {
                        if !results.is_empty() {
                            if let Some(inner) = weak.upgrade() {
                                QueryBus { inner }.send_reply(
                                    EnvelopeKind::Response,
                                    correlation_id,
                                    results,
                                    None,
                                );
                            }
                        }
                    }
                    Ok(Step::Value(()))
                })
                .or_else(|error| {
                    tracing::warn!(%error, "request handler failed");
                    Ok(Step::Value(()))
                });
        }
    }

    fn dispatch_search(&self, envelope: Envelope) {
        let Some((fields, correlation_id)) = Self::query_parts(&envelope) else {
            return;
        };

        let handlers = self.inner.search_handlers.borrow().clone();
        for handler in handlers {
            let fields = fields.clone();
            let correlation_id = correlation_id.clone();
            let weak = Rc::downgrade(&self.inner);

            self.inner
                .scheduler
                .defer(move || handler(fields))
                .then(move |reply| {
                    if let Some(reply) = reply {
                        if !reply.results.is_empty() {
                            if let Some(inner) = weak.upgrade() {
                                let bus = QueryBus { inner };
                                let identity = bus.identity();
                                let source = SourceRef::new(
                                    identity.name,
                                    reply.locator.unwrap_or(identity.locator),
                                );
                                bus.send_reply(
                                    EnvelopeKind::SearchResponse,
                                    correlation_id,
                                    reply.results,
                                    Some(source),
                                );
                            }
                        }
                    }
                    Ok(Step::Value(()))
                })
                .or_else(|error| {
                    tracing::warn!(%error, "search handler failed");
                    Ok(Step::Value(()))
                });
        }
    }

    fn dispatch_notification(&self, envelope: Envelope, created: bool) {
        let Some(fields) = envelope.fields().cloned() else {
            tracing::debug!(kind = %envelope.kind, "ignoring notification without field body");
            return;
        };

        let handlers = if created {
            self.inner.create_handlers.borrow().clone()
        } else {
            self.inner.update_handlers.borrow().clone()
        };

        for handler in handlers {
            let fields = fields.clone();
            self.inner
                .scheduler
                .defer(move || handler(fields))
                .or_else(|error| {
                    tracing::warn!(%error, "notification handler failed");
                    Ok(Step::Value(()))
                });
        }
    }

    fn handle_response(&self, envelope: Envelope) {
        let correlation_id = match envelope.expect_correlation_id() {
            Ok(id) => id.to_owned(),
            Err(error) => {
                tracing::debug!(kind = %envelope.kind, %error, "ignoring malformed response");
                return;
            }
        };
        let mut results = match envelope.expect_results() {
            Ok(results) => results.clone(),
            Err(error) => {
                tracing::debug!(
                    kind = %envelope.kind,
                    correlation_id,
                    %error,
                    "ignoring malformed response"
                );
                return;
            }
        };
        if let Some(source) = envelope.source {
            results.add_source(source);
        }

        let mut pending = self.inner.pending.borrow_mut();
        let Some(mode) = pending.get(&correlation_id).map(PendingQuery::mode) else {
            tracing::trace!(correlation_id, "ignoring response for unknown correlation id");
            return;
        };

        match mode {
            QueryMode::Single => {
                // First responder wins; the entry leaves the table so later
                // responses for this id fall into the unknown-id path.
                if let Some(entry) = pending.remove(&correlation_id) {
                    drop(pending);
                    tracing::debug!(correlation_id, "single-mode response; settling");
                    entry.settle_with(results);
                }
            }
            QueryMode::Gather => {
                tracing::debug!(correlation_id, count = results.len(), "gathered response");
                if let Some(entry) = pending.get_mut(&correlation_id) {
                    entry.absorb(results);
                }
            }
        }
    }

    fn send_reply(
        &self,
        kind: EnvelopeKind,
        correlation_id: String,
        results: ResultCollection,
        source: Option<SourceRef>,
    ) {
        let envelope = Envelope::response(kind, correlation_id, results, source);
        if let Err(error) = self.inner.transport.broadcast(&envelope) {
            tracing::warn!(%error, kind = %envelope.kind, "failed to broadcast reply");
        }
    }

    fn query_parts(envelope: &Envelope) -> Option<(FieldSet, String)> {
        let parts = envelope
            .expect_fields()
            .and_then(|fields| Ok((fields, envelope.expect_correlation_id()?)));
        match parts {
            Ok((fields, correlation_id)) => Some((fields.clone(), correlation_id.to_owned())),
            Err(error) => {
                tracing::debug!(kind = %envelope.kind, %error, "ignoring malformed query");
                None
            }
        }
    }
}
