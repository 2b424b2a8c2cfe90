//! Request correlation engine.
//!
//! Owns the request id counter, the pending request table and the
//! subscription and registration tables. It is plain data driven by the
//! dispatcher, which serializes every call into it; nothing in here locks.
//!
//! Replies are matched by `(category, request id)`; ERROR replies carry the
//! original request type and are matched the same way. EVENT and INVOCATION
//! are not replies and are routed by the broker/dealer-assigned ids instead.
//!
//! Removal is two-phase. A broker subscription or dealer registration whose
//! UNSUBSCRIBE/UNREGISTER is in flight cannot be released a second time, and
//! a SUBSCRIBED naming such a subscription is held back and subscribed again
//! once the removal is confirmed.

mod pending;
mod tables;

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::{mpsc, oneshot};

use crate::handler::{CallResult, InvocationHandler};
use crate::protocol::{
    ErrorMessage, Event, IdGenerator, Invocation, Message, MessageKind, Payload, RegistrationId,
    RequestId, Subscribe, SubscriptionId, Unregister, Unsubscribe,
};
use crate::{log_debug, log_trace, log_warn, RemoteError, WampError, WireMap};

pub(crate) use pending::{Category, Completion, Subscribed};
pub(crate) use tables::LocalId;

use pending::PendingRequests;
use tables::{RegistrationTable, SubscriptionTable};

/// Error URI returned to the dealer for an invocation nobody registered.
pub const NO_SUCH_REGISTRATION: &str = "wamp.error.no_such_registration";

/// Timed-out subscribe/register requests remembered for late replies.
const ABANDONED_LIMIT: usize = 256;

/// An EVENT or INVOCATION that matched no local subscription or
/// registration.
///
/// Usually a benign race with an unsubscribe/unregister still in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Orphan {
    Event(Event),
    Invocation(Invocation),
}

/// Follow-up work the dispatcher performs outside the engine.
pub(crate) enum Action {
    /// Run a callee handler on its own task.
    Invoke {
        handler: InvocationHandler,
        invocation: Invocation,
    },
    /// Send messages to the router, in order.
    Send(Vec<Message>),
}

impl Action {
    fn send(messages: Vec<Message>) -> Option<Action> {
        (!messages.is_empty()).then_some(Action::Send(messages))
    }
}

/// Outcome of releasing one local subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// No such local subscription, or its UNSUBSCRIBE is already in flight.
    Unknown,
    /// Removed; other local subscriptions still share the broker id.
    Released,
    /// The last local subscription; an UNSUBSCRIBE must be sent.
    Last,
}

pub(crate) struct Engine {
    // ---
    ids: IdGenerator,
    pending: PendingRequests,
    subscriptions: SubscriptionTable,
    registrations: RegistrationTable,
    /// Broker ids with an UNSUBSCRIBE in flight, and the subscribes the
    /// router confirmed onto them meanwhile.
    unsubscribing: HashMap<SubscriptionId, Vec<Completion>>,
    /// Registrations with an UNREGISTER in flight.
    unregistering: HashSet<RegistrationId>,
    /// Subscribe/register requests given up after a timeout.
    abandoned: VecDeque<(RequestId, Category)>,
    orphans: Option<mpsc::UnboundedSender<Orphan>>,
    orphans_taken: bool,
}

impl Engine {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            ids: IdGenerator::new(),
            pending: PendingRequests::new(),
            subscriptions: SubscriptionTable::new(),
            registrations: RegistrationTable::new(),
            unsubscribing: HashMap::new(),
            unregistering: HashSet::new(),
            abandoned: VecDeque::new(),
            orphans: None,
            orphans_taken: false,
        }
    }

    /// Fresh request id, never one that is pending or awaiting a late reply.
    pub fn allocate(&mut self) -> RequestId {
        // ---
        let pending = &self.pending;
        let abandoned = &self.abandoned;
        self.ids
            .next_free(|id| pending.contains(id) || abandoned.iter().any(|(a, _)| *a == id))
    }

    pub fn track(&mut self, id: RequestId, completion: Completion) {
        self.pending.insert(id, completion);
    }

    /// Drop a pending entry whose request frame never reached the wire.
    ///
    /// An unsent UNSUBSCRIBE or UNREGISTER leaves the entry active.
    pub fn forget(&mut self, id: RequestId) -> bool {
        // ---
        let Some(entry) = self.pending.remove(id) else {
            return false;
        };

        match entry.completion {
            Completion::Unsubscribe { subscription, .. } => self.restore_subscription(subscription),
            Completion::Unregister { registration, .. } => self.restore_registration(registration),
            _ => {}
        }
        true
    }

    /// Give up on a request whose reply did not arrive in time.
    ///
    /// A late reply is dropped, except SUBSCRIBED and REGISTERED: those are
    /// undone with an UNSUBSCRIBE/UNREGISTER of their own. A timed-out
    /// removal counts as done locally.
    pub fn abandon(&mut self, id: RequestId) -> Option<Action> {
        // ---
        let entry = self.pending.remove(id)?;
        let category = entry.completion.category();
        log_debug!("request {id} ({category:?}) abandoned after timeout");

        match entry.completion {
            Completion::Subscribe { .. } | Completion::Register { .. } => {
                if self.abandoned.len() == ABANDONED_LIMIT {
                    self.abandoned.pop_front();
                }
                self.abandoned.push_back((id, category));
                None
            }
            Completion::Unsubscribe {
                subscription,
                local,
                ..
            } => {
                if let Some(local) = local {
                    self.subscriptions.remove_local(subscription, local);
                }
                Action::send(self.finish_release(subscription))
            }
            Completion::Unregister { registration, .. } => {
                self.registrations.remove(registration);
                self.unregistering.remove(&registration);
                None
            }
            Completion::Call(_) | Completion::Publish(_) => None,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Open the orphan sink. Only the first caller gets the receiver.
    pub fn take_orphans(&mut self) -> Option<mpsc::UnboundedReceiver<Orphan>> {
        // ---
        if self.orphans_taken {
            return None;
        }
        self.orphans_taken = true;

        let (tx, rx) = mpsc::unbounded_channel();
        self.orphans = Some(tx);
        Some(rx)
    }

    /// Release one local subscription.
    ///
    /// Only the last local subscription of a broker id stays in the table
    /// until UNSUBSCRIBED confirms the removal; until then the broker id is
    /// marked and cannot be released again.
    pub fn release_subscription(&mut self, subscription: SubscriptionId, local: LocalId) -> Release {
        // ---
        if self.unsubscribing.contains_key(&subscription)
            || !self.subscriptions.contains(subscription, local)
        {
            return Release::Unknown;
        }
        if self.subscriptions.local_count(subscription) > 1 {
            self.subscriptions.remove_local(subscription, local);
            return Release::Released;
        }
        self.unsubscribing.insert(subscription, Vec::new());
        Release::Last
    }

    /// Undo [`release_subscription`](Self::release_subscription) for an
    /// UNSUBSCRIBE that was never sent.
    pub fn restore_subscription(&mut self, subscription: SubscriptionId) {
        // ---
        let Some(held) = self.unsubscribing.remove(&subscription) else {
            return;
        };

        // The broker subscription stays, so the held subscribes are valid.
        for completion in held {
            if let Completion::Subscribe {
                topic,
                handler,
                reply,
                ..
            } = completion
            {
                if reply.is_closed() {
                    continue;
                }
                let local = self.subscriptions.add(subscription, topic, handler);
                let _ = reply.send(Ok(Subscribed {
                    subscription,
                    local,
                }));
            }
        }
    }

    /// Mark `registration` for removal. False when it is not active or an
    /// UNREGISTER for it is already in flight.
    pub fn release_registration(&mut self, registration: RegistrationId) -> bool {
        self.registrations.contains(registration) && self.unregistering.insert(registration)
    }

    /// Undo [`release_registration`](Self::release_registration) for an
    /// UNREGISTER that was never sent.
    pub fn restore_registration(&mut self, registration: RegistrationId) {
        self.unregistering.remove(&registration);
    }

    /// Fail every pending request with `err` and discard all subscriptions
    /// and registrations. Returns the number of requests failed.
    pub fn sweep(&mut self, err: &WampError) -> usize {
        // ---
        let drained = self.pending.drain();
        let mut count = drained.len();

        for (_id, entry) in drained {
            log_trace!("failing request {_id}: {err}");
            entry.completion.fail(err.duplicate());
        }
        for (_subscription, held) in self.unsubscribing.drain() {
            count += held.len();
            for completion in held {
                completion.fail(err.duplicate());
            }
        }

        self.subscriptions.clear();
        self.registrations.clear();
        self.unregistering.clear();
        self.abandoned.clear();
        count
    }

    /// Route one inbound router-to-client message other than the session
    /// lifecycle kinds.
    pub fn route(&mut self, message: Message) -> Option<Action> {
        // ---
        let category = match &message {
            Message::Event(_) | Message::Invocation(_) => None,
            Message::Result(_) => Some(Category::Call),
            Message::Published(_) => Some(Category::Publish),
            Message::Subscribed(_) => Some(Category::Subscribe),
            Message::Unsubscribed(_) => Some(Category::Unsubscribe),
            Message::Registered(_) => Some(Category::Register),
            Message::Unregistered(_) => Some(Category::Unregister),
            Message::Error(m) => match Category::from_request_kind(m.request_type) {
                Some(category) => Some(category),
                None => {
                    log_warn!(
                        "ERROR for {} request {} cannot answer anything; dropped",
                        m.request_type,
                        m.request
                    );
                    return None;
                }
            },
            other => {
                log_warn!("{} is not routable; dropped", other.kind());
                return None;
            }
        };

        match (category, message) {
            (None, Message::Event(event)) => {
                self.route_event(event);
                None
            }
            (None, Message::Invocation(invocation)) => self.route_invocation(invocation),
            (Some(category), reply) => self.route_reply(category, reply),
            (None, _other) => None,
        }
    }

    fn route_event(&mut self, event: Event) {
        // ---
        if let Err(event) = self.subscriptions.deliver(event) {
            log_warn!(
                "EVENT for unknown subscription {} (publication {})",
                event.subscription,
                event.publication
            );
            self.orphan(Orphan::Event(event));
        }
    }

    fn route_invocation(&mut self, invocation: Invocation) -> Option<Action> {
        // ---
        if let Some((handler, _procedure)) = self.registrations.get(invocation.registration) {
            log_trace!("invocation {} for {_procedure}", invocation.request);
            return Some(Action::Invoke {
                handler,
                invocation,
            });
        }

        log_warn!(
            "INVOCATION {} for unknown registration {}",
            invocation.request,
            invocation.registration
        );

        let reply = Message::Error(ErrorMessage {
            request_type: MessageKind::Invocation,
            request: invocation.request,
            details: WireMap::new(),
            error: NO_SUCH_REGISTRATION.to_owned(),
            payload: Payload::default(),
        });
        self.orphan(Orphan::Invocation(invocation));
        Some(Action::Send(vec![reply]))
    }

    fn orphan(&mut self, orphan: Orphan) {
        // ---
        if let Some(sink) = &self.orphans {
            if sink.send(orphan).is_err() {
                self.orphans = None;
            }
        }
    }

    fn route_reply(&mut self, category: Category, reply: Message) -> Option<Action> {
        // ---
        let id = reply.request_id()?;

        let entry = match self.pending.take_matching(id, category) {
            Ok(entry) => entry,
            Err(actual) => {
                let late = self
                    .abandoned
                    .iter()
                    .position(|&(a, c)| a == id && c == category);
                if let Some(index) = late {
                    self.abandoned.remove(index);
                    return self.undo_late(reply);
                }

                match actual {
                    None => log_warn!("{} for unknown request {id}; dropped", reply.kind()),
                    Some(_actual) => log_warn!(
                        "{} for request {id} expected a {:?} reply; dropped",
                        reply.kind(),
                        _actual
                    ),
                }
                return None;
            }
        };

        log_trace!(
            "{} matched request {id} after {:?}",
            reply.kind(),
            entry.created.elapsed()
        );
        if entry.completion.is_abandoned() {
            log_debug!("{} for abandoned request {id}; discarded", reply.kind());
        }

        self.resolve(entry.completion, reply)
    }

    /// Reply to a timed-out request: undo whatever the router created.
    fn undo_late(&mut self, reply: Message) -> Option<Action> {
        // ---
        match reply {
            Message::Subscribed(m) => self.drop_stray_subscription(m.subscription),
            Message::Registered(m) => self.drop_stray_registration(m.registration),
            _other => {
                log_debug!("late {} discarded", _other.kind());
                None
            }
        }
    }

    /// UNSUBSCRIBE a broker subscription no local handle refers to.
    fn drop_stray_subscription(&mut self, subscription: SubscriptionId) -> Option<Action> {
        // ---
        if self.subscriptions.local_count(subscription) > 0
            || self.unsubscribing.contains_key(&subscription)
        {
            return None;
        }

        log_debug!("unsubscribing stray subscription {subscription}");
        let id = self.allocate();
        let (reply, _) = oneshot::channel();
        self.track(
            id,
            Completion::Unsubscribe {
                subscription,
                local: None,
                reply,
            },
        );
        self.unsubscribing.insert(subscription, Vec::new());

        Some(Action::Send(vec![Message::Unsubscribe(Unsubscribe {
            request: id,
            subscription,
        })]))
    }

    /// UNREGISTER a registration no local handle refers to.
    fn drop_stray_registration(&mut self, registration: RegistrationId) -> Option<Action> {
        // ---
        if self.registrations.contains(registration) || !self.unregistering.insert(registration) {
            return None;
        }

        log_debug!("unregistering stray registration {registration}");
        let id = self.allocate();
        let (reply, _) = oneshot::channel();
        self.track(id, Completion::Unregister { registration, reply });

        Some(Action::Send(vec![Message::Unregister(Unregister {
            request: id,
            registration,
        })]))
    }

    /// The broker dropped `subscription`; subscribe again for every
    /// subscribe it confirmed onto it meanwhile.
    fn finish_release(&mut self, subscription: SubscriptionId) -> Vec<Message> {
        // ---
        let held = self.unsubscribing.remove(&subscription).unwrap_or_default();
        held.into_iter()
            .filter_map(|completion| self.resubscribe(completion))
            .collect()
    }

    fn resubscribe(&mut self, completion: Completion) -> Option<Message> {
        // ---
        let Completion::Subscribe {
            topic,
            options,
            handler,
            reply,
        } = completion
        else {
            return None;
        };
        if reply.is_closed() {
            return None;
        }

        let id = self.allocate();
        match Subscribe::new(id, options.clone(), &topic) {
            Ok(subscribe) => {
                log_debug!("subscribing to {topic} again as request {id}");
                self.track(
                    id,
                    Completion::Subscribe {
                        topic,
                        options,
                        handler,
                        reply,
                    },
                );
                Some(Message::Subscribe(subscribe))
            }
            Err(err) => {
                let _ = reply.send(Err(err));
                None
            }
        }
    }

    fn resolve(&mut self, completion: Completion, reply: Message) -> Option<Action> {
        // ---
        match (completion, reply) {
            (Completion::Call(tx), Message::Result(m)) => {
                let _ = tx.send(Ok(CallResult::from_payload(m.payload, m.details)));
                None
            }

            (Completion::Publish(tx), Message::Published(m)) => {
                let _ = tx.send(Ok(m.publication));
                None
            }

            (
                Completion::Subscribe {
                    topic,
                    options,
                    handler,
                    reply,
                },
                Message::Subscribed(m),
            ) => {
                if reply.is_closed() {
                    // Nobody holds a handle to unsubscribe it with.
                    log_warn!("subscription {} to {topic} abandoned", m.subscription);
                    return self.drop_stray_subscription(m.subscription);
                }
                if let Some(held) = self.unsubscribing.get_mut(&m.subscription) {
                    // The router is about to drop this subscription.
                    log_debug!("subscription {} to {topic} held until unsubscribed", m.subscription);
                    held.push(Completion::Subscribe {
                        topic,
                        options,
                        handler,
                        reply,
                    });
                    return None;
                }
                let local = self.subscriptions.add(m.subscription, topic, handler);
                let _ = reply.send(Ok(Subscribed {
                    subscription: m.subscription,
                    local,
                }));
                None
            }

            (
                Completion::Unsubscribe {
                    subscription,
                    local,
                    reply,
                },
                Message::Unsubscribed(_),
            ) => {
                if let Some(local) = local {
                    self.subscriptions.remove_local(subscription, local);
                }
                let _ = reply.send(Ok(()));
                Action::send(self.finish_release(subscription))
            }

            (
                Completion::Register {
                    procedure,
                    handler,
                    reply,
                },
                Message::Registered(m),
            ) => {
                if reply.is_closed() {
                    log_warn!("registration {} of {procedure} abandoned", m.registration);
                    return self.drop_stray_registration(m.registration);
                }
                self.registrations
                    .insert(m.registration, procedure, handler);
                let _ = reply.send(Ok(m.registration));
                None
            }

            (Completion::Unregister { registration, reply }, Message::Unregistered(_)) => {
                self.registrations.remove(registration);
                self.unregistering.remove(&registration);
                let _ = reply.send(Ok(()));
                None
            }

            (completion, Message::Error(m)) => {
                // The local handler is discarded whatever the router says.
                let action = match &completion {
                    Completion::Unsubscribe {
                        subscription,
                        local,
                        ..
                    } => {
                        if let Some(local) = local {
                            self.subscriptions.remove_local(*subscription, *local);
                        }
                        Action::send(self.finish_release(*subscription))
                    }
                    Completion::Unregister { registration, .. } => {
                        self.registrations.remove(*registration);
                        self.unregistering.remove(registration);
                        None
                    }
                    _ => None,
                };

                let mut error = RemoteError::new(m.error).with_payload(m.payload);
                error.details = m.details;
                completion.fail(WampError::Remote(error));
                action
            }

            (completion, other) => {
                // Unreachable through `route`, which derives the category
                // from the reply kind.
                completion.fail(WampError::ProtocolViolation(format!(
                    "unexpected {} reply",
                    other.kind()
                )));
                None
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
