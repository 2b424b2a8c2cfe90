use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::oneshot;

use super::tables::LocalId;
use crate::handler::{CallResult, EventHandler, InvocationHandler};
use crate::protocol::{MessageKind, PublicationId, RegistrationId, RequestId, SubscriptionId};
use crate::{Result, WampError, WireMap};

/// Request categories awaiting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Category {
    Call,
    Subscribe,
    Unsubscribe,
    Publish,
    Register,
    Unregister,
}

impl Category {
    // ---

    /// Kind of the request message; ERROR replies carry it as `request_type`.
    pub fn request_kind(self) -> MessageKind {
        // ---
        match self {
            Category::Call => MessageKind::Call,
            Category::Subscribe => MessageKind::Subscribe,
            Category::Unsubscribe => MessageKind::Unsubscribe,
            Category::Publish => MessageKind::Publish,
            Category::Register => MessageKind::Register,
            Category::Unregister => MessageKind::Unregister,
        }
    }

    pub fn from_request_kind(kind: MessageKind) -> Option<Self> {
        // ---
        match kind {
            MessageKind::Call => Some(Category::Call),
            MessageKind::Subscribe => Some(Category::Subscribe),
            MessageKind::Unsubscribe => Some(Category::Unsubscribe),
            MessageKind::Publish => Some(Category::Publish),
            MessageKind::Register => Some(Category::Register),
            MessageKind::Unregister => Some(Category::Unregister),
            _ => None,
        }
    }
}

/// Local subscription created once SUBSCRIBED arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Subscribed {
    pub subscription: SubscriptionId,
    pub local: LocalId,
}

/// How a pending request is resolved, with whatever the reply needs to
/// update the tables first.
pub(crate) enum Completion {
    Call(oneshot::Sender<Result<CallResult>>),
    Subscribe {
        topic: String,
        /// SUBSCRIBE options, kept so the request can be issued again.
        options: WireMap,
        handler: EventHandler,
        reply: oneshot::Sender<Result<Subscribed>>,
    },
    Unsubscribe {
        subscription: SubscriptionId,
        /// `None` when undoing a subscription nobody holds.
        local: Option<LocalId>,
        reply: oneshot::Sender<Result<()>>,
    },
    Publish(oneshot::Sender<Result<PublicationId>>),
    Register {
        procedure: String,
        handler: InvocationHandler,
        reply: oneshot::Sender<Result<RegistrationId>>,
    },
    Unregister {
        registration: RegistrationId,
        reply: oneshot::Sender<Result<()>>,
    },
}

impl Completion {
    // ---

    pub fn category(&self) -> Category {
        // ---
        match self {
            Completion::Call(_) => Category::Call,
            Completion::Subscribe { .. } => Category::Subscribe,
            Completion::Unsubscribe { .. } => Category::Unsubscribe,
            Completion::Publish(_) => Category::Publish,
            Completion::Register { .. } => Category::Register,
            Completion::Unregister { .. } => Category::Unregister,
        }
    }

    /// Resolve with `err`. A dropped receiver (abandoned request) is ignored.
    pub fn fail(self, err: WampError) {
        // ---
        match self {
            Completion::Call(tx) => {
                let _ = tx.send(Err(err));
            }
            Completion::Subscribe { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Completion::Unsubscribe { reply, .. } | Completion::Unregister { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Completion::Publish(tx) => {
                let _ = tx.send(Err(err));
            }
            Completion::Register { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }

    /// Whether the requester still waits for the outcome.
    pub fn is_abandoned(&self) -> bool {
        // ---
        match self {
            Completion::Call(tx) => tx.is_closed(),
            Completion::Subscribe { reply, .. } => reply.is_closed(),
            Completion::Unsubscribe { reply, .. } | Completion::Unregister { reply, .. } => {
                reply.is_closed()
            }
            Completion::Publish(tx) => tx.is_closed(),
            Completion::Register { reply, .. } => reply.is_closed(),
        }
    }
}

/// One outstanding request.
pub(crate) struct PendingRequest {
    pub created: Instant,
    pub completion: Completion,
}

/// Tracks requests waiting for a reply, keyed by request id.
pub(crate) struct PendingRequests {
    // ---
    requests: HashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            requests: HashMap::new(),
        }
    }

    /// Register a pending request. The id must not be in use.
    pub fn insert(&mut self, id: RequestId, completion: Completion) {
        // ---
        let previous = self.requests.insert(
            id,
            PendingRequest {
                created: Instant::now(),
                completion,
            },
        );
        debug_assert!(previous.is_none(), "request id {id} reused while pending");
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    /// Remove the entry for `id` only if it belongs to `category`.
    ///
    /// Returns `Err(Some(actual))` when the id is pending under another
    /// category (the entry stays), `Err(None)` when nothing is pending.
    pub fn take_matching(
        &mut self,
        id: RequestId,
        category: Category,
    ) -> std::result::Result<PendingRequest, Option<Category>> {
        // ---
        match self.requests.get(&id) {
            None => Err(None),
            Some(entry) if entry.completion.category() != category => {
                Err(Some(entry.completion.category()))
            }
            Some(_) => self.requests.remove(&id).ok_or(None),
        }
    }

    /// Remove a pending request without resolving it.
    pub fn remove(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.requests.remove(&id)
    }

    /// Remove every pending request.
    pub fn drain(&mut self) -> Vec<(RequestId, PendingRequest)> {
        self.requests.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
