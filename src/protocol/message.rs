//! Typed WAMP messages.
//!
//! One variant per message kind; each kind's struct holds its positional
//! fields in wire order. Values are plain data: construct outbound messages
//! through the validating constructors so encoding cannot fail.

use std::fmt;
use std::ops::RangeInclusive;

use super::correlation::{PublicationId, RegistrationId, RequestId, SessionId, SubscriptionId};
use super::uri::{is_valid_wildcard_uri, validate_uri};
use super::value::{WireMap, WireValue};
use crate::{Result, Roles, WampError};

/// Numeric message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Welcome,
    Abort,
    Goodbye,
    Error,
    Publish,
    Published,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Event,
    Call,
    Result,
    Register,
    Registered,
    Unregister,
    Unregistered,
    Invocation,
    Yield,
}

impl MessageKind {
    // ---

    pub fn tag(self) -> u64 {
        // ---
        match self {
            MessageKind::Hello => 1,
            MessageKind::Welcome => 2,
            MessageKind::Abort => 3,
            MessageKind::Goodbye => 6,
            MessageKind::Error => 8,
            MessageKind::Publish => 16,
            MessageKind::Published => 17,
            MessageKind::Subscribe => 32,
            MessageKind::Subscribed => 33,
            MessageKind::Unsubscribe => 34,
            MessageKind::Unsubscribed => 35,
            MessageKind::Event => 36,
            MessageKind::Call => 48,
            MessageKind::Result => 50,
            MessageKind::Register => 64,
            MessageKind::Registered => 65,
            MessageKind::Unregister => 66,
            MessageKind::Unregistered => 67,
            MessageKind::Invocation => 68,
            MessageKind::Yield => 70,
        }
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        // ---
        let kind = match tag {
            1 => MessageKind::Hello,
            2 => MessageKind::Welcome,
            3 => MessageKind::Abort,
            6 => MessageKind::Goodbye,
            8 => MessageKind::Error,
            16 => MessageKind::Publish,
            17 => MessageKind::Published,
            32 => MessageKind::Subscribe,
            33 => MessageKind::Subscribed,
            34 => MessageKind::Unsubscribe,
            35 => MessageKind::Unsubscribed,
            36 => MessageKind::Event,
            48 => MessageKind::Call,
            50 => MessageKind::Result,
            64 => MessageKind::Register,
            65 => MessageKind::Registered,
            66 => MessageKind::Unregister,
            67 => MessageKind::Unregistered,
            68 => MessageKind::Invocation,
            70 => MessageKind::Yield,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        // ---
        match self {
            MessageKind::Hello => "HELLO",
            MessageKind::Welcome => "WELCOME",
            MessageKind::Abort => "ABORT",
            MessageKind::Goodbye => "GOODBYE",
            MessageKind::Error => "ERROR",
            MessageKind::Publish => "PUBLISH",
            MessageKind::Published => "PUBLISHED",
            MessageKind::Subscribe => "SUBSCRIBE",
            MessageKind::Subscribed => "SUBSCRIBED",
            MessageKind::Unsubscribe => "UNSUBSCRIBE",
            MessageKind::Unsubscribed => "UNSUBSCRIBED",
            MessageKind::Event => "EVENT",
            MessageKind::Call => "CALL",
            MessageKind::Result => "RESULT",
            MessageKind::Register => "REGISTER",
            MessageKind::Registered => "REGISTERED",
            MessageKind::Unregister => "UNREGISTER",
            MessageKind::Unregistered => "UNREGISTERED",
            MessageKind::Invocation => "INVOCATION",
            MessageKind::Yield => "YIELD",
        }
    }

    /// Whether the kind may end with optional `args` / `kwargs` elements.
    pub fn carries_payload(self) -> bool {
        matches!(
            self,
            MessageKind::Error
                | MessageKind::Publish
                | MessageKind::Event
                | MessageKind::Call
                | MessageKind::Result
                | MessageKind::Invocation
                | MessageKind::Yield
        )
    }

    /// Allowed wire array lengths, type tag included.
    pub fn arity(self) -> RangeInclusive<usize> {
        // ---
        let base = match self {
            MessageKind::Unsubscribed | MessageKind::Unregistered => 2,
            MessageKind::Hello
            | MessageKind::Welcome
            | MessageKind::Abort
            | MessageKind::Goodbye
            | MessageKind::Published
            | MessageKind::Subscribed
            | MessageKind::Unsubscribe
            | MessageKind::Result
            | MessageKind::Registered
            | MessageKind::Unregister
            | MessageKind::Yield => 3,
            MessageKind::Publish
            | MessageKind::Subscribe
            | MessageKind::Event
            | MessageKind::Call
            | MessageKind::Register
            | MessageKind::Invocation => 4,
            MessageKind::Error => 5,
        };

        if self.carries_payload() {
            base..=base + 2
        } else {
            base..=base
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Positional and keyword arguments of a payload-carrying message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    pub args: Vec<WireValue>,
    pub kwargs: WireMap,
}

impl Payload {
    pub fn new(args: Vec<WireValue>, kwargs: WireMap) -> Self {
        Self { args, kwargs }
    }

    pub fn from_args(args: Vec<WireValue>) -> Self {
        Self {
            args,
            kwargs: WireMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    pub fn arg(&self, index: usize) -> Option<&WireValue> {
        self.args.get(index)
    }

    pub fn kwarg(&self, key: &str) -> Option<&WireValue> {
        self.kwargs.get(key)
    }
}

// -------------------------------------------------------------------------
// Session lifecycle
// -------------------------------------------------------------------------

/// `[HELLO, Realm|uri, Details|dict]`
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    pub realm: String,
    pub details: WireMap,
}

impl Hello {
    /// Build a HELLO announcing `roles`, merged over `details`.
    ///
    /// # Errors
    ///
    /// - [`WampError::InvalidUri`] if `realm` is not a valid URI
    /// - [`WampError::InvalidConfiguration`] if `details` carries a `roles`
    ///   entry of its own
    pub fn new(realm: &str, roles: &Roles, mut details: WireMap) -> Result<Self> {
        // ---
        validate_uri(realm)?;

        if details.contains_key("roles") {
            return Err(WampError::InvalidConfiguration(
                "HELLO details must not override `roles`; configure roles instead".into(),
            ));
        }
        details.insert("roles".into(), WireValue::Map(roles.to_wire()));

        Ok(Self {
            realm: realm.to_owned(),
            details,
        })
    }

    /// Roles announced in the details.
    pub fn roles(&self) -> Option<Roles> {
        // ---
        self.details
            .get("roles")
            .and_then(WireValue::as_map)
            .and_then(|m| Roles::from_wire(m).ok())
    }
}

/// `[WELCOME, Session|id, Details|dict]`
#[derive(Debug, Clone, PartialEq)]
pub struct Welcome {
    pub session: SessionId,
    pub details: WireMap,
}

/// `[ABORT, Details|dict, Reason|uri]`
#[derive(Debug, Clone, PartialEq)]
pub struct Abort {
    pub details: WireMap,
    pub reason: String,
}

impl Abort {
    /// Build an ABORT, with an optional human readable `message` detail.
    pub fn new(reason: &str, message: Option<&str>) -> Result<Self> {
        // ---
        validate_uri(reason)?;
        Ok(Self {
            details: message_details(message),
            reason: reason.to_owned(),
        })
    }

    /// The `message` detail, if any.
    pub fn message(&self) -> Option<&str> {
        self.details.get("message").and_then(WireValue::as_str)
    }
}

/// `[GOODBYE, Details|dict, Reason|uri]`
#[derive(Debug, Clone, PartialEq)]
pub struct Goodbye {
    pub details: WireMap,
    pub reason: String,
}

impl Goodbye {
    pub fn new(reason: &str, message: Option<&str>) -> Result<Self> {
        // ---
        validate_uri(reason)?;
        Ok(Self {
            details: message_details(message),
            reason: reason.to_owned(),
        })
    }
}

fn message_details(message: Option<&str>) -> WireMap {
    // ---
    let mut details = WireMap::new();
    if let Some(message) = message {
        details.insert("message".into(), WireValue::from(message));
    }
    details
}

/// `[ERROR, REQUEST.Type|int, REQUEST.Request|id, Details|dict, Error|uri, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    /// Kind of the request this error answers.
    pub request_type: MessageKind,
    pub request: RequestId,
    pub details: WireMap,
    pub error: String,
    pub payload: Payload,
}

impl ErrorMessage {
    pub fn new(
        request_type: MessageKind,
        request: RequestId,
        error: &str,
        payload: Payload,
    ) -> Result<Self> {
        // ---
        validate_uri(error)?;
        Ok(Self {
            request_type,
            request,
            details: WireMap::new(),
            error: error.to_owned(),
            payload,
        })
    }
}

// -------------------------------------------------------------------------
// Publish & subscribe
// -------------------------------------------------------------------------

/// `[PUBLISH, Request|id, Options|dict, Topic|uri, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub request: RequestId,
    pub options: WireMap,
    pub topic: String,
    pub payload: Payload,
}

impl Publish {
    pub fn new(request: RequestId, options: WireMap, topic: &str, payload: Payload) -> Result<Self> {
        // ---
        validate_uri(topic)?;
        Ok(Self {
            request,
            options,
            topic: topic.to_owned(),
            payload,
        })
    }
}

/// `[PUBLISHED, PUBLISH.Request|id, Publication|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub request: RequestId,
    pub publication: PublicationId,
}

/// `[SUBSCRIBE, Request|id, Options|dict, Topic|uri]`
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub request: RequestId,
    pub options: WireMap,
    pub topic: String,
}

impl Subscribe {
    /// Build a SUBSCRIBE. A `match: "wildcard"` option relaxes the topic
    /// check to allow empty components.
    pub fn new(request: RequestId, options: WireMap, topic: &str) -> Result<Self> {
        // ---
        let wildcard = options.get("match").and_then(WireValue::as_str) == Some("wildcard");
        if wildcard {
            if !is_valid_wildcard_uri(topic) {
                return Err(WampError::InvalidUri(topic.to_owned()));
            }
        } else {
            validate_uri(topic)?;
        }
        Ok(Self {
            request,
            options,
            topic: topic.to_owned(),
        })
    }
}

/// `[SUBSCRIBED, SUBSCRIBE.Request|id, Subscription|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribed {
    pub request: RequestId,
    pub subscription: SubscriptionId,
}

/// `[UNSUBSCRIBE, Request|id, SUBSCRIBED.Subscription|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub request: RequestId,
    pub subscription: SubscriptionId,
}

/// `[UNSUBSCRIBED, UNSUBSCRIBE.Request|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribed {
    pub request: RequestId,
}

/// `[EVENT, SUBSCRIBED.Subscription|id, PUBLISHED.Publication|id, Details|dict, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub subscription: SubscriptionId,
    pub publication: PublicationId,
    pub details: WireMap,
    pub payload: Payload,
}

impl Event {
    /// Topic of the event when the broker discloses it (pattern subscriptions).
    pub fn topic(&self) -> Option<&str> {
        self.details.get("topic").and_then(WireValue::as_str)
    }
}

// -------------------------------------------------------------------------
// Remote procedure calls
// -------------------------------------------------------------------------

/// `[CALL, Request|id, Options|dict, Procedure|uri, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub request: RequestId,
    pub options: WireMap,
    pub procedure: String,
    pub payload: Payload,
}

impl Call {
    pub fn new(
        request: RequestId,
        options: WireMap,
        procedure: &str,
        payload: Payload,
    ) -> Result<Self> {
        // ---
        validate_uri(procedure)?;
        Ok(Self {
            request,
            options,
            procedure: procedure.to_owned(),
            payload,
        })
    }
}

/// `[RESULT, CALL.Request|id, Details|dict, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub request: RequestId,
    pub details: WireMap,
    pub payload: Payload,
}

/// `[REGISTER, Request|id, Options|dict, Procedure|uri]`
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub request: RequestId,
    pub options: WireMap,
    pub procedure: String,
}

impl Register {
    pub fn new(request: RequestId, options: WireMap, procedure: &str) -> Result<Self> {
        // ---
        validate_uri(procedure)?;
        Ok(Self {
            request,
            options,
            procedure: procedure.to_owned(),
        })
    }
}

/// `[REGISTERED, REGISTER.Request|id, Registration|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Registered {
    pub request: RequestId,
    pub registration: RegistrationId,
}

/// `[UNREGISTER, Request|id, REGISTERED.Registration|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Unregister {
    pub request: RequestId,
    pub registration: RegistrationId,
}

/// `[UNREGISTERED, UNREGISTER.Request|id]`
#[derive(Debug, Clone, PartialEq)]
pub struct Unregistered {
    pub request: RequestId,
}

/// `[INVOCATION, Request|id, REGISTERED.Registration|id, Details|dict, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Dealer-assigned id; echoed back in YIELD or ERROR.
    pub request: RequestId,
    pub registration: RegistrationId,
    pub details: WireMap,
    pub payload: Payload,
}

impl Invocation {
    /// Caller session id, when the dealer discloses it.
    pub fn caller(&self) -> Option<SessionId> {
        self.details
            .get("caller")
            .and_then(WireValue::as_id)
            .map(SessionId)
    }
}

/// `[YIELD, INVOCATION.Request|id, Options|dict, (Arguments|list, ArgumentsKw|dict)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Yield {
    pub request: RequestId,
    pub options: WireMap,
    pub payload: Payload,
}

/// A decoded or to-be-encoded WAMP message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Welcome(Welcome),
    Abort(Abort),
    Goodbye(Goodbye),
    Error(ErrorMessage),
    Publish(Publish),
    Published(Published),
    Subscribe(Subscribe),
    Subscribed(Subscribed),
    Unsubscribe(Unsubscribe),
    Unsubscribed(Unsubscribed),
    Event(Event),
    Call(Call),
    Result(ResultMessage),
    Register(Register),
    Registered(Registered),
    Unregister(Unregister),
    Unregistered(Unregistered),
    Invocation(Invocation),
    Yield(Yield),
}

impl Message {
    // ---

    pub fn kind(&self) -> MessageKind {
        // ---
        match self {
            Message::Hello(_) => MessageKind::Hello,
            Message::Welcome(_) => MessageKind::Welcome,
            Message::Abort(_) => MessageKind::Abort,
            Message::Goodbye(_) => MessageKind::Goodbye,
            Message::Error(_) => MessageKind::Error,
            Message::Publish(_) => MessageKind::Publish,
            Message::Published(_) => MessageKind::Published,
            Message::Subscribe(_) => MessageKind::Subscribe,
            Message::Subscribed(_) => MessageKind::Subscribed,
            Message::Unsubscribe(_) => MessageKind::Unsubscribe,
            Message::Unsubscribed(_) => MessageKind::Unsubscribed,
            Message::Event(_) => MessageKind::Event,
            Message::Call(_) => MessageKind::Call,
            Message::Result(_) => MessageKind::Result,
            Message::Register(_) => MessageKind::Register,
            Message::Registered(_) => MessageKind::Registered,
            Message::Unregister(_) => MessageKind::Unregister,
            Message::Unregistered(_) => MessageKind::Unregistered,
            Message::Invocation(_) => MessageKind::Invocation,
            Message::Yield(_) => MessageKind::Yield,
        }
    }

    /// Request id carried by the message, if the kind has one.
    pub fn request_id(&self) -> Option<RequestId> {
        // ---
        match self {
            Message::Hello(_)
            | Message::Welcome(_)
            | Message::Abort(_)
            | Message::Goodbye(_)
            | Message::Event(_) => None,
            Message::Error(m) => Some(m.request),
            Message::Publish(m) => Some(m.request),
            Message::Published(m) => Some(m.request),
            Message::Subscribe(m) => Some(m.request),
            Message::Subscribed(m) => Some(m.request),
            Message::Unsubscribe(m) => Some(m.request),
            Message::Unsubscribed(m) => Some(m.request),
            Message::Call(m) => Some(m.request),
            Message::Result(m) => Some(m.request),
            Message::Register(m) => Some(m.request),
            Message::Registered(m) => Some(m.request),
            Message::Unregister(m) => Some(m.request),
            Message::Unregistered(m) => Some(m.request),
            Message::Invocation(m) => Some(m.request),
            Message::Yield(m) => Some(m.request),
        }
    }
}
