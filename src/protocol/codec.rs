//! Message codec: typed [`Message`] <-> positional wire array.
//!
//! Purely functional; no shared state.

use thiserror::Error;

use super::correlation::{PublicationId, RegistrationId, RequestId, SessionId, SubscriptionId};
use super::message::*;
use super::value::{WireMap, WireValue};
use crate::Roles;

/// Error returned by [`decode`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The type tag is an integer but not a known message kind.
    #[error("unknown message type {0}")]
    UnknownMessageType(i64),

    /// Wrong arity or a field of the wrong type.
    #[error("malformed {kind} message: `{field}` {reason}")]
    MalformedMessage {
        /// Message kind name, or `"message"` when the tag itself is bad.
        kind: &'static str,
        /// Offending field.
        field: &'static str,
        reason: String,
    },
}

impl DecodeError {
    fn malformed(kind: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::MalformedMessage {
            kind,
            field,
            reason: reason.into(),
        }
    }
}

/// Encode a message into its wire array.
pub fn encode(message: &Message) -> Vec<WireValue> {
    // ---
    let kind = message.kind();
    let mut out = Vec::with_capacity(*kind.arity().end());
    out.push(WireValue::Integer(kind.tag() as i64));

    match message {
        Message::Hello(m) => {
            out.push(WireValue::from(m.realm.as_str()));
            out.push(WireValue::Map(m.details.clone()));
        }
        Message::Welcome(m) => {
            out.push(id(m.session.0));
            out.push(WireValue::Map(m.details.clone()));
        }
        Message::Abort(m) => {
            out.push(WireValue::Map(m.details.clone()));
            out.push(WireValue::from(m.reason.as_str()));
        }
        Message::Goodbye(m) => {
            out.push(WireValue::Map(m.details.clone()));
            out.push(WireValue::from(m.reason.as_str()));
        }
        Message::Error(m) => {
            out.push(WireValue::Integer(m.request_type.tag() as i64));
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.details.clone()));
            out.push(WireValue::from(m.error.as_str()));
            push_payload(&mut out, &m.payload);
        }
        Message::Publish(m) => {
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.options.clone()));
            out.push(WireValue::from(m.topic.as_str()));
            push_payload(&mut out, &m.payload);
        }
        Message::Published(m) => {
            out.push(id(m.request.0));
            out.push(id(m.publication.0));
        }
        Message::Subscribe(m) => {
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.options.clone()));
            out.push(WireValue::from(m.topic.as_str()));
        }
        Message::Subscribed(m) => {
            out.push(id(m.request.0));
            out.push(id(m.subscription.0));
        }
        Message::Unsubscribe(m) => {
            out.push(id(m.request.0));
            out.push(id(m.subscription.0));
        }
        Message::Unsubscribed(m) => {
            out.push(id(m.request.0));
        }
        Message::Event(m) => {
            out.push(id(m.subscription.0));
            out.push(id(m.publication.0));
            out.push(WireValue::Map(m.details.clone()));
            push_payload(&mut out, &m.payload);
        }
        Message::Call(m) => {
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.options.clone()));
            out.push(WireValue::from(m.procedure.as_str()));
            push_payload(&mut out, &m.payload);
        }
        Message::Result(m) => {
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.details.clone()));
            push_payload(&mut out, &m.payload);
        }
        Message::Register(m) => {
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.options.clone()));
            out.push(WireValue::from(m.procedure.as_str()));
        }
        Message::Registered(m) => {
            out.push(id(m.request.0));
            out.push(id(m.registration.0));
        }
        Message::Unregister(m) => {
            out.push(id(m.request.0));
            out.push(id(m.registration.0));
        }
        Message::Unregistered(m) => {
            out.push(id(m.request.0));
        }
        Message::Invocation(m) => {
            out.push(id(m.request.0));
            out.push(id(m.registration.0));
            out.push(WireValue::Map(m.details.clone()));
            push_payload(&mut out, &m.payload);
        }
        Message::Yield(m) => {
            out.push(id(m.request.0));
            out.push(WireValue::Map(m.options.clone()));
            push_payload(&mut out, &m.payload);
        }
    }

    out
}

/// Encode straight into a single list value, ready for the serializer.
pub fn encode_value(message: &Message) -> WireValue {
    WireValue::List(encode(message))
}

fn id(value: u64) -> WireValue {
    // Ids are bounded by 2^53 and always fit.
    WireValue::Integer(value as i64)
}

// Trailing payload is omitted when empty; `args` is written as `[]` only
// when needed to position a non-empty `kwargs`.
fn push_payload(out: &mut Vec<WireValue>, payload: &Payload) {
    // ---
    if payload.is_empty() {
        return;
    }
    out.push(WireValue::List(payload.args.clone()));
    if !payload.kwargs.is_empty() {
        out.push(WireValue::Map(payload.kwargs.clone()));
    }
}

/// Decode a top level wire value, which must be a list.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_value(value: &WireValue) -> Result<Message, DecodeError> {
    // ---
    match value {
        WireValue::List(items) => decode(items),
        other => Err(DecodeError::malformed(
            "message",
            "frame",
            format!("expected list, found {}", other.type_name()),
        )),
    }
}

/// Decode a wire array into a message.
///
/// # Errors
///
/// - [`DecodeError::UnknownMessageType`] for an integer tag naming no kind
/// - [`DecodeError::MalformedMessage`] for a missing or non-integer tag, an
///   arity outside the kind's range, or a field of the wrong type
pub fn decode(items: &[WireValue]) -> Result<Message, DecodeError> {
    // ---
    let tag = match items.first() {
        Some(WireValue::Integer(tag)) => *tag,
        Some(other) => {
            return Err(DecodeError::malformed(
                "message",
                "type",
                format!("expected integer, found {}", other.type_name()),
            ))
        }
        None => return Err(DecodeError::malformed("message", "type", "missing")),
    };

    let kind = u64::try_from(tag)
        .ok()
        .and_then(MessageKind::from_tag)
        .ok_or(DecodeError::UnknownMessageType(tag))?;

    if !kind.arity().contains(&items.len()) {
        let arity = kind.arity();
        return Err(DecodeError::malformed(
            kind.name(),
            "length",
            format!(
                "expected {}..={} elements, found {}",
                arity.start(),
                arity.end(),
                items.len()
            ),
        ));
    }

    let f = Fields { kind, items };

    let message = match kind {
        MessageKind::Hello => {
            let realm = f.string(1, "realm")?;
            let details = f.map(2, "details")?;
            let has_roles = details
                .get("roles")
                .and_then(WireValue::as_map)
                .is_some_and(|roles| Roles::from_wire(roles).is_ok());
            if !has_roles {
                return Err(DecodeError::malformed(
                    kind.name(),
                    "details.roles",
                    "must name at least one client role",
                ));
            }
            Message::Hello(Hello { realm, details })
        }
        MessageKind::Welcome => Message::Welcome(Welcome {
            session: SessionId(f.id(1, "session")?),
            details: f.map(2, "details")?,
        }),
        MessageKind::Abort => Message::Abort(Abort {
            details: f.map(1, "details")?,
            reason: f.string(2, "reason")?,
        }),
        MessageKind::Goodbye => Message::Goodbye(Goodbye {
            details: f.map(1, "details")?,
            reason: f.string(2, "reason")?,
        }),
        MessageKind::Error => {
            let raw = f.id(1, "request_type")?;
            let request_type = MessageKind::from_tag(raw).ok_or_else(|| {
                DecodeError::malformed(kind.name(), "request_type", format!("unknown tag {raw}"))
            })?;
            Message::Error(ErrorMessage {
                request_type,
                request: RequestId(f.id(2, "request")?),
                details: f.map(3, "details")?,
                error: f.string(4, "error")?,
                payload: f.payload(5)?,
            })
        }
        MessageKind::Publish => Message::Publish(Publish {
            request: RequestId(f.id(1, "request")?),
            options: f.map(2, "options")?,
            topic: f.string(3, "topic")?,
            payload: f.payload(4)?,
        }),
        MessageKind::Published => Message::Published(Published {
            request: RequestId(f.id(1, "request")?),
            publication: PublicationId(f.id(2, "publication")?),
        }),
        MessageKind::Subscribe => Message::Subscribe(Subscribe {
            request: RequestId(f.id(1, "request")?),
            options: f.map(2, "options")?,
            topic: f.string(3, "topic")?,
        }),
        MessageKind::Subscribed => Message::Subscribed(Subscribed {
            request: RequestId(f.id(1, "request")?),
            subscription: SubscriptionId(f.id(2, "subscription")?),
        }),
        MessageKind::Unsubscribe => Message::Unsubscribe(Unsubscribe {
            request: RequestId(f.id(1, "request")?),
            subscription: SubscriptionId(f.id(2, "subscription")?),
        }),
        MessageKind::Unsubscribed => Message::Unsubscribed(Unsubscribed {
            request: RequestId(f.id(1, "request")?),
        }),
        MessageKind::Event => Message::Event(Event {
            subscription: SubscriptionId(f.id(1, "subscription")?),
            publication: PublicationId(f.id(2, "publication")?),
            details: f.map(3, "details")?,
            payload: f.payload(4)?,
        }),
        MessageKind::Call => Message::Call(Call {
            request: RequestId(f.id(1, "request")?),
            options: f.map(2, "options")?,
            procedure: f.string(3, "procedure")?,
            payload: f.payload(4)?,
        }),
        MessageKind::Result => Message::Result(ResultMessage {
            request: RequestId(f.id(1, "request")?),
            details: f.map(2, "details")?,
            payload: f.payload(3)?,
        }),
        MessageKind::Register => Message::Register(Register {
            request: RequestId(f.id(1, "request")?),
            options: f.map(2, "options")?,
            procedure: f.string(3, "procedure")?,
        }),
        MessageKind::Registered => Message::Registered(Registered {
            request: RequestId(f.id(1, "request")?),
            registration: RegistrationId(f.id(2, "registration")?),
        }),
        MessageKind::Unregister => Message::Unregister(Unregister {
            request: RequestId(f.id(1, "request")?),
            registration: RegistrationId(f.id(2, "registration")?),
        }),
        MessageKind::Unregistered => Message::Unregistered(Unregistered {
            request: RequestId(f.id(1, "request")?),
        }),
        MessageKind::Invocation => Message::Invocation(Invocation {
            request: RequestId(f.id(1, "request")?),
            registration: RegistrationId(f.id(2, "registration")?),
            details: f.map(3, "details")?,
            payload: f.payload(4)?,
        }),
        MessageKind::Yield => Message::Yield(Yield {
            request: RequestId(f.id(1, "request")?),
            options: f.map(2, "options")?,
            payload: f.payload(3)?,
        }),
    };

    Ok(message)
}

/// Positional field reader; arity is checked before any field is read.
struct Fields<'a> {
    kind: MessageKind,
    items: &'a [WireValue],
}

impl Fields<'_> {
    // ---

    fn mismatch(&self, field: &'static str, expected: &str, found: &WireValue) -> DecodeError {
        DecodeError::malformed(
            self.kind.name(),
            field,
            format!("expected {expected}, found {}", found.type_name()),
        )
    }

    fn id(&self, pos: usize, field: &'static str) -> Result<u64, DecodeError> {
        // ---
        let value = &self.items[pos];
        value
            .as_id()
            .ok_or_else(|| self.mismatch(field, "id in 0..=2^53", value))
    }

    fn string(&self, pos: usize, field: &'static str) -> Result<String, DecodeError> {
        // ---
        match &self.items[pos] {
            WireValue::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(field, "string", other)),
        }
    }

    fn map(&self, pos: usize, field: &'static str) -> Result<WireMap, DecodeError> {
        // ---
        match &self.items[pos] {
            WireValue::Map(m) => Ok(m.clone()),
            other => Err(self.mismatch(field, "map", other)),
        }
    }

    // Optional `args` at `pos`, optional `kwargs` at `pos + 1`.
    fn payload(&self, pos: usize) -> Result<Payload, DecodeError> {
        // ---
        let args = match self.items.get(pos) {
            None => Vec::new(),
            Some(WireValue::List(args)) => args.clone(),
            Some(other) => return Err(self.mismatch("args", "list", other)),
        };
        let kwargs = match self.items.get(pos + 1) {
            None => WireMap::new(),
            Some(WireValue::Map(kwargs)) => kwargs.clone(),
            Some(other) => return Err(self.mismatch("kwargs", "map", other)),
        };
        Ok(Payload { args, kwargs })
    }
}
