//! WAMP client session core over any frame transport.
//!
//! This library implements the client side of the WAMP basic profile: the
//! message codec, the session handshake state machine and the correlation
//! of calls, subscriptions, publications and registrations with the
//! router's replies, events and invocations. Sockets and frame formats
//! stay outside the crate behind the [`Transport`] and [`Serializer`]
//! traits.
//!

// Import all sub modules once...
mod domain;
mod engine;
mod protocol;
mod transport;

mod dispatcher;
mod handler;
mod macros;
mod options;
mod roles;
mod serializer;
mod session;
mod session_builder;
mod session_config;
mod session_state;

mod error;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// Re-export main types
pub use session::{Registration, Session, SessionDetails, Subscription};
pub use session_builder::SessionBuilder;
pub use session_config::{SessionConfig, CLOSE_NORMAL};
pub use session_state::SessionState;

pub use error::{RemoteError, Result, WampError};

pub use dispatcher::{GOODBYE_AND_OUT, PROTOCOL_VIOLATION};
pub use engine::{Orphan, NO_SUCH_REGISTRATION};
pub use handler::{CallResult, Responder, RUNTIME_ERROR};
pub use options::{CallOptions, MatchPolicy, PublishOptions, SubscribeOptions};
pub use roles::{Role, Roles};
pub use serializer::JsonSerializer;

pub use transport::{create_memory_transport, MemoryPeer};

// --- public re-exports
pub use domain::{
    //
    FrameHandle,
    Serializer,
    SerializerPtr,
    Transport,
    TransportBase,
    TransportEvent,
    TransportPtr,
};

pub use protocol::{
    //
    decode,
    decode_value,
    encode,
    encode_value,
    is_valid_uri,
    is_valid_wildcard_uri,
    validate_uri,
    Abort,
    Call,
    DecodeError,
    ErrorMessage,
    Event,
    Goodbye,
    Hello,
    IdGenerator,
    Invocation,
    Message,
    MessageKind,
    Payload,
    PublicationId,
    Publish,
    Published,
    Register,
    Registered,
    RegistrationId,
    RequestId,
    ResultMessage,
    SessionId,
    Subscribe,
    Subscribed,
    SubscriptionId,
    Unregister,
    Unregistered,
    Unsubscribe,
    Unsubscribed,
    Welcome,
    WireMap,
    WireValue,
    Yield,
    MAX_SAFE_INTEGER,
};
