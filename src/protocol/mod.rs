//! Wire-level protocol types.
//!
//! Generic value tree, typed messages, id newtypes, URI checks and the codec
//! that converts between them. Nothing in here holds state or touches a
//! transport.
mod codec;
mod correlation;
mod message;
mod uri;
mod value;

pub use codec::{decode, decode_value, encode, encode_value, DecodeError};
pub use correlation::{
    //
    IdGenerator,
    PublicationId,
    RegistrationId,
    RequestId,
    SessionId,
    SubscriptionId,
};
pub use message::{
    //
    Abort,
    Call,
    ErrorMessage,
    Event,
    Goodbye,
    Hello,
    Invocation,
    Message,
    MessageKind,
    Payload,
    Publish,
    Published,
    Register,
    Registered,
    ResultMessage,
    Subscribe,
    Subscribed,
    Unregister,
    Unregistered,
    Unsubscribe,
    Unsubscribed,
    Welcome,
    Yield,
};
pub use uri::{is_valid_uri, is_valid_wildcard_uri, validate_uri};
pub use value::{WireMap, WireValue, MAX_SAFE_INTEGER};
