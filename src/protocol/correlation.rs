//! Integer identifiers and the request id generator.
//!
//! Every id on the wire is an integer in `1..=2^53`. Request ids come from
//! one [`IdGenerator`] per session; the other ids are assigned by the router.

use std::fmt;

use super::value::MAX_SAFE_INTEGER;

macro_rules! wamp_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw integer value as carried on the wire.
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

wamp_id!(
    /// Client-assigned correlation id of an outstanding request.
    ///
    /// For INVOCATION the id is assigned by the dealer and echoed back in
    /// YIELD/ERROR.
    RequestId
);

wamp_id!(
    /// Router-assigned session id, delivered in WELCOME.
    SessionId
);

wamp_id!(
    /// Broker-assigned subscription id (SUBSCRIBED, EVENT).
    SubscriptionId
);

wamp_id!(
    /// Dealer-assigned registration id (REGISTERED, INVOCATION).
    RegistrationId
);

wamp_id!(
    /// Broker-assigned publication id (PUBLISHED, EVENT).
    PublicationId
);

/// Session-scoped request id counter.
///
/// A single counter is shared by every request category (call, subscribe,
/// unsubscribe, publish, register, unregister) so ids never collide across
/// categories. Ids run over `1..=2^53` and wrap back to 1.
#[derive(Debug)]
pub struct IdGenerator {
    // ---
    last: u64,
}

impl IdGenerator {
    // ---

    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Next id in sequence, without checking for collisions.
    pub fn next_id(&mut self) -> RequestId {
        // ---
        self.last = if self.last >= MAX_SAFE_INTEGER as u64 {
            1
        } else {
            self.last + 1
        };
        RequestId(self.last)
    }

    /// Next id that `in_use` does not report as taken.
    ///
    /// Only relevant after wrap-around, when a long-lived request may still
    /// hold a low id.
    pub fn next_free(&mut self, in_use: impl Fn(RequestId) -> bool) -> RequestId {
        // ---
        loop {
            let id = self.next_id();
            if !in_use(id) {
                return id;
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
