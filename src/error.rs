use thiserror::Error;

use crate::protocol::{DecodeError, Payload, WireMap};

/// Errors that can occur while driving a WAMP session.
#[derive(Error, Debug)]
pub enum WampError {
    /// A frame decoded into a wire array that is not a valid message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Local configuration rejected before anything reached the wire.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A realm, topic, procedure or error URI failed the URI grammar.
    #[error("invalid URI: {0:?}")]
    InvalidUri(String),

    /// The peer (or the local application) broke the session protocol.
    ///
    /// Fatal to the session when raised by inbound traffic.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The session is closed, or closed while the request was pending.
    #[error("session closed")]
    SessionClosed,

    /// The router answered HELLO with ABORT.
    #[error("session aborted by peer: {reason}")]
    Aborted {
        /// Abort reason URI, e.g. `wamp.error.no_such_realm`.
        reason: String,
        /// Optional human readable message from the abort details.
        message: Option<String>,
    },

    /// The peer answered the request with an ERROR message.
    #[error("{0}")]
    Remote(RemoteError),

    /// The transport failed to send the frame for this request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The serialization collaborator could not convert a frame.
    #[error("format error: {0}")]
    Format(String),

    /// Request timed out waiting for the reply.
    #[error("request timed out")]
    Timeout,

    /// Typed payload conversion failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, WampError>;

/// An application-level error carried by an ERROR message.
///
/// Used both for errors returned by the peer (wrapped in
/// [`WampError::Remote`]) and for errors a callee reports back through its
/// [`Responder`](crate::Responder).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    /// Error URI, e.g. `wamp.error.no_such_procedure`.
    pub error: String,
    /// Details dictionary of the ERROR message.
    pub details: WireMap,
    /// Positional and keyword arguments of the ERROR message.
    pub payload: Payload,
}

impl RemoteError {
    /// Create an error with the given URI and no payload.
    pub fn new(error: impl Into<String>) -> Self {
        // ---
        Self {
            error: error.into(),
            details: WireMap::new(),
            payload: Payload::default(),
        }
    }

    /// Attach positional/keyword arguments.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ---
        write!(f, "remote error {}", self.error)?;
        if let Some(first) = self.payload.args.first().and_then(|v| v.as_str()) {
            write!(f, ": {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

impl WampError {
    /// Error URI when this is a remote error.
    pub fn remote_uri(&self) -> Option<&str> {
        // ---
        match self {
            WampError::Remote(err) => Some(&err.error),
            _ => None,
        }
    }

    // A cheap structural copy used when one failure must resolve many
    // pending entries (session sweep).
    pub(crate) fn duplicate(&self) -> WampError {
        // ---
        match self {
            WampError::Decode(e) => WampError::Decode(e.clone()),
            WampError::InvalidConfiguration(s) => WampError::InvalidConfiguration(s.clone()),
            WampError::InvalidUri(s) => WampError::InvalidUri(s.clone()),
            WampError::ProtocolViolation(s) => WampError::ProtocolViolation(s.clone()),
            WampError::SessionClosed => WampError::SessionClosed,
            WampError::Aborted { reason, message } => WampError::Aborted {
                reason: reason.clone(),
                message: message.clone(),
            },
            WampError::Remote(e) => WampError::Remote(e.clone()),
            WampError::Transport(s) => WampError::Transport(s.clone()),
            WampError::Format(s) => WampError::Format(s.clone()),
            WampError::Timeout => WampError::Timeout,
            WampError::Serialization(e) => WampError::Format(e.to_string()),
        }
    }
}
