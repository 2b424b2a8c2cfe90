//! Session lifecycle state machine.
//!
//! Pure legality rules; the dispatcher owns the single `SessionState` value
//! and applies the transitions.

use std::fmt;

use crate::protocol::MessageKind;
use crate::{Result, WampError};

/// Lifecycle of one session over one connection.
///
/// ```text
/// Disconnected --HELLO sent--> HandshakeSent --WELCOME--> Established
///                                    |                         |
///                                  ABORT              GOODBYE sent/received
///                                    v                         v
///                                  Closed <--echo / sent--- Closing
/// ```
///
/// Any state moves to `Closed` when the transport reports the connection lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    HandshakeSent,
    Established,
    Closing,
    Closed,
}

/// What to do with an inbound message in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// Process it.
    Accept,
    /// Drop it quietly (late traffic racing a close).
    Ignore,
    /// Fail the session.
    Violation,
}

impl SessionState {
    // ---

    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::HandshakeSent => "handshake-sent",
            SessionState::Established => "established",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    /// `Established`; the only state in which requests may be issued.
    pub fn is_established(self) -> bool {
        self == SessionState::Established
    }

    /// `Closing` or `Closed`.
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }

    /// Legality of receiving `kind` in this state.
    pub(crate) fn inbound(self, kind: MessageKind) -> Inbound {
        // ---
        use MessageKind as K;

        match self {
            SessionState::Disconnected => match kind {
                K::Abort => Inbound::Accept,
                _ => Inbound::Violation,
            },
            SessionState::HandshakeSent => match kind {
                K::Welcome | K::Abort => Inbound::Accept,
                _ => Inbound::Violation,
            },
            SessionState::Established => match kind {
                K::Abort
                | K::Goodbye
                | K::Error
                | K::Published
                | K::Subscribed
                | K::Unsubscribed
                | K::Event
                | K::Result
                | K::Registered
                | K::Unregistered
                | K::Invocation => Inbound::Accept,
                K::Hello
                | K::Welcome
                | K::Publish
                | K::Subscribe
                | K::Unsubscribe
                | K::Call
                | K::Register
                | K::Unregister
                | K::Yield => Inbound::Violation,
            },
            SessionState::Closing => match kind {
                K::Goodbye | K::Abort => Inbound::Accept,
                _ => Inbound::Ignore,
            },
            SessionState::Closed => Inbound::Ignore,
        }
    }

    /// Check that the application may send `kind` in this state.
    ///
    /// # Errors
    ///
    /// - [`WampError::ProtocolViolation`] for a second HELLO, or a request
    ///   issued before the session is established
    /// - [`WampError::SessionClosed`] once the session is closing or closed
    pub(crate) fn check_outbound(self, kind: MessageKind) -> Result<()> {
        // ---
        use MessageKind as K;

        let allowed = match kind {
            K::Hello => self == SessionState::Disconnected,
            K::Abort => matches!(
                self,
                SessionState::Disconnected | SessionState::HandshakeSent
            ),
            _ => self.is_established(),
        };

        if allowed {
            return Ok(());
        }

        if kind != K::Hello && self.is_closed() {
            return Err(WampError::SessionClosed);
        }

        Err(WampError::ProtocolViolation(format!(
            "cannot send {kind} while {self}"
        )))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
