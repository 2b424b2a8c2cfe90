// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the frame-level interface the session core consumes.
//! It intentionally avoids any reference to concrete protocols (WebSocket,
//! raw socket) or client libraries.
//!
//! A transport delivers already deframed, opaque byte payloads in both
//! directions and reports when the connection is gone. Connection setup,
//! TLS, framing and reconnect policy all live behind this trait. Message
//! semantics (handshake, correlation, routing) are handled by the session.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Shared base state for all transport implementations.
///
/// Embeds common fields so that default `Transport` trait implementations
/// can delegate to this struct rather than repeating logic in each transport.
///
/// # Usage
///
/// Each concrete transport embeds this as a field named `base`:
///
/// ```ignore
/// struct WebSocketTransport {
///     base: TransportBase,
///     // ... socket specific fields
/// }
///
/// impl Transport for WebSocketTransport {
///     fn base(&self) -> &TransportBase { &self.base }
/// }
/// ```
pub struct TransportBase {
    /// Identifier for this transport instance, used for logging.
    pub transport_id: String,
}

impl TransportBase {
    /// Create a new TransportBase.
    pub fn new(transport_id: impl Into<String>) -> Self {
        Self {
            transport_id: transport_id.into(),
        }
    }
}

/// Something the transport reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One complete inbound frame.
    Frame(Bytes),

    /// The connection is gone; no further frames will arrive.
    Lost(String),
}

/// Handle returned from [`Transport::subscribe`].
///
/// Yields inbound frames in arrival order, followed by at most one
/// [`TransportEvent::Lost`]. The inbox ending without a `Lost` event is
/// treated the same as a lost connection.
///
/// # Example
///
/// ```no_run
/// # use wamp_rpc::{create_memory_transport, TransportEvent};
/// # async fn example() -> wamp_rpc::Result<()> {
/// let (transport, _peer) = create_memory_transport("client");
///
/// let mut handle = transport.subscribe().await?;
/// while let Some(event) = handle.inbox.recv().await {
///     match event {
///         TransportEvent::Frame(bytes) => println!("frame: {} bytes", bytes.len()),
///         TransportEvent::Lost(reason) => println!("lost: {reason}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct FrameHandle {
    // ---
    /// Receiver channel for inbound transport events.
    pub inbox: mpsc::Receiver<TransportEvent>,
}

/// Transport abstraction.
///
/// A `Transport` carries frames between the session and the router. It
/// defines the minimal contract required by the session without committing
/// to any specific protocol.
///
/// Implementations must ensure that:
/// - Frames passed to `send()` reach the peer in call order.
/// - `send()` returns an error rather than silently dropping a frame when the
///   connection is known to be down.
/// - Frames received before `subscribe()` is called are buffered, not lost.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Available Implementations
///
/// - `create_memory_transport` - In-memory transport paired with a test peer
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. This is an implementation detail; consumers
/// should treat methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    ///
    /// Required method - each concrete transport must implement this
    /// by returning `&self.base`.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    ///
    /// Default implementation delegates to `base()`.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Send one complete frame to the peer.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Take the inbound event stream.
    ///
    /// A transport has a single consumer; a second call fails with
    /// [`WampError::InvalidConfiguration`](crate::WampError::InvalidConfiguration).
    async fn subscribe(&self) -> Result<FrameHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying connection
/// - Used to erase concrete transport types behind a stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
