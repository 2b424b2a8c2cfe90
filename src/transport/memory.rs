//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, for embedding a
//! router in the same process, and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. All other transport implementations are expected to approximate this
//! behavior as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! In particular, the in-memory transport establishes the following expectations:
//!
//! - Frames are delivered to the other side in exactly the order they were sent.
//! - Frames injected before `subscribe()` is called are buffered.
//! - Once the connection is lost or closed, `send()` fails instead of dropping.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate the failure modes of any
//! specific socket library. It exists to provide a clear, deterministic
//! baseline against which session behavior can be validated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::{
    // ---
    log_debug,
    FrameHandle,
    Result,
    Transport,
    TransportBase,
    TransportEvent,
    TransportPtr,
    WampError,
};

const INBOX_CAPACITY: usize = 64;

/// Connection flags shared by both ends of the pipe.
#[derive(Default)]
struct Link {
    // ---
    lost: AtomicBool,
    closed: AtomicBool,
}

/// Router side of an in-memory connection.
///
/// Returned together with the client side [`TransportPtr`] by
/// [`create_memory_transport`]. Whoever holds it plays the router: it reads
/// the frames the session sent, injects frames for the session to receive,
/// and can simulate a dropped connection.
pub struct MemoryPeer {
    // ---
    sent: mpsc::UnboundedReceiver<Bytes>,
    inbound: mpsc::Sender<TransportEvent>,
    link: Arc<Link>,
}

impl MemoryPeer {
    // ---

    /// Next frame sent by the client, or `None` once the client closed the
    /// transport and every earlier frame has been read.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        self.sent.recv().await
    }

    /// Non-blocking form of [`recv_frame`](Self::recv_frame).
    pub fn try_recv_frame(&mut self) -> Option<Bytes> {
        self.sent.try_recv().ok()
    }

    /// Deliver a frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`WampError::Transport`] once the connection is lost or the
    /// client side has gone away.
    pub async fn send_frame(&self, frame: impl Into<Bytes>) -> Result<()> {
        // ---
        if self.link.lost.load(Ordering::SeqCst) {
            return Err(WampError::Transport("connection lost".into()));
        }
        self.inbound
            .send(TransportEvent::Frame(frame.into()))
            .await
            .map_err(|_| WampError::Transport("client side dropped".into()))
    }

    /// Simulate the connection dropping.
    ///
    /// The client receives [`TransportEvent::Lost`] after any frames already
    /// injected, and its subsequent sends fail.
    pub async fn lose_connection(&self, reason: &str) -> Result<()> {
        // ---
        self.link.lost.store(true, Ordering::SeqCst);
        self.inbound
            .send(TransportEvent::Lost(reason.to_owned()))
            .await
            .map_err(|_| WampError::Transport("client side dropped".into()))
    }

    /// Whether the client side called [`Transport::close`].
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::SeqCst)
    }
}

/// Client side of an in-memory connection.
struct MemoryTransport {
    // ---
    base: TransportBase,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    inbox: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    link: Arc<Link>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        // ---
        if self.link.lost.load(Ordering::SeqCst) {
            return Err(WampError::Transport("connection lost".into()));
        }

        let outbound = self.outbound.lock().await;
        let sender = outbound
            .as_ref()
            .ok_or_else(|| WampError::Transport("transport closed".into()))?;

        log_debug!("{}: send {} bytes", self.transport_id(), frame.len());

        sender
            .send(frame)
            .map_err(|_| WampError::Transport("peer dropped".into()))
    }

    async fn subscribe(&self) -> Result<FrameHandle> {
        // ---
        let inbox = self.inbox.lock().await.take().ok_or_else(|| {
            WampError::InvalidConfiguration("memory transport already subscribed".into())
        })?;

        Ok(FrameHandle { inbox })
    }

    /// Close the client side. The peer observes the end of the frame stream
    /// and [`MemoryPeer::is_closed`] turns true.
    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing transport...", self.transport_id());

        self.link.closed.store(true, Ordering::SeqCst);
        self.outbound.lock().await.take();
        Ok(())
    }
}

/// Create a connected pair: the client side transport and its router peer.
///
/// # Example
///
/// ```
/// # use wamp_rpc::{create_memory_transport, Transport};
/// # async fn example() -> wamp_rpc::Result<()> {
/// let (transport, mut peer) = create_memory_transport("client");
///
/// transport.send(bytes::Bytes::from_static(b"[6,{},\"wamp.close.normal\"]")).await?;
/// assert!(peer.recv_frame().await.is_some());
/// # Ok(())
/// # }
/// ```
pub fn create_memory_transport(transport_id: impl Into<String>) -> (TransportPtr, MemoryPeer) {
    // ---
    let base = TransportBase::new(transport_id);
    log_debug!("{}: create memory transport", base.transport_id);

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::channel(INBOX_CAPACITY);
    let link = Arc::new(Link::default());

    let transport = MemoryTransport {
        base,
        outbound: Mutex::new(Some(out_tx)),
        inbox: Mutex::new(Some(in_rx)),
        link: link.clone(),
    };

    let peer = MemoryPeer {
        sent: out_rx,
        inbound: in_tx,
        link,
    };

    (Arc::new(transport), peer)
}
