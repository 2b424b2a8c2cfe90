//! Session dispatcher.
//!
//! The single owner of session state: the lifecycle state, the correlation
//! engine and its tables all live in one mutex-guarded `Core`. Every inbound
//! frame, outbound request and transport signal is applied under that lock,
//! one at a time, and the lock is never held across an `.await`.
//!
//! Two background tasks run per session:
//! - the reader drains the transport's frame handle and feeds the dispatcher
//! - the writer drains the ordered outbound queue into `Transport::send`
//!
//! Callers suspend on oneshot receivers, never inside the dispatcher.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::{Action, Completion, Engine, LocalId, Orphan, Release, Subscribed};
use crate::handler::{CallResult, EventHandler, InvocationHandler, Responder};
use crate::protocol::{
    decode_value, encode_value, validate_uri, Abort, Call, Goodbye, Hello, Message, MessageKind,
    Payload, PublicationId, Publish, Register, RegistrationId, RequestId, Subscribe,
    SubscriptionId, Unregister, Unsubscribe, Welcome,
};
use crate::session_state::Inbound;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_trace,
    log_warn,
    CallOptions,
    FrameHandle,
    PublishOptions,
    Result,
    Role,
    SerializerPtr,
    SessionConfig,
    SessionDetails,
    SessionState,
    SubscribeOptions,
    TransportEvent,
    TransportPtr,
    WampError,
    WireMap,
};

/// ABORT reason sent when the router breaks the protocol.
pub const PROTOCOL_VIOLATION: &str = "wamp.error.protocol_violation";

/// GOODBYE reason used to echo a router-initiated GOODBYE.
pub const GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// What the writer does once a frame has been handed to the transport.
enum OnSent {
    Nothing,
    /// Report the send result to the requester.
    Ack(oneshot::Sender<Result<()>>),
    /// GOODBYE echo sent: finish the close and release the transport.
    Finish,
    /// ABORT after a violation sent: release the transport.
    CloseTransport,
}

struct Outbound {
    // ---
    frame: Bytes,
    kind: MessageKind,
    on_sent: OnSent,
}

/// A request that is queued and tracked, not yet answered.
struct Issued<T> {
    // ---
    id: RequestId,
    ack: oneshot::Receiver<Result<()>>,
    reply: oneshot::Receiver<Result<T>>,
}

/// Why the session reached `Closed`.
#[derive(Debug, Clone)]
enum CloseCause {
    Local,
    Goodbye(String),
    Lost(String),
    Aborted {
        reason: String,
        message: Option<String>,
    },
    Violation(String),
}

impl CloseCause {
    /// Error handed to a `join()` still waiting at close time. Pending
    /// requests always fail with `SessionClosed`.
    fn error(&self) -> WampError {
        // ---
        match self {
            CloseCause::Local | CloseCause::Goodbye(_) | CloseCause::Lost(_) => {
                WampError::SessionClosed
            }
            CloseCause::Aborted { reason, message } => WampError::Aborted {
                reason: reason.clone(),
                message: message.clone(),
            },
            CloseCause::Violation(reason) => WampError::ProtocolViolation(reason.clone()),
        }
    }
}

struct Core {
    // ---
    state: SessionState,
    engine: Engine,
    details: Option<SessionDetails>,
    joining: Option<oneshot::Sender<Result<SessionDetails>>>,
    cause: Option<CloseCause>,
}

pub(crate) struct Inner {
    // ---
    transport: TransportPtr,
    serializer: SerializerPtr,
    config: SessionConfig,
    core: Mutex<Core>,
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        if let Some(reader) = lock_ignore_poison(&self.reader).take() {
            reader.abort();
        }
    }
}

/// Cheap handle onto one session's shared state.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    inner: Arc<Inner>,
}

/// Non-owning dispatcher handle held by responders and background tasks.
#[derive(Clone)]
pub(crate) struct WeakDispatcher {
    inner: Weak<Inner>,
}

impl WeakDispatcher {
    // ---

    pub fn upgrade(&self) -> Option<Dispatcher> {
        self.inner.upgrade().map(|inner| Dispatcher { inner })
    }

    /// A handle that never upgrades.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self { inner: Weak::new() }
    }
}

impl Dispatcher {
    // ---

    /// Attach to `transport` and start the reader and writer tasks.
    ///
    /// The session starts `Disconnected`; nothing is sent until `join()`.
    pub async fn start(
        transport: TransportPtr,
        serializer: SerializerPtr,
        config: SessionConfig,
    ) -> Result<Self> {
        // ---
        config.validate()?;

        let handle = transport.subscribe().await?;
        let (outbound, queue) = mpsc::unbounded_channel();

        log_debug!(
            "{}: session for realm {} attached ({} frames)",
            transport.transport_id(),
            config.realm,
            serializer.name()
        );

        let inner = Arc::new(Inner {
            transport: transport.clone(),
            serializer,
            config,
            core: Mutex::new(Core {
                state: SessionState::Disconnected,
                engine: Engine::new(),
                details: None,
                joining: None,
                cause: None,
            }),
            outbound,
            reader: Mutex::new(None),
        });

        tokio::spawn(Self::write_loop(transport, queue, Arc::downgrade(&inner)));
        let reader = tokio::spawn(Self::read_loop(handle, Arc::downgrade(&inner)));
        *lock_ignore_poison(&inner.reader) = Some(reader);

        Ok(Self { inner })
    }

    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        lock_ignore_poison(&self.inner.core)
    }

    // -------------------------------------------------------------------------
    // Background tasks
    // -------------------------------------------------------------------------

    async fn read_loop(mut handle: FrameHandle, weak: Weak<Inner>) {
        // ---
        loop {
            let event = handle.inbox.recv().await;

            let Some(inner) = weak.upgrade() else {
                break;
            };
            let dispatcher = Dispatcher { inner };

            match event {
                Some(TransportEvent::Frame(frame)) => dispatcher.on_frame(&frame),
                Some(TransportEvent::Lost(reason)) => dispatcher.on_lost(reason),
                None => dispatcher.on_lost("transport stream ended".into()),
            }

            if dispatcher.state() == SessionState::Closed {
                break;
            }
        }

        log_debug!("reader task stopped");
    }

    async fn write_loop(
        transport: TransportPtr,
        mut queue: mpsc::UnboundedReceiver<Outbound>,
        weak: Weak<Inner>,
    ) {
        // ---
        while let Some(item) = queue.recv().await {
            log_trace!("sending {} ({} bytes)", item.kind, item.frame.len());

            let sent = transport.send(item.frame).await;
            if let Err(_err) = &sent {
                log_warn!("failed to send {}: {_err}", item.kind);
            }

            match item.on_sent {
                OnSent::Nothing => {}
                OnSent::Ack(tx) => {
                    let _ = tx.send(sent);
                }
                OnSent::Finish => {
                    if let Some(inner) = weak.upgrade() {
                        let dispatcher = Dispatcher { inner };
                        dispatcher.finish_closing();
                    }
                    Self::close_transport(&transport).await;
                }
                OnSent::CloseTransport => Self::close_transport(&transport).await,
            }
        }

        log_debug!("writer task stopped");
    }

    async fn close_transport(transport: &TransportPtr) {
        // ---
        if let Err(_err) = transport.close().await {
            log_warn!("{}: transport close failed: {_err}", transport.transport_id());
        }
    }

    // -------------------------------------------------------------------------
    // Inbound path
    // -------------------------------------------------------------------------

    fn on_frame(&self, frame: &[u8]) {
        // ---
        let decoded = self
            .inner
            .serializer
            .deserialize(frame)
            .and_then(|value| Ok(decode_value(&value)?));

        match decoded {
            Ok(message) => self.on_message(message),
            Err(err) => self.on_undecodable(err),
        }
    }

    fn on_undecodable(&self, err: WampError) {
        // ---
        let mut core = self.lock();
        let state = core.state;
        match state {
            SessionState::Established => {
                log_warn!("dropping undecodable frame: {err}");
            }
            SessionState::Disconnected | SessionState::HandshakeSent => {
                self.violate(&mut core, format!("undecodable frame during handshake: {err}"));
            }
            SessionState::Closing | SessionState::Closed => {
                log_debug!("ignoring undecodable frame while closing: {err}");
            }
        }
    }

    fn on_message(&self, message: Message) {
        // ---
        let kind = message.kind();
        let mut core = self.lock();

        match core.state.inbound(kind) {
            Inbound::Accept => {}
            Inbound::Ignore => {
                log_debug!("ignoring {kind} while {}", core.state);
                return;
            }
            Inbound::Violation => {
                let reason = format!("received {kind} while {}", core.state);
                self.violate(&mut core, reason);
                return;
            }
        }

        log_trace!("received {kind}");

        let action = match message {
            Message::Welcome(welcome) => {
                self.on_welcome(&mut core, welcome);
                None
            }
            Message::Abort(abort) => {
                log_warn!("session aborted by router: {}", abort.reason);
                let message = abort.message().map(str::to_owned);
                self.finish(
                    &mut core,
                    CloseCause::Aborted {
                        reason: abort.reason,
                        message,
                    },
                );
                let transport = self.inner.transport.clone();
                tokio::spawn(async move { Self::close_transport(&transport).await });
                None
            }
            Message::Goodbye(goodbye) => {
                self.on_goodbye(&mut core, goodbye);
                None
            }
            other => core.engine.route(other),
        };

        if let Some(action) = action {
            drop(core);
            self.run(action);
        }
    }

    fn on_welcome(&self, core: &mut Core, welcome: Welcome) {
        // ---
        let details = SessionDetails::from_welcome(&self.inner.config.realm, welcome);
        log_info!(
            "session {} established on realm {}",
            details.session,
            details.realm
        );

        Self::transition(core, SessionState::Established);
        core.details = Some(details.clone());
        if let Some(joining) = core.joining.take() {
            let _ = joining.send(Ok(details));
        }
    }

    fn on_goodbye(&self, core: &mut Core, goodbye: Goodbye) {
        // ---
        if core.state == SessionState::Closing {
            // Echo of our own GOODBYE, or the router closing at the same time.
            self.finish(core, CloseCause::Goodbye(goodbye.reason));
            return;
        }

        log_info!("router closed the session: {}", goodbye.reason);
        Self::transition(core, SessionState::Closing);
        core.cause = Some(CloseCause::Goodbye(goodbye.reason));

        let echo = Goodbye::new(GOODBYE_AND_OUT, None).map(Message::Goodbye);
        let queued = echo.and_then(|echo| self.enqueue(&echo, OnSent::Finish));
        if let Err(_err) = queued {
            log_warn!("cannot echo GOODBYE: {_err}");
            let cause = core.cause.take().unwrap_or(CloseCause::Local);
            self.finish(core, cause);
        }
    }

    fn on_lost(&self, reason: String) {
        // ---
        let mut core = self.lock();
        if core.state == SessionState::Closed {
            return;
        }
        log_warn!("connection lost while {}: {reason}", core.state);
        self.finish(&mut core, CloseCause::Lost(reason));
    }

    fn run(&self, action: Action) {
        // ---
        match action {
            Action::Invoke {
                handler,
                invocation,
            } => {
                let responder = Responder::new(invocation.request, self.downgrade());
                tokio::spawn(handler(invocation, responder));
            }
            Action::Send(messages) => {
                for message in messages {
                    let _kind = message.kind();
                    if let Err(_err) = self.send_reply(message) {
                        log_warn!("cannot send {_kind}: {_err}");
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // State transitions
    // -------------------------------------------------------------------------

    fn transition(core: &mut Core, to: SessionState) {
        // ---
        log_debug!("state {} -> {to}", core.state);
        core.state = to;
    }

    /// Move to `Closed`, failing whatever is still pending.
    fn finish(&self, core: &mut Core, cause: CloseCause) {
        // ---
        if core.state == SessionState::Closed {
            return;
        }
        Self::transition(core, SessionState::Closed);

        let _failed = core.engine.sweep(&WampError::SessionClosed);
        if let Some(joining) = core.joining.take() {
            let _ = joining.send(Err(cause.error()));
        }

        log_info!("session closed ({cause:?}); {_failed} pending requests failed");
        core.cause = Some(cause);
    }

    /// The GOODBYE echo left; complete a router-initiated close.
    fn finish_closing(&self) {
        // ---
        let mut core = self.lock();
        if core.state != SessionState::Closed {
            let cause = core.cause.take().unwrap_or(CloseCause::Local);
            self.finish(&mut core, cause);
        }
    }

    /// Fail the session: best-effort ABORT, then close.
    fn violate(&self, core: &mut Core, reason: String) {
        // ---
        log_error!("protocol violation: {reason}");

        let abort = Abort::new(PROTOCOL_VIOLATION, Some(&reason)).map(Message::Abort);
        if let Err(_err) = abort.and_then(|abort| self.enqueue(&abort, OnSent::CloseTransport)) {
            log_warn!("cannot send ABORT: {_err}");
        }

        self.finish(core, CloseCause::Violation(reason));
    }

    // -------------------------------------------------------------------------
    // Outbound path
    // -------------------------------------------------------------------------

    fn encode(&self, message: &Message) -> Result<Bytes> {
        self.inner.serializer.serialize(&encode_value(message))
    }

    fn enqueue(&self, message: &Message, on_sent: OnSent) -> Result<()> {
        // ---
        let frame = self.encode(message)?;
        self.inner
            .outbound
            .send(Outbound {
                frame,
                kind: message.kind(),
                on_sent,
            })
            .map_err(|_| WampError::SessionClosed)
    }

    fn enqueue_acked(&self, message: &Message) -> Result<oneshot::Receiver<Result<()>>> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.enqueue(message, OnSent::Ack(tx))?;
        Ok(rx)
    }

    async fn sent(ack: oneshot::Receiver<Result<()>>) -> Result<()> {
        ack.await.unwrap_or(Err(WampError::SessionClosed))
    }

    async fn await_reply<T>(
        &self,
        reply: oneshot::Receiver<Result<T>>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        // ---
        let outcome = match timeout.or(self.inner.config.request_timeout) {
            Some(limit) => tokio::time::timeout(limit, reply)
                .await
                .map_err(|_| WampError::Timeout)?,
            None => reply.await,
        };
        outcome.unwrap_or(Err(WampError::SessionClosed))
    }

    /// Allocate an id, queue the request frame and track it.
    fn issue<T>(
        &self,
        core: &mut Core,
        kind: MessageKind,
        build: impl FnOnce(RequestId) -> Result<Message>,
        completion: impl FnOnce(oneshot::Sender<Result<T>>) -> Completion,
    ) -> Result<Issued<T>> {
        // ---
        core.state.check_outbound(kind)?;

        let (tx, reply) = oneshot::channel();
        let id = core.engine.allocate();
        let message = build(id)?;
        let ack = self.enqueue_acked(&message)?;
        core.engine.track(id, completion(tx));

        Ok(Issued { id, ack, reply })
    }

    /// Wait for an issued request to be sent and answered.
    ///
    /// A request that times out is dropped from the pending table.
    async fn complete<T>(&self, issued: Issued<T>, timeout: Option<Duration>) -> Result<T> {
        // ---
        let Issued { id, ack, reply } = issued;

        if let Err(err) = Self::sent(ack).await {
            self.lock().engine.forget(id);
            return Err(err);
        }

        let outcome = self.await_reply(reply, timeout).await;
        if matches!(outcome, Err(WampError::Timeout)) {
            let follow_up = self.lock().engine.abandon(id);
            if let Some(action) = follow_up {
                self.run(action);
            }
        }
        outcome
    }

    /// Issue one correlated request and wait for its reply.
    async fn request<T>(
        &self,
        kind: MessageKind,
        build: impl FnOnce(RequestId) -> Result<Message>,
        completion: impl FnOnce(oneshot::Sender<Result<T>>) -> Completion,
        timeout: Option<Duration>,
    ) -> Result<T> {
        // ---
        let issued = {
            let mut core = self.lock();
            self.issue(&mut core, kind, build, completion)?
        };
        self.complete(issued, timeout).await
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Send HELLO and wait for WELCOME or ABORT.
    pub async fn join(&self) -> Result<SessionDetails> {
        // ---
        let (tx, rx) = oneshot::channel();

        let ack = {
            let mut core = self.lock();
            core.state.check_outbound(MessageKind::Hello)?;

            let config = &self.inner.config;
            let hello = Hello::new(&config.realm, &config.roles, config.hello_details.clone())?;
            let ack = self.enqueue_acked(&Message::Hello(hello))?;

            Self::transition(&mut core, SessionState::HandshakeSent);
            core.joining = Some(tx);
            ack
        };

        if let Err(err) = Self::sent(ack).await {
            let mut core = self.lock();
            self.finish(&mut core, CloseCause::Lost(err.to_string()));
            return Err(err);
        }

        self.await_reply(rx, None).await
    }

    pub async fn call(
        &self,
        procedure: &str,
        payload: Payload,
        options: CallOptions,
    ) -> Result<CallResult> {
        // ---
        self.inner.config.roles.require(Role::Caller, "call")?;

        let wire = options.to_wire();
        self.request(
            MessageKind::Call,
            |id| Ok(Message::Call(Call::new(id, wire, procedure, payload)?)),
            Completion::Call,
            options.timeout,
        )
        .await
    }

    pub async fn subscribe(
        &self,
        topic: &str,
        options: SubscribeOptions,
        handler: EventHandler,
    ) -> Result<Subscribed> {
        // ---
        self.inner.config.roles.require(Role::Subscriber, "subscribe")?;

        let owned = topic.to_owned();
        let wire = options.to_wire();
        let sent_options = wire.clone();
        self.request(
            MessageKind::Subscribe,
            |id| Ok(Message::Subscribe(Subscribe::new(id, sent_options, topic)?)),
            move |reply| Completion::Subscribe {
                topic: owned,
                options: wire,
                handler,
                reply,
            },
            None,
        )
        .await
    }

    pub async fn unsubscribe(&self, subscription: SubscriptionId, local: LocalId) -> Result<()> {
        // ---
        self.inner
            .config
            .roles
            .require(Role::Subscriber, "unsubscribe")?;

        let issued = {
            let mut core = self.lock();
            core.state.check_outbound(MessageKind::Unsubscribe)?;
            match core.engine.release_subscription(subscription, local) {
                Release::Unknown => {
                    return Err(WampError::InvalidConfiguration(format!(
                        "subscription {subscription} is not active or already being released"
                    )))
                }
                Release::Released => return Ok(()),
                Release::Last => {}
            }

            let issued = self.issue(
                &mut core,
                MessageKind::Unsubscribe,
                |id| {
                    Ok(Message::Unsubscribe(Unsubscribe {
                        request: id,
                        subscription,
                    }))
                },
                |reply| Completion::Unsubscribe {
                    subscription,
                    local: Some(local),
                    reply,
                },
            );
            if issued.is_err() {
                core.engine.restore_subscription(subscription);
            }
            issued?
        };

        self.complete(issued, None).await
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: Payload,
        options: PublishOptions,
    ) -> Result<Option<PublicationId>> {
        // ---
        self.inner.config.roles.require(Role::Publisher, "publish")?;

        let wire = options.to_wire();
        if options.acknowledge {
            return self
                .request(
                    MessageKind::Publish,
                    |id| Ok(Message::Publish(Publish::new(id, wire, topic, payload)?)),
                    Completion::Publish,
                    None,
                )
                .await
                .map(Some);
        }

        let ack = {
            let mut core = self.lock();
            core.state.check_outbound(MessageKind::Publish)?;

            let id = core.engine.allocate();
            let message = Message::Publish(Publish::new(id, wire, topic, payload)?);
            self.enqueue_acked(&message)?
        };

        Self::sent(ack).await.map(|()| None)
    }

    pub async fn register(
        &self,
        procedure: &str,
        handler: InvocationHandler,
    ) -> Result<RegistrationId> {
        // ---
        self.inner.config.roles.require(Role::Callee, "register")?;

        let owned = procedure.to_owned();
        self.request(
            MessageKind::Register,
            |id| Ok(Message::Register(Register::new(id, WireMap::new(), procedure)?)),
            move |reply| Completion::Register {
                procedure: owned,
                handler,
                reply,
            },
            None,
        )
        .await
    }

    pub async fn unregister(&self, registration: RegistrationId) -> Result<()> {
        // ---
        self.inner.config.roles.require(Role::Callee, "unregister")?;

        let issued = {
            let mut core = self.lock();
            core.state.check_outbound(MessageKind::Unregister)?;
            if !core.engine.release_registration(registration) {
                return Err(WampError::InvalidConfiguration(format!(
                    "registration {registration} is not active or already being released"
                )));
            }

            let issued = self.issue(
                &mut core,
                MessageKind::Unregister,
                |id| {
                    Ok(Message::Unregister(Unregister {
                        request: id,
                        registration,
                    }))
                },
                |reply| Completion::Unregister {
                    registration,
                    reply,
                },
            );
            if issued.is_err() {
                core.engine.restore_registration(registration);
            }
            issued?
        };

        self.complete(issued, None).await
    }

    /// Queue a message that expects no reply: a responder's YIELD or ERROR,
    /// or follow-up frames from the engine.
    pub fn send_reply(&self, message: Message) -> Result<()> {
        // ---
        let core = self.lock();
        core.state.check_outbound(message.kind())?;
        self.enqueue(&message, OnSent::Nothing)
    }

    /// Close the session.
    ///
    /// Established: GOODBYE, then `Closed` once the frame is sent.
    /// Handshake in progress: ABORT. Not joined: straight to `Closed`.
    pub async fn close(&self, reason: Option<&str>) -> Result<()> {
        // ---
        let reason = reason.unwrap_or(&self.inner.config.close_reason).to_owned();
        validate_uri(&reason)?;

        let ack = {
            let mut core = self.lock();
            let state = core.state;
            match state {
                SessionState::Closing => return Ok(()),
                SessionState::Closed => None,
                SessionState::Disconnected => {
                    self.finish(&mut core, CloseCause::Local);
                    None
                }
                SessionState::HandshakeSent => {
                    let abort = Message::Abort(Abort::new(&reason, None)?);
                    let ack = self.enqueue_acked(&abort).ok();
                    self.finish(&mut core, CloseCause::Local);
                    ack
                }
                SessionState::Established => {
                    let goodbye = Message::Goodbye(Goodbye::new(&reason, None)?);
                    let ack = self.enqueue_acked(&goodbye)?;
                    Self::transition(&mut core, SessionState::Closing);
                    Some(ack)
                }
            }
        };

        if let Some(ack) = ack {
            if let Err(_err) = Self::sent(ack).await {
                log_debug!("closing frame not sent: {_err}");
            }
        }

        {
            let mut core = self.lock();
            self.finish(&mut core, CloseCause::Local);
        }

        if let Some(reader) = lock_ignore_poison(&self.inner.reader).take() {
            reader.abort();
        }
        self.inner.transport.close().await
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn details(&self) -> Option<SessionDetails> {
        self.lock().details.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().engine.pending_len()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().engine.subscription_count()
    }

    pub fn registration_count(&self) -> usize {
        self.lock().engine.registration_count()
    }

    pub fn take_orphans(&self) -> Option<mpsc::UnboundedReceiver<Orphan>> {
        self.lock().engine.take_orphans()
    }
}
