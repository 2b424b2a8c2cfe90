//! Application-facing WAMP session.
//!
//! A [`Session`] is a cheap, cloneable handle onto one dispatcher. All clones
//! share the same connection, state and correlation tables.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::engine::{LocalId, Orphan};
use crate::handler::{wrap_call_handler, wrap_event_handler, wrap_responder_handler};
use crate::protocol::{
    Event, Invocation, Payload, PublicationId, RegistrationId, SessionId, SubscriptionId, Welcome,
};
use crate::{
    // ---
    CallOptions,
    CallResult,
    JsonSerializer,
    PublishOptions,
    RemoteError,
    Responder,
    Result,
    Roles,
    SerializerPtr,
    SessionConfig,
    SessionState,
    SubscribeOptions,
    TransportPtr,
    WireMap,
    WireValue,
};

/// Session metadata taken from WELCOME.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetails {
    // ---
    /// Router-assigned session id.
    pub session: SessionId,
    pub realm: String,
    pub authid: Option<String>,
    pub authrole: Option<String>,
    /// Router roles announced in WELCOME (`broker`, `dealer`, ...).
    pub router_roles: Vec<String>,
    /// The complete WELCOME details.
    pub details: WireMap,
}

impl SessionDetails {
    pub(crate) fn from_welcome(realm: &str, welcome: Welcome) -> Self {
        // ---
        let text = |key: &str| {
            welcome
                .details
                .get(key)
                .and_then(WireValue::as_str)
                .map(str::to_owned)
        };

        let router_roles = welcome
            .details
            .get("roles")
            .and_then(WireValue::as_map)
            .map(|roles| roles.keys().cloned().collect())
            .unwrap_or_default();

        Self {
            session: welcome.session,
            realm: realm.to_owned(),
            authid: text("authid"),
            authrole: text("authrole"),
            router_roles,
            details: welcome.details,
        }
    }
}

/// A WAMP client session over one transport.
///
/// # Example
///
/// ```no_run
/// use wamp_rpc::{CallResult, Session, SessionConfig, TransportPtr, WireMap, WireValue};
///
/// # async fn example(transport: TransportPtr) -> wamp_rpc::Result<()> {
/// let session = Session::new(transport, SessionConfig::new("com.example.realm")).await?;
/// let details = session.join().await?;
/// println!("joined as session {}", details.session);
///
/// let _registration = session
///     .register("com.example.add", |inv| async move {
///         let a = inv.payload.arg(0).and_then(WireValue::as_i64).unwrap_or(0);
///         let b = inv.payload.arg(1).and_then(WireValue::as_i64).unwrap_or(0);
///         Ok(CallResult::new(vec![WireValue::from(a + b)]))
///     })
///     .await?;
///
/// let sum = session
///     .call("com.example.add", vec![2.into(), 3.into()], WireMap::new())
///     .await?;
/// assert_eq!(sum.arg(0), Some(&WireValue::from(5)));
///
/// session.close(None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    dispatcher: Dispatcher,
}

impl Session {
    // ---

    /// Attach a session to `transport` using JSON frames.
    ///
    /// The session starts [`Disconnected`](SessionState::Disconnected);
    /// call [`join`](Self::join) to send HELLO.
    pub async fn new(transport: TransportPtr, config: SessionConfig) -> Result<Self> {
        Self::with_serializer(transport, Arc::new(JsonSerializer), config).await
    }

    /// Attach a session with an explicit frame serializer.
    pub async fn with_serializer(
        transport: TransportPtr,
        serializer: SerializerPtr,
        config: SessionConfig,
    ) -> Result<Self> {
        // ---
        let dispatcher = Dispatcher::start(transport, serializer, config).await?;
        Ok(Self { dispatcher })
    }

    /// Attach and join `realm` in one step.
    ///
    /// `details` are sent with HELLO next to the generated `roles`.
    pub async fn connect(
        transport: TransportPtr,
        realm: &str,
        roles: Roles,
        details: WireMap,
    ) -> Result<Self> {
        // ---
        let mut config = SessionConfig::new(realm).with_roles(roles);
        config.hello_details = details;

        let session = Self::new(transport, config).await?;
        session.join().await?;
        Ok(session)
    }

    /// Send HELLO and wait for the router's answer.
    ///
    /// # Errors
    ///
    /// - [`WampError::Aborted`](crate::WampError::Aborted) if the router refuses the session
    /// - [`WampError::ProtocolViolation`](crate::WampError::ProtocolViolation) if HELLO was
    ///   already sent on this connection (nothing is sent)
    /// - [`WampError::Timeout`](crate::WampError::Timeout) if a request timeout is configured
    ///   and expires
    pub async fn join(&self) -> Result<SessionDetails> {
        self.dispatcher.join().await
    }

    /// Call `procedure` and wait for its result.
    ///
    /// An ERROR reply surfaces as [`WampError::Remote`](crate::WampError::Remote).
    pub async fn call(
        &self,
        procedure: &str,
        args: Vec<WireValue>,
        kwargs: WireMap,
    ) -> Result<CallResult> {
        self.call_with_options(procedure, args, kwargs, CallOptions::default())
            .await
    }

    pub async fn call_with_options(
        &self,
        procedure: &str,
        args: Vec<WireValue>,
        kwargs: WireMap,
        options: CallOptions,
    ) -> Result<CallResult> {
        self.dispatcher
            .call(procedure, Payload::new(args, kwargs), options)
            .await
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// Events of one subscription reach the handler one at a time, in the
    /// order they arrived.
    pub async fn subscribe<F, Fut>(&self, topic: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe_with_options(topic, SubscribeOptions::default(), handler)
            .await
    }

    pub async fn subscribe_with_options<F, Fut>(
        &self,
        topic: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<Subscription>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // ---
        let subscribed = self
            .dispatcher
            .subscribe(topic, options, wrap_event_handler(handler))
            .await?;

        Ok(Subscription {
            id: subscribed.subscription,
            local: subscribed.local,
            topic: topic.to_owned(),
            session: self.clone(),
        })
    }

    /// Publish to `topic`.
    ///
    /// Returns the publication id when [`PublishOptions::acknowledge`] is
    /// set, `None` once the frame is sent otherwise.
    pub async fn publish(
        &self,
        topic: &str,
        args: Vec<WireValue>,
        kwargs: WireMap,
        options: PublishOptions,
    ) -> Result<Option<PublicationId>> {
        self.dispatcher
            .publish(topic, Payload::new(args, kwargs), options)
            .await
    }

    /// Register `procedure`; each invocation is answered with the
    /// handler's return value.
    pub async fn register<F, Fut>(&self, procedure: &str, handler: F) -> Result<Registration>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<CallResult, RemoteError>> + Send + 'static,
    {
        // ---
        let id = self
            .dispatcher
            .register(procedure, wrap_call_handler(handler))
            .await?;
        Ok(self.registration(id, procedure))
    }

    /// Register `procedure` with a handler that answers through a
    /// [`Responder`], possibly after it returns.
    pub async fn register_with_responder<F, Fut>(
        &self,
        procedure: &str,
        handler: F,
    ) -> Result<Registration>
    where
        F: Fn(Invocation, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // ---
        let id = self
            .dispatcher
            .register(procedure, wrap_responder_handler(handler))
            .await?;
        Ok(self.registration(id, procedure))
    }

    fn registration(&self, id: RegistrationId, procedure: &str) -> Registration {
        Registration {
            id,
            procedure: procedure.to_owned(),
            session: self.clone(),
        }
    }

    /// Remove a subscription. The broker is told only when the last local
    /// subscription sharing its id goes away.
    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        self.dispatcher
            .unsubscribe(subscription.id, subscription.local)
            .await
    }

    pub async fn unregister(&self, registration: Registration) -> Result<()> {
        self.dispatcher.unregister(registration.id).await
    }

    /// Leave the realm and close the transport.
    ///
    /// `reason` defaults to the configured close reason. Closing a session
    /// that is already closed succeeds.
    pub async fn close(&self, reason: Option<&str>) -> Result<()> {
        self.dispatcher.close(reason).await
    }

    pub fn state(&self) -> SessionState {
        self.dispatcher.state()
    }

    /// WELCOME details, once joined.
    pub fn details(&self) -> Option<SessionDetails> {
        self.dispatcher.details()
    }

    pub fn config(&self) -> &SessionConfig {
        self.dispatcher.config()
    }

    /// Events and invocations that matched no local subscription or
    /// registration. Available once; later calls return `None`.
    pub fn take_orphans(&self) -> Option<mpsc::UnboundedReceiver<Orphan>> {
        self.dispatcher.take_orphans()
    }

    /// Requests still waiting for a reply, abandoned ones included.
    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Local subscriptions currently delivering events.
    pub fn subscription_count(&self) -> usize {
        self.dispatcher.subscription_count()
    }

    /// Procedures currently registered.
    pub fn registration_count(&self) -> usize {
        self.dispatcher.registration_count()
    }
}

/// An active subscription.
#[derive(Clone)]
pub struct Subscription {
    // ---
    id: SubscriptionId,
    local: LocalId,
    topic: String,
    session: Session,
}

impl Subscription {
    /// Broker-assigned subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn unsubscribe(self) -> Result<()> {
        let session = self.session.clone();
        session.unsubscribe(self).await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// An active registration.
#[derive(Clone)]
pub struct Registration {
    // ---
    id: RegistrationId,
    procedure: String,
    session: Session,
}

impl Registration {
    /// Dealer-assigned registration id.
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub async fn unregister(self) -> Result<()> {
        let session = self.session.clone();
        session.unregister(self).await
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("procedure", &self.procedure)
            .finish()
    }
}
