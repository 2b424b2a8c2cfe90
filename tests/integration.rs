// tests/integration.rs
//
// Drives a Session over the in-memory transport. The test plays the router:
// it reads the frames the session sends and answers with its own.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use wamp_rpc::{
    // ---
    create_memory_transport,
    decode_value,
    encode_value,
    Abort,
    CallOptions,
    CallResult,
    ErrorMessage,
    Event,
    Goodbye,
    Invocation,
    JsonSerializer,
    MemoryPeer,
    Message,
    MessageKind,
    Orphan,
    Payload,
    PublicationId,
    Published,
    PublishOptions,
    Registered,
    RegistrationId,
    RemoteError,
    ResultMessage,
    Role,
    Roles,
    Serializer,
    Session,
    SessionConfig,
    SessionId,
    SessionState,
    Subscribed,
    SubscriptionId,
    Unregistered,
    Unsubscribed,
    WampError,
    Welcome,
    WireMap,
    WireValue,
    GOODBYE_AND_OUT,
    NO_SUCH_REGISTRATION,
    PROTOCOL_VIOLATION,
    RUNTIME_ERROR,
};

const WAIT: Duration = Duration::from_millis(500);

fn init_logging() {
    // ---
    #[cfg(feature = "logging")]
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The router end of the connection.
struct Router {
    // ---
    peer: MemoryPeer,
    json: JsonSerializer,
}

impl Router {
    // ---

    /// Next message the session sent.
    async fn recv(&mut self) -> Message {
        // ---
        let frame = timeout(WAIT, self.peer.recv_frame())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the transport");
        let value = self.json.deserialize(&frame).expect("client sent invalid json");
        decode_value(&value).expect("client sent an undecodable message")
    }

    async fn send(&self, message: Message) {
        // ---
        let frame = self
            .json
            .serialize(&encode_value(&message))
            .expect("serialize failed");
        self.peer.send_frame(frame).await.expect("inject failed");
    }

    async fn send_raw(&self, json: &'static str) {
        self.peer
            .send_frame(json.as_bytes())
            .await
            .expect("inject failed");
    }

    /// Nothing was sent by the session.
    fn assert_silent(&mut self) {
        assert!(self.peer.try_recv_frame().is_none(), "unexpected frame sent");
    }
}

fn router_details() -> WireMap {
    // ---
    let mut roles = WireMap::new();
    roles.insert("broker".into(), WireValue::Map(WireMap::new()));
    roles.insert("dealer".into(), WireValue::Map(WireMap::new()));

    let mut details = WireMap::new();
    details.insert("roles".into(), WireValue::Map(roles));
    details.insert("authid".into(), "anonymous".into());
    details
}

async fn attach(roles: Roles) -> (Session, Router) {
    attach_with(SessionConfig::new("myrealm").with_roles(roles)).await
}

async fn attach_with(config: SessionConfig) -> (Session, Router) {
    // ---
    init_logging();

    let (transport, peer) = create_memory_transport("client");
    let session = Session::new(transport, config).await.expect("attach failed");

    (
        session,
        Router {
            peer,
            json: JsonSerializer,
        },
    )
}

/// An established session with all roles.
async fn established() -> (Session, Router) {
    establish(attach(Roles::all()).await).await
}

/// Run the handshake on an attached session.
async fn establish((session, mut router): (Session, Router)) -> (Session, Router) {
    // ---

    let joining = tokio::spawn({
        let session = session.clone();
        async move { session.join().await }
    });

    let Message::Hello(_) = router.recv().await else {
        panic!("expected HELLO");
    };
    router
        .send(Message::Welcome(Welcome {
            session: SessionId(12345),
            details: router_details(),
        }))
        .await;

    joining
        .await
        .expect("join task panicked")
        .expect("join failed");
    (session, router)
}

fn spawn_call(session: &Session, procedure: &'static str, args: Vec<WireValue>) -> tokio::task::JoinHandle<wamp_rpc::Result<CallResult>> {
    // ---
    let session = session.clone();
    tokio::spawn(async move { session.call(procedure, args, WireMap::new()).await })
}

// -----------------------------------------------------------------------------
// Handshake
// -----------------------------------------------------------------------------

#[tokio::test]
async fn handshake_establishes_session() {
    // ---
    // Arrange
    // ---
    let (session, mut router) = attach(Roles::new([Role::Subscriber]).unwrap()).await;
    assert_eq!(session.state(), SessionState::Disconnected);

    // ---
    // Act
    // ---
    let joining = tokio::spawn({
        let session = session.clone();
        async move { session.join().await }
    });

    let Message::Hello(hello) = router.recv().await else {
        panic!("expected HELLO");
    };
    assert_eq!(hello.realm, "myrealm");
    assert_eq!(hello.roles(), Some(Roles::new([Role::Subscriber]).unwrap()));
    assert_eq!(session.state(), SessionState::HandshakeSent);

    router
        .send(Message::Welcome(Welcome {
            session: SessionId(12345),
            details: router_details(),
        }))
        .await;

    // ---
    // Assert
    // ---
    let details = joining.await.unwrap().expect("join failed");
    assert_eq!(details.session, SessionId(12345));
    assert_eq!(details.realm, "myrealm");
    assert_eq!(details.authid.as_deref(), Some("anonymous"));
    assert_eq!(details.router_roles, vec!["broker", "dealer"]);
    assert_eq!(session.state(), SessionState::Established);
    assert_eq!(session.details(), Some(details));
}

#[tokio::test]
async fn second_hello_is_refused_without_sending() {
    // ---
    let (session, mut router) = established().await;

    let again = session.join().await;

    assert!(matches!(again, Err(WampError::ProtocolViolation(_))));
    assert_eq!(session.state(), SessionState::Established);
    router.assert_silent();
}

#[tokio::test]
async fn second_hello_during_handshake_is_refused() {
    // ---
    let (session, mut router) = attach(Roles::all()).await;

    let joining = tokio::spawn({
        let session = session.clone();
        async move { session.join().await }
    });
    let Message::Hello(_) = router.recv().await else {
        panic!("expected HELLO");
    };

    assert!(matches!(
        session.join().await,
        Err(WampError::ProtocolViolation(_))
    ));
    router.assert_silent();

    router
        .send(Message::Welcome(Welcome {
            session: SessionId(7),
            details: router_details(),
        }))
        .await;
    assert!(joining.await.unwrap().is_ok());
}

#[tokio::test]
async fn abort_rejects_handshake() {
    // ---
    let (session, mut router) = attach(Roles::all()).await;

    let joining = tokio::spawn({
        let session = session.clone();
        async move { session.join().await }
    });
    let Message::Hello(_) = router.recv().await else {
        panic!("expected HELLO");
    };

    router
        .send(Message::Abort(
            Abort::new("wamp.error.no_such_realm", Some("realm does not exist")).unwrap(),
        ))
        .await;

    match joining.await.unwrap() {
        Err(WampError::Aborted { reason, message }) => {
            assert_eq!(reason, "wamp.error.no_such_realm");
            assert_eq!(message.as_deref(), Some("realm does not exist"));
        }
        other => panic!("expected Aborted, got {:?}", other.map(|d| d.session)),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn connect_joins_in_one_step() {
    // ---
    init_logging();
    let (transport, peer) = create_memory_transport("client");
    let mut router = Router {
        peer,
        json: JsonSerializer,
    };

    let mut details = WireMap::new();
    details.insert("agent".into(), "tests/1.0".into());

    let connecting = tokio::spawn(async move {
        Session::connect(transport, "myrealm", Roles::new([Role::Caller]).unwrap(), details).await
    });

    let Message::Hello(hello) = router.recv().await else {
        panic!("expected HELLO");
    };
    assert_eq!(hello.details.get("agent"), Some(&WireValue::from("tests/1.0")));
    router
        .send(Message::Welcome(Welcome {
            session: SessionId(99),
            details: router_details(),
        }))
        .await;

    let session = connecting.await.unwrap().expect("connect failed");
    assert_eq!(session.details().map(|d| d.session), Some(SessionId(99)));
}

#[tokio::test]
async fn message_before_welcome_is_a_violation() {
    // ---
    let (session, mut router) = attach(Roles::all()).await;

    let joining = tokio::spawn({
        let session = session.clone();
        async move { session.join().await }
    });
    let Message::Hello(_) = router.recv().await else {
        panic!("expected HELLO");
    };

    // RESULT while the handshake is still open
    router.send_raw(r#"[50, 1, {}]"#).await;

    assert!(matches!(
        joining.await.unwrap(),
        Err(WampError::ProtocolViolation(_))
    ));
    let Message::Abort(abort) = router.recv().await else {
        panic!("expected ABORT");
    };
    assert_eq!(abort.reason, PROTOCOL_VIOLATION);
    assert_eq!(session.state(), SessionState::Closed);
}

// -----------------------------------------------------------------------------
// Publish / subscribe
// -----------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_then_event_reaches_handler() {
    // ---
    // Arrange
    // ---
    let (session, mut router) = established().await;
    let (tx, mut events) = mpsc::unbounded_channel();

    // ---
    // Act
    // ---
    let subscribing = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .subscribe("com.example.topic", move |event: Event| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(event.payload.args);
                    }
                })
                .await
        }
    });

    let Message::Subscribe(subscribe) = router.recv().await else {
        panic!("expected SUBSCRIBE");
    };
    assert_eq!(subscribe.request.value(), 1);
    assert_eq!(subscribe.topic, "com.example.topic");

    router
        .send(Message::Subscribed(Subscribed {
            request: subscribe.request,
            subscription: SubscriptionId(555),
        }))
        .await;

    let subscription = subscribing.await.unwrap().expect("subscribe failed");
    assert_eq!(subscription.id(), SubscriptionId(555));
    assert_eq!(subscription.topic(), "com.example.topic");

    router
        .send(Message::Event(Event {
            subscription: SubscriptionId(555),
            publication: PublicationId(1),
            details: WireMap::new(),
            payload: Payload::from_args(vec![WireValue::from(42)]),
        }))
        .await;

    // ---
    // Assert
    // ---
    let args = timeout(WAIT, events.recv())
        .await
        .expect("handler not invoked")
        .expect("handler channel closed");
    assert_eq!(args, vec![WireValue::from(42)]);
}

#[tokio::test]
async fn unsubscribe_sends_only_for_last_local() {
    // ---
    let (session, mut router) = established().await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let subscribing = tokio::spawn({
            let session = session.clone();
            async move { session.subscribe("com.example.topic", |_ev: Event| async {}).await }
        });
        let Message::Subscribe(subscribe) = router.recv().await else {
            panic!("expected SUBSCRIBE");
        };
        router
            .send(Message::Subscribed(Subscribed {
                request: subscribe.request,
                subscription: SubscriptionId(555),
            }))
            .await;
        handles.push(subscribing.await.unwrap().expect("subscribe failed"));
    }

    // First local handle: removed locally, nothing on the wire.
    let first = handles.remove(0);
    first.unsubscribe().await.expect("local unsubscribe failed");
    router.assert_silent();

    // Last local handle: UNSUBSCRIBE goes out.
    let last = handles.remove(0);
    let unsubscribing = tokio::spawn(async move { last.unsubscribe().await });

    let Message::Unsubscribe(unsubscribe) = router.recv().await else {
        panic!("expected UNSUBSCRIBE");
    };
    assert_eq!(unsubscribe.subscription, SubscriptionId(555));
    router
        .send(Message::Unsubscribed(Unsubscribed {
            request: unsubscribe.request,
        }))
        .await;

    unsubscribing.await.unwrap().expect("unsubscribe failed");
    assert_eq!(session.pending_count(), 0);
}

/// Subscribe to `topic` and confirm it with broker id `subscription`.
async fn subscribe_as(
    session: &Session,
    router: &mut Router,
    topic: &'static str,
    subscription: u64,
) -> wamp_rpc::Subscription {
    // ---
    let subscribing = tokio::spawn({
        let session = session.clone();
        async move { session.subscribe(topic, |_ev: Event| async {}).await }
    });
    let Message::Subscribe(subscribe) = router.recv().await else {
        panic!("expected SUBSCRIBE");
    };
    router
        .send(Message::Subscribed(Subscribed {
            request: subscribe.request,
            subscription: SubscriptionId(subscription),
        }))
        .await;
    subscribing.await.unwrap().expect("subscribe failed")
}

#[tokio::test]
async fn concurrent_unsubscribe_of_one_handle_sends_once() {
    // ---
    // Arrange
    // ---
    let (session, mut router) = established().await;
    let subscription = subscribe_as(&session, &mut router, "com.example.topic", 555).await;
    let copy = subscription.clone();

    // ---
    // Act
    // ---
    let first = tokio::spawn(async move { subscription.unsubscribe().await });
    let Message::Unsubscribe(unsubscribe) = router.recv().await else {
        panic!("expected UNSUBSCRIBE");
    };
    let second = copy.unsubscribe().await;

    // ---
    // Assert
    // ---
    assert!(matches!(second, Err(WampError::InvalidConfiguration(_))));
    router.assert_silent();

    router
        .send(Message::Unsubscribed(Unsubscribed {
            request: unsubscribe.request,
        }))
        .await;
    first.await.unwrap().expect("unsubscribe failed");
    assert_eq!(session.subscription_count(), 0);
}

#[tokio::test]
async fn concurrent_unregister_of_one_handle_sends_once() {
    // ---
    let (session, mut router) = established().await;
    let registration = register_add(&session, &mut router).await;
    let copy = registration.clone();

    let first = tokio::spawn(async move { registration.unregister().await });
    let Message::Unregister(unregister) = router.recv().await else {
        panic!("expected UNREGISTER");
    };

    let second = copy.unregister().await;
    assert!(matches!(second, Err(WampError::InvalidConfiguration(_))));
    router.assert_silent();

    router
        .send(Message::Unregistered(Unregistered {
            request: unregister.request,
        }))
        .await;
    first.await.unwrap().expect("unregister failed");
    assert_eq!(session.registration_count(), 0);
}

#[tokio::test]
async fn subscribed_after_timeout_is_unsubscribed() {
    // ---
    let config = SessionConfig::new("myrealm").with_request_timeout(Duration::from_millis(50));
    let (session, mut router) = establish(attach_with(config).await).await;

    let outcome = session.subscribe("com.example.topic", |_ev: Event| async {}).await;
    assert!(matches!(outcome, Err(WampError::Timeout)));
    assert_eq!(session.pending_count(), 0);

    let Message::Subscribe(subscribe) = router.recv().await else {
        panic!("expected SUBSCRIBE");
    };
    router
        .send(Message::Subscribed(Subscribed {
            request: subscribe.request,
            subscription: SubscriptionId(555),
        }))
        .await;

    let Message::Unsubscribe(unsubscribe) = router.recv().await else {
        panic!("expected UNSUBSCRIBE");
    };
    assert_eq!(unsubscribe.subscription, SubscriptionId(555));
    assert_eq!(session.subscription_count(), 0);

    router
        .send(Message::Unsubscribed(Unsubscribed {
            request: unsubscribe.request,
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn subscribe_confirmed_while_unsubscribing_is_sent_again() {
    // ---
    // Arrange
    // ---
    let (session, mut router) = established().await;
    let old = subscribe_as(&session, &mut router, "com.example.topic", 555).await;
    let (tx, mut events) = mpsc::unbounded_channel();

    // ---
    // Act
    // ---
    // The router answers the new SUBSCRIBE with the id it then drops.
    let subscribing = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .subscribe("com.example.topic", move |event: Event| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(event.payload.args);
                    }
                })
                .await
        }
    });
    let Message::Subscribe(subscribe) = router.recv().await else {
        panic!("expected SUBSCRIBE");
    };

    let unsubscribing = tokio::spawn(async move { old.unsubscribe().await });
    let Message::Unsubscribe(unsubscribe) = router.recv().await else {
        panic!("expected UNSUBSCRIBE");
    };

    router
        .send(Message::Subscribed(Subscribed {
            request: subscribe.request,
            subscription: SubscriptionId(555),
        }))
        .await;
    router
        .send(Message::Unsubscribed(Unsubscribed {
            request: unsubscribe.request,
        }))
        .await;
    unsubscribing.await.unwrap().expect("unsubscribe failed");

    let Message::Subscribe(again) = router.recv().await else {
        panic!("expected a second SUBSCRIBE");
    };
    assert_eq!(again.topic, "com.example.topic");
    router
        .send(Message::Subscribed(Subscribed {
            request: again.request,
            subscription: SubscriptionId(556),
        }))
        .await;

    // ---
    // Assert
    // ---
    let subscription = subscribing.await.unwrap().expect("subscribe failed");
    assert_eq!(subscription.id(), SubscriptionId(556));

    router
        .send(Message::Event(Event {
            subscription: SubscriptionId(556),
            publication: PublicationId(1),
            details: WireMap::new(),
            payload: Payload::from_args(vec![WireValue::from(7)]),
        }))
        .await;
    let args = timeout(WAIT, events.recv())
        .await
        .expect("handler not invoked")
        .expect("handler channel closed");
    assert_eq!(args, vec![WireValue::from(7)]);
}

#[tokio::test]
async fn event_for_unknown_subscription_goes_to_orphans() {
    // ---
    let (session, router) = established().await;
    let mut orphans = session.take_orphans().expect("orphan sink already taken");
    assert!(session.take_orphans().is_none());

    router
        .send(Message::Event(Event {
            subscription: SubscriptionId(404),
            publication: PublicationId(9),
            details: WireMap::new(),
            payload: Payload::default(),
        }))
        .await;

    match timeout(WAIT, orphans.recv()).await.expect("no orphan") {
        Some(Orphan::Event(event)) => assert_eq!(event.subscription, SubscriptionId(404)),
        other => panic!("expected orphaned event, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn acknowledged_publish_resolves_with_publication() {
    // ---
    let (session, mut router) = established().await;

    let publishing = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .publish(
                    "com.example.topic",
                    vec![WireValue::from("hi")],
                    WireMap::new(),
                    PublishOptions::acknowledged().exclude_me(false),
                )
                .await
        }
    });

    let Message::Publish(publish) = router.recv().await else {
        panic!("expected PUBLISH");
    };
    assert_eq!(publish.options.get("acknowledge"), Some(&WireValue::Bool(true)));
    assert_eq!(publish.options.get("exclude_me"), Some(&WireValue::Bool(false)));
    assert_eq!(publish.payload.args, vec![WireValue::from("hi")]);

    router
        .send(Message::Published(Published {
            request: publish.request,
            publication: PublicationId(3001),
        }))
        .await;

    let publication = publishing.await.unwrap().expect("publish failed");
    assert_eq!(publication, Some(PublicationId(3001)));
}

#[tokio::test]
async fn unacknowledged_publish_resolves_once_sent() {
    // ---
    let (session, mut router) = established().await;

    let publication = session
        .publish("com.example.topic", Vec::new(), WireMap::new(), PublishOptions::new())
        .await
        .expect("publish failed");

    assert_eq!(publication, None);
    assert_eq!(session.pending_count(), 0);
    let Message::Publish(publish) = router.recv().await else {
        panic!("expected PUBLISH");
    };
    assert!(publish.payload.is_empty());
}

// -----------------------------------------------------------------------------
// Calls
// -----------------------------------------------------------------------------

#[tokio::test]
async fn call_resolves_with_result() {
    // ---
    let (session, mut router) = established().await;

    let calling = spawn_call(&session, "com.example.add", vec![2.into(), 3.into()]);

    let Message::Call(call) = router.recv().await else {
        panic!("expected CALL");
    };
    assert_eq!(call.procedure, "com.example.add");
    assert_eq!(call.payload.args, vec![WireValue::from(2), WireValue::from(3)]);

    router
        .send(Message::Result(ResultMessage {
            request: call.request,
            details: WireMap::new(),
            payload: Payload::from_args(vec![WireValue::from(5)]),
        }))
        .await;

    let result = calling.await.unwrap().expect("call failed");
    assert_eq!(result.deserialize_arg::<i64>(0).unwrap(), 5);
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn call_error_reply_surfaces_remote_error() {
    // ---
    let (session, mut router) = established().await;

    let calling = spawn_call(&session, "com.example.add", vec![2.into(), 3.into()]);

    let Message::Call(call) = router.recv().await else {
        panic!("expected CALL");
    };
    router
        .send(Message::Error(
            ErrorMessage::new(
                MessageKind::Call,
                call.request,
                "wamp.error.no_such_procedure",
                Payload::default(),
            )
            .unwrap(),
        ))
        .await;

    match calling.await.unwrap() {
        Err(WampError::Remote(err)) => assert_eq!(err.error, "wamp.error.no_such_procedure"),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn error_for_wrong_request_type_is_not_matched() {
    // ---
    let (session, mut router) = established().await;

    let calling = spawn_call(&session, "com.example.slow", Vec::new());
    let Message::Call(call) = router.recv().await else {
        panic!("expected CALL");
    };

    // Same id, but claims to answer a SUBSCRIBE.
    router
        .send(Message::Error(
            ErrorMessage::new(
                MessageKind::Subscribe,
                call.request,
                "wamp.error.not_authorized",
                Payload::default(),
            )
            .unwrap(),
        ))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.pending_count(), 1);

    router
        .send(Message::Result(ResultMessage {
            request: call.request,
            details: WireMap::new(),
            payload: Payload::default(),
        }))
        .await;
    assert!(calling.await.unwrap().is_ok());
}

#[tokio::test]
async fn call_timeout_abandons_and_late_reply_is_discarded() {
    // ---
    let (session, mut router) = established().await;

    let outcome = session
        .call_with_options(
            "com.example.slow",
            Vec::new(),
            WireMap::new(),
            CallOptions::new().with_timeout(Duration::from_millis(50)),
        )
        .await;
    assert!(matches!(outcome, Err(WampError::Timeout)));

    let Message::Call(call) = router.recv().await else {
        panic!("expected CALL");
    };
    assert_eq!(call.options.get("timeout"), Some(&WireValue::from(50)));
    assert_eq!(session.pending_count(), 0);

    router
        .send(Message::Result(ResultMessage {
            request: call.request,
            details: WireMap::new(),
            payload: Payload::default(),
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn caller_only_session_refuses_subscribe() {
    // ---
    let (session, mut router) = attach(Roles::new([Role::Caller]).unwrap()).await;

    let outcome = session.subscribe("com.example.topic", |_ev: Event| async {}).await;

    assert!(matches!(outcome, Err(WampError::InvalidConfiguration(_))));
    router.assert_silent();
}

#[tokio::test]
async fn invalid_uri_is_rejected_without_sending() {
    // ---
    let (session, mut router) = established().await;

    let outcome = session.call("com..example", Vec::new(), WireMap::new()).await;

    assert!(matches!(outcome, Err(WampError::InvalidUri(_))));
    router.assert_silent();
}

// -----------------------------------------------------------------------------
// Registrations
// -----------------------------------------------------------------------------

async fn register_add(session: &Session, router: &mut Router) -> wamp_rpc::Registration {
    // ---
    let registering = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .register("com.example.add", |inv: Invocation| async move {
                    let a = inv.payload.arg(0).and_then(WireValue::as_i64);
                    let b = inv.payload.arg(1).and_then(WireValue::as_i64);
                    match (a, b) {
                        (Some(a), Some(b)) => Ok(CallResult::new(vec![WireValue::from(a + b)])),
                        _ => Err(RemoteError::new("wamp.error.invalid_argument")),
                    }
                })
                .await
        }
    });

    let Message::Register(register) = router.recv().await else {
        panic!("expected REGISTER");
    };
    assert_eq!(register.procedure, "com.example.add");
    router
        .send(Message::Registered(Registered {
            request: register.request,
            registration: RegistrationId(77),
        }))
        .await;

    registering.await.unwrap().expect("register failed")
}

fn invocation(request: u64, args: Vec<WireValue>) -> Message {
    Message::Invocation(Invocation {
        request: wamp_rpc::RequestId(request),
        registration: RegistrationId(77),
        details: WireMap::new(),
        payload: Payload::from_args(args),
    })
}

#[tokio::test]
async fn invocation_is_answered_with_yield() {
    // ---
    let (session, mut router) = established().await;
    let registration = register_add(&session, &mut router).await;
    assert_eq!(registration.id(), RegistrationId(77));

    router.send(invocation(900, vec![2.into(), 3.into()])).await;

    let Message::Yield(reply) = router.recv().await else {
        panic!("expected YIELD");
    };
    assert_eq!(reply.request.value(), 900);
    assert_eq!(reply.payload.args, vec![WireValue::from(5)]);
}

#[tokio::test]
async fn handler_error_is_sent_as_invocation_error() {
    // ---
    let (session, mut router) = established().await;
    let _registration = register_add(&session, &mut router).await;

    router.send(invocation(901, vec!["x".into()])).await;

    let Message::Error(reply) = router.recv().await else {
        panic!("expected ERROR");
    };
    assert_eq!(reply.request_type, MessageKind::Invocation);
    assert_eq!(reply.request.value(), 901);
    assert_eq!(reply.error, "wamp.error.invalid_argument");
}

#[tokio::test]
async fn dropped_responder_sends_runtime_error() {
    // ---
    let (session, mut router) = established().await;

    let registering = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .register_with_responder("com.example.silent", |_inv, _responder| async {})
                .await
        }
    });
    let Message::Register(register) = router.recv().await else {
        panic!("expected REGISTER");
    };
    router
        .send(Message::Registered(Registered {
            request: register.request,
            registration: RegistrationId(77),
        }))
        .await;
    registering.await.unwrap().expect("register failed");

    router.send(invocation(902, Vec::new())).await;

    let Message::Error(reply) = router.recv().await else {
        panic!("expected ERROR");
    };
    assert_eq!(reply.request.value(), 902);
    assert_eq!(reply.error, RUNTIME_ERROR);
}

#[tokio::test]
async fn responder_can_answer_later() {
    // ---
    let (session, mut router) = established().await;
    let (park, mut parked) = mpsc::unbounded_channel();

    let registering = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .register_with_responder("com.example.deferred", move |_inv, responder| {
                    let park = park.clone();
                    async move {
                        let _ = park.send(responder);
                    }
                })
                .await
        }
    });
    let Message::Register(register) = router.recv().await else {
        panic!("expected REGISTER");
    };
    router
        .send(Message::Registered(Registered {
            request: register.request,
            registration: RegistrationId(77),
        }))
        .await;
    registering.await.unwrap().expect("register failed");

    router.send(invocation(903, Vec::new())).await;
    let responder = timeout(WAIT, parked.recv())
        .await
        .expect("handler not invoked")
        .expect("handler channel closed");
    router.assert_silent();

    responder
        .send_result(CallResult::new(vec!["done".into()]))
        .expect("reply failed");
    assert!(matches!(
        responder.send_result(CallResult::default()),
        Err(WampError::InvalidConfiguration(_))
    ));

    let Message::Yield(reply) = router.recv().await else {
        panic!("expected YIELD");
    };
    assert_eq!(reply.request.value(), 903);
    drop(responder);
    router.assert_silent();
}

#[tokio::test]
async fn invocation_for_unknown_registration_is_refused() {
    // ---
    let (session, mut router) = established().await;
    let mut orphans = session.take_orphans().expect("orphan sink already taken");

    router.send(invocation(904, Vec::new())).await;

    let Message::Error(reply) = router.recv().await else {
        panic!("expected ERROR");
    };
    assert_eq!(reply.request_type, MessageKind::Invocation);
    assert_eq!(reply.error, NO_SUCH_REGISTRATION);

    match timeout(WAIT, orphans.recv()).await.expect("no orphan") {
        Some(Orphan::Invocation(inv)) => assert_eq!(inv.request.value(), 904),
        other => panic!("expected orphaned invocation, got {other:?}"),
    }
}

#[tokio::test]
async fn unregister_removes_handler() {
    // ---
    let (session, mut router) = established().await;
    let registration = register_add(&session, &mut router).await;

    let unregistering = tokio::spawn(async move { registration.unregister().await });
    let Message::Unregister(unregister) = router.recv().await else {
        panic!("expected UNREGISTER");
    };
    assert_eq!(unregister.registration, RegistrationId(77));
    router
        .send(Message::Unregistered(Unregistered {
            request: unregister.request,
        }))
        .await;
    unregistering.await.unwrap().expect("unregister failed");

    router.send(invocation(905, vec![1.into(), 1.into()])).await;
    let Message::Error(reply) = router.recv().await else {
        panic!("expected ERROR");
    };
    assert_eq!(reply.error, NO_SUCH_REGISTRATION);
}

// -----------------------------------------------------------------------------
// Closing
// -----------------------------------------------------------------------------

#[tokio::test]
async fn connection_loss_fails_pending_requests() {
    // ---
    // Arrange
    // ---
    let (session, mut router) = established().await;

    // Two acknowledged publishes take ids 1 and 2.
    for expected in 1..=2u64 {
        let publishing = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .publish("com.example.topic", Vec::new(), WireMap::new(), PublishOptions::acknowledged())
                    .await
            }
        });
        let Message::Publish(publish) = router.recv().await else {
            panic!("expected PUBLISH");
        };
        assert_eq!(publish.request.value(), expected);
        router
            .send(Message::Published(Published {
                request: publish.request,
                publication: PublicationId(expected),
            }))
            .await;
        publishing.await.unwrap().expect("publish failed");
    }

    let first = spawn_call(&session, "com.example.one", Vec::new());
    let second = spawn_call(&session, "com.example.two", Vec::new());

    let mut ids = Vec::new();
    for _ in 0..2 {
        let Message::Call(call) = router.recv().await else {
            panic!("expected CALL");
        };
        ids.push(call.request.value());
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(session.pending_count(), 2);

    // ---
    // Act
    // ---
    router
        .peer
        .lose_connection("socket reset")
        .await
        .expect("lose_connection failed");

    // ---
    // Assert
    // ---
    assert!(matches!(first.await.unwrap(), Err(WampError::SessionClosed)));
    assert!(matches!(second.await.unwrap(), Err(WampError::SessionClosed)));
    assert_eq!(session.state(), SessionState::Closed);

    let late = session.call("com.example.add", Vec::new(), WireMap::new()).await;
    assert!(matches!(late, Err(WampError::SessionClosed)));
    router.assert_silent();
}

#[tokio::test]
async fn close_sends_goodbye_and_closes_transport() {
    // ---
    let (session, mut router) = established().await;
    let pending = spawn_call(&session, "com.example.slow", Vec::new());
    let Message::Call(_) = router.recv().await else {
        panic!("expected CALL");
    };

    session.close(None).await.expect("close failed");

    let Message::Goodbye(goodbye) = router.recv().await else {
        panic!("expected GOODBYE");
    };
    assert_eq!(goodbye.reason, "wamp.close.normal");
    assert_eq!(session.state(), SessionState::Closed);
    assert!(router.peer.is_closed());
    assert!(matches!(pending.await.unwrap(), Err(WampError::SessionClosed)));

    // Idempotent once closed.
    assert!(session.close(None).await.is_ok());
}

#[tokio::test]
async fn close_before_join_sends_nothing() {
    // ---
    let (session, mut router) = attach(Roles::all()).await;

    session.close(Some("wamp.close.system_shutdown")).await.expect("close failed");

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(router.peer.recv_frame().await, None);
    assert!(matches!(session.join().await, Err(WampError::ProtocolViolation(_))));
}

#[tokio::test]
async fn router_goodbye_is_echoed() {
    // ---
    let (session, mut router) = established().await;
    let pending = spawn_call(&session, "com.example.slow", Vec::new());
    let Message::Call(_) = router.recv().await else {
        panic!("expected CALL");
    };

    router
        .send(Message::Goodbye(
            Goodbye::new("wamp.close.system_shutdown", None).unwrap(),
        ))
        .await;

    let Message::Goodbye(echo) = router.recv().await else {
        panic!("expected GOODBYE echo");
    };
    assert_eq!(echo.reason, GOODBYE_AND_OUT);
    assert!(matches!(pending.await.unwrap(), Err(WampError::SessionClosed)));

    timeout(WAIT, async {
        while session.state() != SessionState::Closed {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session did not close");
}

#[tokio::test]
async fn router_abort_closes_session_and_fails_pending() {
    // ---
    let (session, mut router) = established().await;
    let pending = spawn_call(&session, "com.example.slow", Vec::new());
    let Message::Call(_) = router.recv().await else {
        panic!("expected CALL");
    };

    router
        .send(Message::Abort(Abort::new("wamp.error.system_shutdown", None).unwrap()))
        .await;

    assert!(matches!(pending.await.unwrap(), Err(WampError::SessionClosed)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn welcome_while_established_is_a_violation() {
    // ---
    let (session, mut router) = established().await;
    let pending = spawn_call(&session, "com.example.slow", Vec::new());
    let Message::Call(_) = router.recv().await else {
        panic!("expected CALL");
    };

    router
        .send(Message::Welcome(Welcome {
            session: SessionId(1),
            details: router_details(),
        }))
        .await;

    assert!(matches!(pending.await.unwrap(), Err(WampError::SessionClosed)));
    let Message::Abort(abort) = router.recv().await else {
        panic!("expected ABORT");
    };
    assert_eq!(abort.reason, PROTOCOL_VIOLATION);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn undecodable_frame_is_dropped_while_established() {
    // ---
    let (session, mut router) = established().await;

    router.send_raw(r#"[999, "nonsense"]"#).await;
    router.send_raw("not json at all").await;

    let calling = spawn_call(&session, "com.example.add", Vec::new());
    let Message::Call(call) = router.recv().await else {
        panic!("expected CALL");
    };
    router
        .send(Message::Result(ResultMessage {
            request: call.request,
            details: WireMap::new(),
            payload: Payload::default(),
        }))
        .await;

    assert!(calling.await.unwrap().is_ok());
    assert_eq!(session.state(), SessionState::Established);
}
