//! Application handlers for events and invocations.
//!
//! Handlers of different closure types are stored type-erased so the
//! subscription and registration tables can hold them side by side.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dispatcher::WeakDispatcher;
use crate::protocol::{
    ErrorMessage, Event, Invocation, Message, MessageKind, Payload, RequestId, Yield,
};
use crate::{log_debug, RemoteError, Result, WampError, WireMap, WireValue};

/// Error URI sent when an invocation handler finishes without replying.
pub const RUNTIME_ERROR: &str = "wamp.error.runtime_error";

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased event handler.
///
/// Wrapped in Arc so one handler can back its subscription task while the
/// table keeps its own reference.
pub(crate) type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<()> + Send + Sync>;

/// Type-erased invocation handler; replies through the [`Responder`].
pub(crate) type InvocationHandler =
    Arc<dyn Fn(Invocation, Responder) -> BoxFuture<()> + Send + Sync>;

pub(crate) fn wrap_event_handler<F, Fut>(handler: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // ---
    Arc::new(move |event: Event| Box::pin(handler(event)) as BoxFuture<()>)
}

/// Wrap a handler that answers with its return value.
pub(crate) fn wrap_call_handler<F, Fut>(handler: F) -> InvocationHandler
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<CallResult, RemoteError>> + Send + 'static,
{
    // ---
    Arc::new(move |invocation: Invocation, responder: Responder| {
        let fut = handler(invocation);
        Box::pin(async move {
            let sent = match fut.await {
                Ok(result) => responder.send_result(result),
                Err(error) => responder.send_error(error),
            };
            if let Err(_err) = sent {
                log_debug!("reply for invocation {} not sent: {_err}", responder.request());
            }
        }) as BoxFuture<()>
    })
}

/// Wrap a handler that replies through the responder itself.
pub(crate) fn wrap_responder_handler<F, Fut>(handler: F) -> InvocationHandler
where
    F: Fn(Invocation, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // ---
    Arc::new(move |invocation: Invocation, responder: Responder| {
        Box::pin(handler(invocation, responder)) as BoxFuture<()>
    })
}

/// Positional/keyword result of a call, or the reply of a callee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResult {
    pub args: Vec<WireValue>,
    pub kwargs: WireMap,
    /// RESULT details (empty for a callee's own reply).
    pub details: WireMap,
}

impl CallResult {
    // ---

    pub fn new(args: Vec<WireValue>) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    pub fn with_kwargs(mut self, kwargs: WireMap) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// A single positional argument converted from any serializable value.
    pub fn from_value<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::new(vec![WireValue::from_serialize(value)?]))
    }

    pub fn arg(&self, index: usize) -> Option<&WireValue> {
        self.args.get(index)
    }

    pub fn kwarg(&self, key: &str) -> Option<&WireValue> {
        self.kwargs.get(key)
    }

    /// Convert positional argument `index` into `T`.
    pub fn deserialize_arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        // ---
        let value = self.args.get(index).ok_or_else(|| {
            <serde_json::Error as serde::de::Error>::custom(format!("missing argument {index}"))
        })?;
        Ok(value.deserialize_into()?)
    }

    pub(crate) fn from_payload(payload: Payload, details: WireMap) -> Self {
        Self {
            args: payload.args,
            kwargs: payload.kwargs,
            details,
        }
    }

    pub(crate) fn into_payload(self) -> Payload {
        Payload::new(self.args, self.kwargs)
    }
}

/// One-shot reply capability for a single invocation.
///
/// Carries the dealer-assigned request id of the INVOCATION. Exactly one of
/// [`send_result`](Self::send_result) or [`send_error`](Self::send_error)
/// may succeed; any further use fails with
/// [`WampError::InvalidConfiguration`]. Dropping an unused responder answers
/// the dealer with `wamp.error.runtime_error` so the caller is not left
/// waiting.
pub struct Responder {
    // ---
    request: RequestId,
    dispatcher: WeakDispatcher,
    used: AtomicBool,
}

impl Responder {
    // ---

    pub(crate) fn new(request: RequestId, dispatcher: WeakDispatcher) -> Self {
        Self {
            request,
            dispatcher,
            used: AtomicBool::new(false),
        }
    }

    /// Request id of the invocation being answered.
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Whether a reply was already attempted.
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::SeqCst)
    }

    /// Answer with YIELD.
    ///
    /// # Errors
    ///
    /// - [`WampError::InvalidConfiguration`] if the responder was already used
    /// - [`WampError::SessionClosed`] if the session is gone
    pub fn send_result(&self, result: CallResult) -> Result<()> {
        // ---
        self.claim()?;
        self.deliver(Message::Yield(Yield {
            request: self.request,
            options: WireMap::new(),
            payload: result.into_payload(),
        }))
    }

    /// Answer with ERROR.
    ///
    /// # Errors
    ///
    /// As [`send_result`](Self::send_result), plus [`WampError::InvalidUri`]
    /// for a malformed error URI (the responder stays unused in that case).
    pub fn send_error(&self, error: RemoteError) -> Result<()> {
        // ---
        let mut message = ErrorMessage::new(
            MessageKind::Invocation,
            self.request,
            &error.error,
            error.payload,
        )?;
        message.details = error.details;

        self.claim()?;
        self.deliver(Message::Error(message))
    }

    fn claim(&self) -> Result<()> {
        // ---
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(WampError::InvalidConfiguration(format!(
                "invocation {} was already answered",
                self.request
            )));
        }
        Ok(())
    }

    fn deliver(&self, message: Message) -> Result<()> {
        // ---
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.send_reply(message),
            None => Err(WampError::SessionClosed),
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        // ---
        if self.is_used() {
            return;
        }

        log_debug!("invocation {} dropped without reply", self.request);

        let error = RemoteError::new(RUNTIME_ERROR).with_payload(Payload::from_args(vec![
            WireValue::from("invocation handler finished without replying"),
        ]));
        let _ = self.send_error(error);
    }
}
