//! Session builder.
//!
//! Provides a fluent API for configuring a session over an existing
//! transport: realm, announced roles, HELLO details, timeouts and the frame
//! serializer.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    // ---
    JsonSerializer,
    Result,
    Role,
    Roles,
    SerializerPtr,
    Session,
    SessionConfig,
    TransportPtr,
    WampError,
    WireMap,
    WireValue,
};

/// Builder for [`Session`] instances.
///
/// # Examples
///
/// ## Caller-only session
/// ```no_run
/// use wamp_rpc::{create_memory_transport, Role, SessionBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> wamp_rpc::Result<()> {
/// let (transport, _router) = create_memory_transport("client");
///
/// let session = SessionBuilder::new(transport)
///     .realm("com.example.realm")
///     .role(Role::Caller)
///     .agent("example/1.0")
///     .request_timeout(Duration::from_secs(5))
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Attach now, join later
/// ```no_run
/// use wamp_rpc::{create_memory_transport, SessionBuilder};
///
/// # async fn example() -> wamp_rpc::Result<()> {
/// let (transport, _router) = create_memory_transport("client");
///
/// let session = SessionBuilder::new(transport)
///     .realm("com.example.realm")
///     .build()
///     .await?;
/// let details = session.join().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    // ---
    transport: TransportPtr,
    realm: Option<String>,

    // All four roles when none is given
    roles: Vec<Role>,

    details: WireMap,
    request_timeout: Option<Duration>,
    close_reason: Option<String>,
    serializer: Option<SerializerPtr>,
}

impl SessionBuilder {
    /// Create a builder over `transport`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            realm: None,
            roles: Vec::new(),
            details: WireMap::new(),
            request_timeout: None,
            close_reason: None,
            serializer: None,
        }
    }

    /// Realm to join. Required.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Announce `role`. May be called repeatedly.
    ///
    /// Default: all four client roles.
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Announce every role in `roles`.
    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Add a HELLO detail.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Set the HELLO `agent` detail.
    pub fn agent(self, agent: impl Into<String>) -> Self {
        self.detail("agent", agent.into())
    }

    /// Set the reply timeout for the handshake and every request.
    ///
    /// Default: none (wait for the router or the session close).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the default GOODBYE reason.
    ///
    /// Default: `wamp.close.normal`.
    pub fn close_reason(mut self, reason: impl Into<String>) -> Self {
        self.close_reason = Some(reason.into());
        self
    }

    /// Use another frame serializer.
    ///
    /// Default: [`JsonSerializer`].
    pub fn serializer(mut self, serializer: SerializerPtr) -> Self {
        self.serializer = Some(serializer);
        self
    }

    fn into_config(
        realm: Option<String>,
        roles: Vec<Role>,
        details: WireMap,
        request_timeout: Option<Duration>,
        close_reason: Option<String>,
    ) -> Result<SessionConfig> {
        // ---
        let realm = realm.ok_or_else(|| {
            WampError::InvalidConfiguration("a realm is required to build a session".into())
        })?;

        let roles = if roles.is_empty() {
            Roles::all()
        } else {
            Roles::new(roles)?
        };

        let mut config = SessionConfig::new(realm).with_roles(roles);
        config.hello_details = details;
        config.request_timeout = request_timeout;
        if let Some(reason) = close_reason {
            config.close_reason = reason;
        }
        Ok(config)
    }

    /// Attach the session (consumes self). Nothing is sent yet.
    pub async fn build(self) -> Result<Session> {
        // ---
        let config = Self::into_config(
            self.realm,
            self.roles,
            self.details,
            self.request_timeout,
            self.close_reason,
        )?;
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonSerializer));

        Session::with_serializer(self.transport, serializer, config).await
    }

    /// Attach and join (consumes self).
    pub async fn connect(self) -> Result<Session> {
        // ---
        let session = self.build().await?;
        session.join().await?;
        Ok(session)
    }
}
