//! Public, transport-agnostic session configuration.
//!
//! Nothing here knows about sockets or frame formats. The transport and
//! serializer are handed to the session separately.

use std::time::Duration;

use crate::protocol::validate_uri;
use crate::{Result, Roles, WampError, WireMap, WireValue};

/// GOODBYE reason used by `close()` when none is given.
pub const CLOSE_NORMAL: &str = "wamp.close.normal";

/// Session parameters sent in HELLO and applied to every request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    // ---
    /// Realm to join.
    pub realm: String,

    /// Roles announced in HELLO. Operations of other roles are refused locally.
    pub roles: Roles,

    /// Extra HELLO details (e.g. `agent`). The `roles` key is always
    /// generated from [`roles`](Self::roles).
    pub hello_details: WireMap,

    /// Client-side limit for the handshake and for every request reply.
    ///
    /// `None` waits until the router answers or the session closes.
    /// [`CallOptions`](crate::CallOptions) can override it per call.
    pub request_timeout: Option<Duration>,

    /// Default GOODBYE reason for `close()`.
    pub close_reason: String,
}

impl SessionConfig {
    /// Configuration for `realm` with all four client roles.
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            roles: Roles::all(),
            hello_details: WireMap::new(),
            request_timeout: None,
            close_reason: CLOSE_NORMAL.to_owned(),
        }
    }

    /// Announce only the given roles.
    pub fn with_roles(mut self, roles: Roles) -> Self {
        self.roles = roles;
        self
    }

    /// Add one HELLO detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.hello_details.insert(key.into(), value.into());
        self
    }

    /// Set the reply timeout applied to every request.
    ///
    /// # Example
    ///
    /// ```
    /// use wamp_rpc::SessionConfig;
    /// use std::time::Duration;
    ///
    /// let config = SessionConfig::new("com.example.realm")
    ///     .with_request_timeout(Duration::from_secs(10));
    /// ```
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_close_reason(mut self, reason: impl Into<String>) -> Self {
        self.close_reason = reason.into();
        self
    }

    /// Check the realm and close reason before anything is sent.
    pub fn validate(&self) -> Result<()> {
        // ---
        validate_uri(&self.realm)?;
        validate_uri(&self.close_reason)?;

        if self.hello_details.contains_key("roles") {
            return Err(WampError::InvalidConfiguration(
                "`roles` is derived from the configured roles and cannot be set as a detail".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Role;

    #[test]
    fn test_defaults() {
        // ---
        let config = SessionConfig::new("com.example.realm");
        assert_eq!(config.close_reason, CLOSE_NORMAL);
        assert!(config.request_timeout.is_none());
        assert!(Role::ALL.iter().all(|r| config.roles.contains(*r)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_realm() {
        // ---
        let config = SessionConfig::new("bad realm");
        assert!(matches!(config.validate(), Err(WampError::InvalidUri(_))));
    }

    #[test]
    fn test_roles_detail_rejected() {
        // ---
        let config = SessionConfig::new("com.example.realm").with_detail("roles", "x");
        assert!(matches!(
            config.validate(),
            Err(WampError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_builder_style_setters() {
        // ---
        let config = SessionConfig::new("com.example.realm")
            .with_roles(Roles::new([Role::Caller]).unwrap())
            .with_detail("agent", "tests/1.0")
            .with_request_timeout(Duration::from_millis(250))
            .with_close_reason("wamp.close.system_shutdown");

        assert!(config.roles.contains(Role::Caller));
        assert!(!config.roles.contains(Role::Callee));
        assert_eq!(
            config.hello_details.get("agent"),
            Some(&WireValue::from("tests/1.0"))
        );
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.close_reason, "wamp.close.system_shutdown");
    }
}
