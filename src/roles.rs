//! Client role announcement.
//!
//! Defines which of the four client roles a session implements. The roles
//! are announced in HELLO and decide which operations the
//! [`Session`](crate::Session) accepts.

use std::collections::BTreeSet;
use std::fmt;

use crate::{Result, WampError, WireMap, WireValue};

/// A WAMP client role.
///
/// - [`Publisher`](Role::Publisher): may `publish()`
/// - [`Subscriber`](Role::Subscriber): may `subscribe()` / `unsubscribe()`
/// - [`Caller`](Role::Caller): may `call()`
/// - [`Callee`](Role::Callee): may `register()` / `unregister()` and answer invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
    Caller,
    Callee,
}

impl Role {
    /// All client roles.
    pub const ALL: [Role; 4] = [Role::Publisher, Role::Subscriber, Role::Caller, Role::Callee];

    /// Key used in the HELLO `roles` dictionary.
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
            Role::Caller => "caller",
            Role::Callee => "callee",
        }
    }

    /// Parse a HELLO roles key.
    pub fn parse(name: &str) -> Option<Role> {
        // ---
        Role::ALL.into_iter().find(|r| r.as_str() == name)
    }

    // Feature flags announced for the options this crate knows how to encode.
    fn features(self) -> WireMap {
        // ---
        let flags: &[&str] = match self {
            Role::Publisher => &["publisher_exclusion", "subscriber_blackwhite_listing"],
            Role::Subscriber => &[],
            Role::Caller => &["caller_identification", "call_timeout"],
            Role::Callee => &["caller_identification"],
        };

        flags
            .iter()
            .map(|f| ((*f).to_owned(), WireValue::Bool(true)))
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty set of client roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roles(BTreeSet<Role>);

impl Roles {
    // ---

    /// Build a role set.
    ///
    /// # Errors
    ///
    /// Returns [`WampError::InvalidConfiguration`] when no role is given.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Result<Self> {
        // ---
        let set: BTreeSet<Role> = roles.into_iter().collect();
        if set.is_empty() {
            return Err(WampError::InvalidConfiguration(
                "at least one client role is required".into(),
            ));
        }
        Ok(Self(set))
    }

    /// Every client role.
    pub fn all() -> Self {
        Self(Role::ALL.into_iter().collect())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Fail with `InvalidConfiguration` unless `role` was announced.
    pub(crate) fn require(&self, role: Role, operation: &str) -> Result<()> {
        // ---
        if self.contains(role) {
            Ok(())
        } else {
            Err(WampError::InvalidConfiguration(format!(
                "{operation}() requires the {role} role"
            )))
        }
    }

    /// The HELLO `details.roles` dictionary.
    pub fn to_wire(&self) -> WireMap {
        // ---
        self.0
            .iter()
            .map(|role| {
                let mut entry = WireMap::new();
                let features = role.features();
                if !features.is_empty() {
                    entry.insert("features".into(), WireValue::Map(features));
                }
                (role.as_str().to_owned(), WireValue::Map(entry))
            })
            .collect()
    }

    /// Parse a HELLO `details.roles` dictionary; unknown role names are skipped.
    pub fn from_wire(roles: &WireMap) -> Result<Self> {
        Self::new(roles.keys().filter_map(|k| Role::parse(k)))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_empty_roles_rejected() {
        // ---
        let err = Roles::new([]).unwrap_err();
        assert!(matches!(err, WampError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_to_wire_contains_each_role() {
        // ---
        let roles = Roles::new([Role::Subscriber, Role::Caller]).unwrap();
        let wire = roles.to_wire();

        assert_eq!(wire.len(), 2);
        assert_eq!(wire.get("subscriber"), Some(&WireValue::Map(WireMap::new())));
        assert!(wire
            .get("caller")
            .and_then(|c| c.get("features"))
            .and_then(|f| f.get("call_timeout"))
            .is_some());
    }

    #[test]
    fn test_from_wire_round_trips() {
        // ---
        let roles = Roles::all();
        assert_eq!(Roles::from_wire(&roles.to_wire()).unwrap(), roles);
    }

    #[test]
    fn test_require() {
        // ---
        let roles = Roles::new([Role::Publisher]).unwrap();
        assert!(roles.require(Role::Publisher, "publish").is_ok());
        assert!(matches!(
            roles.require(Role::Callee, "register"),
            Err(WampError::InvalidConfiguration(_))
        ));
    }
}
