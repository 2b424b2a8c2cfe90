//! Per-request options.
//!
//! Each type knows how to render itself as the `Options|dict` of the
//! message it configures. Only options the client actually acts on are
//! modelled; everything else is left to the router defaults.

use std::time::Duration;

use crate::protocol::{SessionId, WireMap, WireValue};

/// Options for [`Session::call_with_options`](crate::Session::call_with_options).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    // ---
    /// Client side deadline for the reply. Also forwarded to the dealer as
    /// the `timeout` option (milliseconds) so it can cancel the invocation.
    ///
    /// `None` falls back to the session's configured request timeout.
    pub timeout: Option<Duration>,

    /// Ask the dealer to disclose this session's id to the callee.
    pub disclose_me: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disclose_me(mut self) -> Self {
        self.disclose_me = true;
        self
    }

    pub(crate) fn to_wire(&self) -> WireMap {
        // ---
        let mut options = WireMap::new();
        if let Some(timeout) = self.timeout {
            let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            options.insert("timeout".into(), WireValue::Integer(millis));
        }
        if self.disclose_me {
            options.insert("disclose_me".into(), WireValue::Bool(true));
        }
        options
    }
}

/// Options for [`Session::publish`](crate::Session::publish).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    // ---
    /// Request a PUBLISHED acknowledgement. Only acknowledged publishes wait
    /// for the broker and resolve with a publication id.
    pub acknowledge: bool,

    /// Whether the publisher itself receives the event, if subscribed.
    /// `None` keeps the broker default (excluded).
    pub exclude_me: Option<bool>,

    /// Deliver only to these sessions.
    pub eligible: Vec<SessionId>,

    /// Never deliver to these sessions.
    pub exclude: Vec<SessionId>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledged() -> Self {
        Self {
            acknowledge: true,
            ..Self::default()
        }
    }

    pub fn exclude_me(mut self, exclude_me: bool) -> Self {
        self.exclude_me = Some(exclude_me);
        self
    }

    pub fn eligible(mut self, sessions: impl IntoIterator<Item = SessionId>) -> Self {
        self.eligible = sessions.into_iter().collect();
        self
    }

    pub fn exclude(mut self, sessions: impl IntoIterator<Item = SessionId>) -> Self {
        self.exclude = sessions.into_iter().collect();
        self
    }

    pub(crate) fn to_wire(&self) -> WireMap {
        // ---
        let mut options = WireMap::new();
        if self.acknowledge {
            options.insert("acknowledge".into(), WireValue::Bool(true));
        }
        if let Some(exclude_me) = self.exclude_me {
            options.insert("exclude_me".into(), WireValue::Bool(exclude_me));
        }
        if !self.eligible.is_empty() {
            options.insert("eligible".into(), id_list(&self.eligible));
        }
        if !self.exclude.is_empty() {
            options.insert("exclude".into(), id_list(&self.exclude));
        }
        options
    }
}

fn id_list(ids: &[SessionId]) -> WireValue {
    WireValue::List(ids.iter().map(|id| WireValue::from(id.value())).collect())
}

/// How a subscription topic is matched against published topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    #[default]
    Exact,
    /// Topic is a prefix of the published topic.
    Prefix,
    /// Empty topic components match any single component.
    Wildcard,
}

/// Options for [`Session::subscribe_with_options`](crate::Session::subscribe_with_options).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeOptions {
    pub match_policy: MatchPolicy,
}

impl SubscribeOptions {
    pub fn prefix() -> Self {
        Self {
            match_policy: MatchPolicy::Prefix,
        }
    }

    pub fn wildcard() -> Self {
        Self {
            match_policy: MatchPolicy::Wildcard,
        }
    }

    pub(crate) fn to_wire(&self) -> WireMap {
        // ---
        let mut options = WireMap::new();
        match self.match_policy {
            MatchPolicy::Exact => {}
            MatchPolicy::Prefix => {
                options.insert("match".into(), WireValue::from("prefix"));
            }
            MatchPolicy::Wildcard => {
                options.insert("match".into(), WireValue::from("wildcard"));
            }
        }
        options
    }
}
