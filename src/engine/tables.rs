use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::handler::{EventHandler, InvocationHandler};
use crate::protocol::{Event, RegistrationId, SubscriptionId};
use crate::{log_trace, log_warn};

/// Client-side id of one local subscription. Several local subscriptions
/// may share a single broker subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LocalId(pub u64);

struct LocalSubscription {
    // ---
    local: LocalId,
    topic: String,
    events: mpsc::UnboundedSender<Event>,
}

/// Broker subscription id -> local subscriptions.
pub(crate) struct SubscriptionTable {
    // ---
    entries: HashMap<SubscriptionId, Vec<LocalSubscription>>,
    next_local: u64,
}

impl SubscriptionTable {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            entries: HashMap::new(),
            next_local: 0,
        }
    }

    /// Add a local subscription and start its event task.
    ///
    /// Events for one local subscription are handled one at a time, in
    /// arrival order, on a task of their own.
    pub fn add(
        &mut self,
        subscription: SubscriptionId,
        topic: String,
        handler: EventHandler,
    ) -> LocalId {
        // ---
        self.next_local += 1;
        let local = LocalId(self.next_local);

        let (events, mut rx) = mpsc::unbounded_channel::<Event>();
        let _task_topic = topic.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event).await;
            }
            log_trace!("event task for {_task_topic} stopped");
        });

        self.entries
            .entry(subscription)
            .or_default()
            .push(LocalSubscription {
                local,
                topic,
                events,
            });

        local
    }

    /// Queue `event` for every local subscription of its broker id.
    ///
    /// Hands the event back when no local subscription exists.
    pub fn deliver(&self, event: Event) -> std::result::Result<(), Event> {
        // ---
        let locals = match self.entries.get(&event.subscription) {
            Some(locals) if !locals.is_empty() => locals,
            _ => return Err(event),
        };

        for entry in locals {
            if entry.events.send(event.clone()).is_err() {
                log_warn!(
                    "event handler for {} ({}) is gone; event {} dropped",
                    entry.topic,
                    event.subscription,
                    event.publication
                );
            }
        }
        Ok(())
    }

    pub fn contains(&self, subscription: SubscriptionId, local: LocalId) -> bool {
        // ---
        self.entries
            .get(&subscription)
            .is_some_and(|locals| locals.iter().any(|l| l.local == local))
    }

    /// Number of local subscriptions sharing `subscription`.
    pub fn local_count(&self, subscription: SubscriptionId) -> usize {
        self.entries.get(&subscription).map_or(0, Vec::len)
    }

    /// Drop one local subscription; its event task ends after draining.
    pub fn remove_local(&mut self, subscription: SubscriptionId, local: LocalId) -> bool {
        // ---
        let Some(locals) = self.entries.get_mut(&subscription) else {
            return false;
        };

        let before = locals.len();
        locals.retain(|l| l.local != local);
        let removed = locals.len() != before;

        if locals.is_empty() {
            self.entries.remove(&subscription);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total local subscriptions.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

struct LocalRegistration {
    // ---
    procedure: String,
    handler: InvocationHandler,
}

/// Dealer registration id -> handler.
pub(crate) struct RegistrationTable {
    // ---
    entries: HashMap<RegistrationId, LocalRegistration>,
}

impl RegistrationTable {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, registration: RegistrationId, procedure: String, handler: InvocationHandler) {
        // ---
        if let Some(_previous) = self
            .entries
            .insert(registration, LocalRegistration { procedure, handler })
        {
            log_warn!(
                "registration {registration} reassigned, replacing handler for {}",
                _previous.procedure
            );
        }
    }

    /// Handler for an invocation, with the procedure it was registered for.
    pub fn get(&self, registration: RegistrationId) -> Option<(InvocationHandler, &str)> {
        // ---
        self.entries
            .get(&registration)
            .map(|r| (r.handler.clone(), r.procedure.as_str()))
    }

    pub fn contains(&self, registration: RegistrationId) -> bool {
        self.entries.contains_key(&registration)
    }

    pub fn remove(&mut self, registration: RegistrationId) -> bool {
        self.entries.remove(&registration).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
