//! Per-connection synchronization state.

use crate::connection::ConnectionId;
use livedata_codec::Value;
use livedata_core::Snapshot;

/// A connection's live binding to one publication.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Client-chosen id.
    pub id: String,
    /// Publication name.
    pub publication: String,
    /// Parameters passed to the publication.
    pub params: Value,
    /// Whether `subscription_ready` has been sent.
    pub ready: bool,
}

impl Subscription {
    /// Creates a subscription that is not yet ready.
    pub fn new(id: impl Into<String>, publication: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            publication: publication.into(),
            params,
            ready: false,
        }
    }
}

/// Everything the server tracks for one connection.
///
/// Owned by the connection's task; nothing else mutates it.
#[derive(Debug)]
pub struct ConnectionState {
    id: ConnectionId,
    subscriptions: Vec<Subscription>,
    snapshot: Snapshot,
}

impl ConnectionState {
    /// Creates the state of a fresh connection.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            subscriptions: Vec::new(),
            snapshot: Snapshot::new(),
        }
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the subscriptions in the order they were made.
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Returns the subscriptions for readiness updates.
    pub fn subscriptions_mut(&mut self) -> &mut [Subscription] {
        &mut self.subscriptions
    }

    /// Returns the last snapshot sent to the client.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Replaces the snapshot, returning the previous one.
    pub fn replace_snapshot(&mut self, snapshot: Snapshot) -> Snapshot {
        std::mem::replace(&mut self.snapshot, snapshot)
    }

    /// Appends a subscription. Duplicate ids are kept side by side.
    pub fn subscribe(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Removes every subscription with this id. Returns how many went.
    pub fn unsubscribe(&mut self, id: &str) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        before - self.subscriptions.len()
    }
}
