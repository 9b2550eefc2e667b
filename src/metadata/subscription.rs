//! Subscriptions and their per-relation replication state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::connection::ConnectionInfo;
use super::relation::RelationName;

/// Replication state of a single mirrored relation.
///
/// A relation starts out `Initializing`, moves to `Restoring` while the
/// initial snapshot copy runs, and ends up `Synchronized` once change capture
/// has taken over. `Failed` is terminal unless the subscription is dropped
/// and recreated; it carries the failure reason verbatim so system tables can
/// surface it. Transitioning into any other state clears a previous reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RelationState {
    Initializing,
    Restoring,
    Synchronized,
    Failed { reason: String },
}

impl RelationState {
    pub fn failed(reason: impl Into<String>) -> Self {
        RelationState::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RelationState::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            RelationState::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationState::Initializing => "INITIALIZING",
            RelationState::Restoring => "RESTORING",
            RelationState::Synchronized => "SYNCHRONIZED",
            RelationState::Failed { .. } => "FAILED",
        }
    }
}

impl fmt::Display for RelationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named declaration of which publications to mirror from which publisher.
///
/// The relation map evolves independently per relation; everything else is
/// fixed at CREATE SUBSCRIPTION time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub owner: String,
    pub connection_info: ConnectionInfo,
    pub publications: Vec<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub relations: BTreeMap<RelationName, RelationState>,
}

impl Subscription {
    pub fn new(
        owner: impl Into<String>,
        connection_info: ConnectionInfo,
        publications: Vec<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            connection_info,
            publications,
            settings: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with_relation(mut self, relation: RelationName, state: RelationState) -> Self {
        self.relations.insert(relation, state);
        self
    }

    /// Copy of this subscription with the given states merged over the
    /// existing relation map.
    pub fn with_updated_relations(
        &self,
        updates: impl IntoIterator<Item = (RelationName, RelationState)>,
    ) -> Self {
        let mut merged = self.relations.clone();
        for (relation, state) in updates {
            merged.insert(relation, state);
        }
        Self {
            relations: merged,
            ..self.clone()
        }
    }
}

/// Cluster-state custom holding every subscription, keyed by name.
///
/// Immutable snapshot: a change replaces the whole custom. Equality is
/// structural, which is what the store's diffing relies on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscriptionsMetadata {
    subscriptions: BTreeMap<String, Subscription>,
}

impl SubscriptionsMetadata {
    pub fn new(subscriptions: BTreeMap<String, Subscription>) -> Self {
        Self { subscriptions }
    }

    pub fn subscriptions(&self) -> &BTreeMap<String, Subscription> {
        &self.subscriptions
    }

    pub fn get(&self, name: &str) -> Option<&Subscription> {
        self.subscriptions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.subscriptions.contains_key(name)
    }

    pub fn with_subscription(mut self, name: impl Into<String>, subscription: Subscription) -> Self {
        self.subscriptions.insert(name.into(), subscription);
        self
    }

    pub fn without_subscription(mut self, name: &str) -> Self {
        self.subscriptions.remove(name);
        self
    }
}
