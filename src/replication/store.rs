//! Projection of cluster-state customs into the current subscription and
//! publication maps.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cluster::ClusterChangedEvent;
use crate::metadata::{PublicationsMetadata, Subscription, SubscriptionsMetadata};

/// Names that appeared in / disappeared from the subscriptions custom with
/// one cluster-state event. A name never shows up in both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Volatile projection of the replication customs.
///
/// Written only from the cluster-state applier through [`Self::apply`];
/// readers take an `Arc` snapshot and never observe a torn update.
#[derive(Default)]
pub struct SubscriptionStore {
    subscriptions: RwLock<Arc<SubscriptionsMetadata>>,
    publications: RwLock<Arc<PublicationsMetadata>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriptions(&self) -> Arc<SubscriptionsMetadata> {
        self.subscriptions.read().clone()
    }

    pub fn publications(&self) -> Arc<PublicationsMetadata> {
        self.publications.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<Subscription> {
        self.subscriptions.read().get(name).cloned()
    }

    /// Fold the next cluster-state event into the projection.
    ///
    /// Each custom is replaced only when the new snapshot carries it and it
    /// structurally differs from the cached one (reference equality is the
    /// fast path). Returns the subscription add/remove diff of the event.
    pub fn apply(&self, event: &ClusterChangedEvent) -> SubscriptionDiff {
        let mut diff = SubscriptionDiff::default();

        let previous = event.previous.metadata.subscriptions.as_ref();
        if let Some(next) = event.current.metadata.subscriptions.as_ref() {
            let replaced = previous.map_or(true, |previous| {
                !Arc::ptr_eq(previous, next) && previous != next
            });
            if replaced {
                *self.subscriptions.write() = next.clone();

                let empty = BTreeMap::new();
                let old = previous.map_or(&empty, |previous| previous.subscriptions());
                for name in next.subscriptions().keys() {
                    if !old.contains_key(name) {
                        diff.added.push(name.clone());
                    }
                }
                for name in old.keys() {
                    if !next.contains(name) {
                        diff.removed.push(name.clone());
                    }
                }
            }
        }

        let previous = event.previous.metadata.publications.as_ref();
        if let Some(next) = event.current.metadata.publications.as_ref() {
            let replaced = previous.map_or(true, |previous| {
                !Arc::ptr_eq(previous, next) && previous != next
            });
            if replaced {
                *self.publications.write() = next.clone();
            }
        }

        diff
    }
}
