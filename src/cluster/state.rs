//! Immutable cluster-state snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::metadata::{PublicationsMetadata, SubscriptionsMetadata};

/// Node discovery view; enough to answer master-election questions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryNodes {
    pub local_node_id: String,
    pub master_node_id: Option<String>,
}

impl DiscoveryNodes {
    pub fn new(local_node_id: impl Into<String>, master_node_id: Option<String>) -> Self {
        Self {
            local_node_id: local_node_id.into(),
            master_node_id,
        }
    }

    pub fn is_local_node_elected_master(&self) -> bool {
        self.master_node_id.as_deref() == Some(self.local_node_id.as_str())
    }
}

/// Shard accounting of a restore that is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreInProgressEntry {
    pub total_shards: u32,
    pub failed_shards: u32,
}

/// Keyed table of running restores inside the cluster snapshot.
///
/// A restore is finished exactly when its key disappears; the last snapshot
/// still carrying the entry holds the final shard counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoresInProgress {
    entries: BTreeMap<String, RestoreInProgressEntry>,
}

impl RestoresInProgress {
    pub fn get(&self, restore_id: &str) -> Option<&RestoreInProgressEntry> {
        self.entries.get(restore_id)
    }

    pub fn contains(&self, restore_id: &str) -> bool {
        self.entries.contains_key(restore_id)
    }

    pub fn with_entry(mut self, restore_id: impl Into<String>, entry: RestoreInProgressEntry) -> Self {
        self.entries.insert(restore_id.into(), entry);
        self
    }

    pub fn without_entry(mut self, restore_id: &str) -> Self {
        self.entries.remove(restore_id);
        self
    }
}

/// Metadata section of a cluster snapshot.
///
/// The replication customs are optional: a cluster that never saw replication
/// DDL simply has none. Indices and templates are tracked by name only; that
/// is all the pre-flight collision check needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterMetadata {
    pub subscriptions: Option<Arc<SubscriptionsMetadata>>,
    pub publications: Option<Arc<PublicationsMetadata>>,
    pub indices: BTreeSet<String>,
    pub templates: BTreeSet<String>,
    pub restores_in_progress: RestoresInProgress,
}

impl ClusterMetadata {
    pub fn has_index(&self, name: &str) -> bool {
        self.indices.contains(name)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains(name)
    }
}

/// One immutable snapshot of the cluster, delivered in version order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterState {
    pub version: u64,
    pub nodes: DiscoveryNodes,
    pub metadata: ClusterMetadata,
}

/// A state transition as observed by listeners.
#[derive(Debug, Clone)]
pub struct ClusterChangedEvent {
    pub previous: Arc<ClusterState>,
    pub current: Arc<ClusterState>,
}

impl ClusterChangedEvent {
    pub fn master_node_changed(&self) -> bool {
        self.previous.nodes.master_node_id != self.current.nodes.master_node_id
    }

    pub fn is_local_node_elected_master(&self) -> bool {
        self.current.nodes.is_local_node_elected_master()
    }
}
