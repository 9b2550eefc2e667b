//! The logical replication control plane.
//!
//! Control flow: a cluster-state change arrives, the [`SubscriptionStore`]
//! diffs the replication customs, and the supervising
//! [`LogicalReplicationService`] registers or drops a remote repository
//! handle and, on the elected master, starts or stops metadata tracking.
//! CREATE SUBSCRIPTION enters through the supervisor's pre-flight and
//! [`RestoreCoordinator::restore`], which submits the initial snapshot
//! restore and drives the per-relation state machine from its outcome. The
//! [`MetadataTracker`] independently polls publishers and triggers further
//! restores when publications grow.

pub mod repository;
pub mod restore;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod tracker;

use thiserror::Error;

use crate::metadata::RelationName;

pub use repository::{RepositoriesService, LATEST_SNAPSHOT, REMOTE_REPOSITORY_PREFIX};
pub use restore::{
    IndicesOptions, RestoreCompletionResponse, RestoreCoordinator, RestoreInfo, RestoreRequest,
    RestoreService,
};
pub use service::LogicalReplicationService;
pub use state_machine::{SubscriptionStateMachine, SubscriptionUpdateClient};
pub use store::{SubscriptionDiff, SubscriptionStore};
pub use tracker::{MetadataTracker, PollClock, RuntimePollClock};

/// User-visible control-plane failures.
#[derive(Debug, Clone, Error)]
pub enum ReplicationError {
    /// Pre-flight collision: the subscription is not created.
    #[error("Subscription '{subscription}' cannot be created as included relation '{relation}' already exists")]
    RelationAlreadyExists {
        subscription: String,
        relation: RelationName,
    },
    /// The snapshot executor refused the restore submission; no relation
    /// state was touched because the restore never started.
    #[error("snapshot restore for subscription '{subscription}' was rejected: {reason}")]
    RestoreRejected {
        subscription: String,
        reason: String,
    },
}
