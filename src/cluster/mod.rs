//! Cluster-state snapshots and their delivery to the control plane.
//!
//! Consensus and persistence of the cluster state live outside this crate.
//! An external applier feeds [`ClusterService::apply_state`] a monotonically
//! advancing stream of immutable snapshots; everything in the control plane
//! observes the cluster through those snapshots.

pub mod service;
pub mod state;

pub use service::{ClusterService, ClusterStateListener};
pub use state::{
    ClusterChangedEvent, ClusterMetadata, ClusterState, DiscoveryNodes, RestoreInProgressEntry,
    RestoresInProgress,
};
