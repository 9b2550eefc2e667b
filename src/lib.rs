#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some control-plane functions are inherently complex
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
// Option/Result patterns
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Async functions that may not await yet
#![allow(clippy::unused_async)]

//! Lodestone - logical replication control plane for a distributed SQL cluster.
//!
//! A subscriber cluster continuously mirrors a declared set of relations from
//! a publisher cluster using a snapshot-plus-change-tracking model. This crate
//! implements the subscriber-side control plane: cluster-state diffing, the
//! remote-cluster connection lifecycle, snapshot restore orchestration with
//! partial-failure semantics, and the per-relation state machines driven by
//! asynchronous events from multiple independent sources.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::settings` - Replication settings parsing and validation
//!
//! ## Cluster
//! - `cluster::state` - Immutable cluster-state snapshots and change events
//! - `cluster::service` - Listener registration and state broadcast
//!
//! ## Metadata
//! - `metadata::connection` - Publisher connection strings
//! - `metadata::relation` - Relation names and their physical forms
//! - `metadata::subscription` - Subscriptions and per-relation state
//! - `metadata::publication` - Cached publisher publications
//!
//! ## Control plane
//! - `remote` - Named, pooled publisher cluster handles
//! - `rpc` - Wire RPC shapes consumed from external collaborators
//! - `replication` - Store, restore coordination, state machine, tracker,
//!   and the supervising `LogicalReplicationService`
//!
//! ## Boundary
//! - `auth` - Superuser and ownership guards at the DDL boundary
//! - `protocol` - Row-count remapping towards SQL clients

pub mod core;

pub mod cluster;

pub mod metadata;

pub mod remote;
pub mod rpc;

pub mod replication;

pub mod auth;
pub mod protocol;

// Re-exports for convenience
pub use self::core::settings;
pub use cluster::{ClusterService, ClusterState, ClusterStateListener};
pub use metadata::{ConnectionInfo, RelationName, RelationState, Subscription};
pub use replication::{LogicalReplicationService, ReplicationError};
