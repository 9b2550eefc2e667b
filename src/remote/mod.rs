//! Named, pooled handles to publisher clusters.

pub mod client;
pub mod registry;

pub use client::{RemoteClusterClient, RemoteClusterError, RemoteConnectionFactory};
pub use registry::RemoteClusters;
