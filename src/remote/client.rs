//! Client seams to a publisher cluster.
//!
//! The actual transport (sniff or pg_tunnel) lives outside the control
//! plane; the supervisor only needs to dial by `ConnectionInfo` and issue
//! the publication-state RPC.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::metadata::ConnectionInfo;
use crate::rpc::{PublicationsStateRequest, PublicationsStateResponse};

#[derive(Debug, Clone, Error)]
pub enum RemoteClusterError {
    #[error("no active connection to remote cluster '{0}'")]
    NoSuchCluster(String),
    #[error("failed to connect to remote cluster '{cluster}': {reason}")]
    ConnectFailed { cluster: String, reason: String },
    #[error("request to remote cluster '{cluster}' failed: {reason}")]
    RequestFailed { cluster: String, reason: String },
}

/// Handle to a connected publisher cluster.
#[async_trait]
pub trait RemoteClusterClient: Send + Sync {
    /// Fetch the publisher's view of the given publications.
    async fn publications_state(
        &self,
        request: PublicationsStateRequest,
    ) -> Result<PublicationsStateResponse, RemoteClusterError>;
}

/// Opens connections to publisher clusters; the network handshake is the
/// suspension point behind this seam.
#[async_trait]
pub trait RemoteConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        info: &ConnectionInfo,
    ) -> Result<Arc<dyn RemoteClusterClient>, RemoteClusterError>;
}
