//! Registry of publisher cluster handles, one per subscription.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::metadata::ConnectionInfo;

use super::client::{RemoteClusterClient, RemoteClusterError, RemoteConnectionFactory};

struct ConnectedCluster {
    info: ConnectionInfo,
    client: Arc<dyn RemoteClusterClient>,
}

/// Named, pooled, async-resolved publisher handles.
///
/// The registry does not retry failed connects; the supervisor decides when
/// to dial again. Handles are reference counted, so `remove` only drops the
/// registry's reference while in-flight requests finish on their own clone.
pub struct RemoteClusters {
    factory: Arc<dyn RemoteConnectionFactory>,
    clusters: Mutex<HashMap<String, ConnectedCluster>>,
}

impl RemoteClusters {
    pub fn new(factory: Arc<dyn RemoteConnectionFactory>) -> Self {
        Self {
            factory,
            clusters: Mutex::new(HashMap::new()),
        }
    }

    /// Connect to the named publisher, reusing an existing handle when it was
    /// opened with equivalent connection info. The lock is not held across
    /// the handshake; a racing connect for the same name leaves the newest
    /// handle in place, which is fine because the supervisor is the single
    /// writer.
    pub async fn connect(
        &self,
        name: &str,
        info: &ConnectionInfo,
    ) -> Result<Arc<dyn RemoteClusterClient>, RemoteClusterError> {
        let existing = self
            .clusters
            .lock()
            .get(name)
            .filter(|connected| connected.info == *info)
            .map(|connected| connected.client.clone());
        if let Some(client) = existing {
            return Ok(client);
        }

        tracing::debug!(
            "connecting remote cluster '{name}' via {}",
            info.safe_connection_string()
        );
        let client = self.factory.connect(name, info).await?;
        self.clusters.lock().insert(
            name.to_string(),
            ConnectedCluster {
                info: info.clone(),
                client: client.clone(),
            },
        );
        Ok(client)
    }

    /// Existing handle for the named publisher.
    pub fn client(&self, name: &str) -> Result<Arc<dyn RemoteClusterClient>, RemoteClusterError> {
        self.clusters
            .lock()
            .get(name)
            .map(|connected| connected.client.clone())
            .ok_or_else(|| RemoteClusterError::NoSuchCluster(name.to_string()))
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.clusters.lock().contains_key(name)
    }

    /// Close and forget the named publisher.
    pub fn remove(&self, name: &str) {
        if self.clusters.lock().remove(name).is_some() {
            tracing::debug!("removed remote cluster '{name}'");
        }
    }
}
