//! Cluster-state delivery: ordered listeners plus an async broadcast.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;

use super::state::{ClusterChangedEvent, ClusterState};

/// Synchronous observer of cluster-state transitions.
///
/// Callbacks run inline on the applier thread and must not block; anything
/// long-running is dispatched onto the runtime from within the callback.
pub trait ClusterStateListener: Send + Sync {
    fn cluster_changed(&self, event: &ClusterChangedEvent);
}

/// Holds the current cluster snapshot and fans out transitions.
///
/// `apply_state` is driven by the single external applier in version order;
/// listeners therefore observe events in that same order. Async consumers
/// subscribe to the watch broadcast instead and only ever see the newest
/// snapshot.
pub struct ClusterService {
    state: RwLock<Arc<ClusterState>>,
    listeners: Mutex<Vec<Arc<dyn ClusterStateListener>>>,
    broadcast: watch::Sender<Arc<ClusterState>>,
}

impl ClusterService {
    pub fn new(initial: ClusterState) -> Self {
        let initial = Arc::new(initial);
        let (broadcast, _) = watch::channel(initial.clone());
        Self {
            state: RwLock::new(initial),
            listeners: Mutex::new(Vec::new()),
            broadcast,
        }
    }

    /// Current snapshot; readers hold the returned `Arc` for the duration of
    /// a read to avoid torn observations.
    pub fn state(&self) -> Arc<ClusterState> {
        self.state.read().clone()
    }

    pub fn is_local_node_elected_master(&self) -> bool {
        self.state().nodes.is_local_node_elected_master()
    }

    pub fn add_listener(&self, listener: Arc<dyn ClusterStateListener>) {
        self.listeners.lock().push(listener);
    }

    /// Subscribe to snapshot updates.
    pub fn watch_state(&self) -> watch::Receiver<Arc<ClusterState>> {
        self.broadcast.subscribe()
    }

    /// Apply the next snapshot and fire listeners.
    ///
    /// Must be called from the single state-applier thread with versions in
    /// ascending order.
    pub fn apply_state(&self, next: ClusterState) {
        let next = Arc::new(next);
        let previous = {
            let mut guard = self.state.write();
            std::mem::replace(&mut *guard, next.clone())
        };
        let event = ClusterChangedEvent {
            previous,
            current: next.clone(),
        };
        let listeners: Vec<_> = self.listeners.lock().clone();
        for listener in listeners {
            listener.cluster_changed(&event);
        }
        let _ = self.broadcast.send(next);
    }
}

impl Default for ClusterService {
    fn default() -> Self {
        Self::new(ClusterState::default())
    }
}
