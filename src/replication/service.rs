//! Supervisor composing the logical replication control plane.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::auth::{self, PrivilegeError, User};
use crate::cluster::{ClusterChangedEvent, ClusterService, ClusterStateListener};
use crate::core::ReplicationSettings;
use crate::metadata::{
    ConnectionInfo, PublicationsMetadata, RelationName, RelationState, Subscription,
    SubscriptionsMetadata,
};
use crate::remote::{RemoteClusters, RemoteConnectionFactory};
use crate::rpc::{PublicationsStateRequest, PublicationsStateResponse};

use super::repository::{repository_name, RepositoriesService, REPOSITORY_TYPE};
use super::restore::{RestoreCoordinator, RestoreService};
use super::state_machine::{SubscriptionStateMachine, SubscriptionUpdateClient};
use super::store::SubscriptionStore;
use super::tracker::{
    MetadataTracker, PollClock, RuntimePollClock, REASON_CONNECT_FAILED,
    REASON_PUBLICATIONS_STATE_FAILED,
};
use super::ReplicationError;

/// Owns the control plane: the store projection, the remote-cluster
/// registry, the restore coordinator, the state machine, and the metadata
/// tracker. Registered as a cluster-state listener on construction; all
/// subscription lifecycle handling starts from those events.
pub struct LogicalReplicationService<C: PollClock = RuntimePollClock> {
    cluster: Arc<ClusterService>,
    store: Arc<SubscriptionStore>,
    registry: Arc<RemoteClusters>,
    state_machine: Arc<SubscriptionStateMachine>,
    coordinator: Arc<RestoreCoordinator>,
    tracker: Arc<MetadataTracker<C>>,
    repositories: Mutex<Option<Arc<dyn RepositoriesService>>>,
}

impl<C: PollClock> LogicalReplicationService<C> {
    /// Build the control plane and register it on the cluster-state stream.
    ///
    /// The repositories service must be installed via
    /// [`Self::set_repositories_service`] immediately afterwards, before the
    /// first cluster-state event carrying subscriptions is applied.
    pub fn new(
        settings: ReplicationSettings,
        clock: C,
        cluster: Arc<ClusterService>,
        connection_factory: Arc<dyn RemoteConnectionFactory>,
        update_client: Arc<dyn SubscriptionUpdateClient>,
        restore_service: Arc<dyn RestoreService>,
    ) -> Arc<Self> {
        let store = Arc::new(SubscriptionStore::new());
        let registry = Arc::new(RemoteClusters::new(connection_factory));
        let state_machine = Arc::new(SubscriptionStateMachine::new(store.clone(), update_client));
        let coordinator = Arc::new(RestoreCoordinator::new(
            restore_service,
            cluster.clone(),
            state_machine.clone(),
            &settings,
        ));
        let tracker = Arc::new(MetadataTracker::new(
            settings,
            clock,
            cluster.clone(),
            store.clone(),
            registry.clone(),
            state_machine.clone(),
            coordinator.clone(),
        ));
        let service = Arc::new(Self {
            cluster,
            store,
            registry,
            state_machine,
            coordinator,
            tracker,
            repositories: Mutex::new(None),
        });
        service.cluster.add_listener(service.clone());
        service
    }

    /// Install the external repositories service.
    pub fn set_repositories_service(&self, repositories: Arc<dyn RepositoriesService>) {
        *self.repositories.lock() = Some(repositories);
    }

    /// Current subscriptions snapshot.
    pub fn subscriptions(&self) -> Arc<SubscriptionsMetadata> {
        self.store.subscriptions()
    }

    /// Current publications snapshot.
    pub fn publications(&self) -> Arc<PublicationsMetadata> {
        self.store.publications()
    }

    pub fn is_tracker_active(&self) -> bool {
        self.tracker.is_active()
    }

    pub fn is_tracking(&self, name: &str) -> bool {
        self.tracker.is_tracking(name)
    }

    /// Stop background work; the projection stays readable.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Fetch the publisher's publication state on the DDL path, recording a
    /// failure in the subscription state when the publisher is unreachable
    /// or rejects the request.
    pub async fn publication_state(
        &self,
        subscription_name: &str,
        publications: &[String],
        connection_info: &ConnectionInfo,
    ) -> anyhow::Result<PublicationsStateResponse> {
        let client = match self.registry.connect(subscription_name, connection_info).await {
            Ok(client) => client,
            Err(err) => {
                self.record_failure(subscription_name, REASON_CONNECT_FAILED).await;
                return Err(err.into());
            }
        };
        let request = PublicationsStateRequest {
            publications: publications.to_vec(),
            user: connection_info.user().unwrap_or_default().to_string(),
        };
        match client.publications_state(request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.record_failure(subscription_name, REASON_PUBLICATIONS_STATE_FAILED)
                    .await;
                Err(err.into())
            }
        }
    }

    /// Pre-flight for CREATE SUBSCRIPTION: every concrete index and template
    /// the publisher would ship must be absent locally. Template collisions
    /// are reported under the logical relation name.
    pub fn verify_tables_do_not_exist(
        &self,
        subscription_name: &str,
        response: &PublicationsStateResponse,
    ) -> Result<(), ReplicationError> {
        let state = self.cluster.state();
        for index in &response.concrete_indices {
            if state.metadata.has_index(index) {
                return Err(ReplicationError::RelationAlreadyExists {
                    subscription: subscription_name.to_string(),
                    relation: RelationName::from_index_name(index),
                });
            }
        }
        for template in &response.concrete_templates {
            if state.metadata.has_template(template) {
                let relation = RelationName::from_template_name(template)
                    .unwrap_or_else(|| RelationName::from_index_name(template));
                return Err(ReplicationError::RelationAlreadyExists {
                    subscription: subscription_name.to_string(),
                    relation,
                });
            }
        }
        Ok(())
    }

    /// Kick off the initial restore of subscribed relations.
    pub async fn restore(
        &self,
        subscription_name: &str,
        restore_settings: BTreeMap<String, String>,
        relation_names: Vec<RelationName>,
        indices: Vec<String>,
        templates: Vec<String>,
    ) -> anyhow::Result<bool> {
        self.coordinator
            .restore(
                subscription_name,
                restore_settings,
                relation_names,
                indices,
                templates,
            )
            .await
    }

    /// Update relation states of a subscription (scoped form).
    pub async fn update_subscription_state(
        &self,
        subscription_name: &str,
        relations: &[RelationName],
        state: RelationState,
    ) -> anyhow::Result<bool> {
        self.state_machine
            .update(subscription_name, relations, state)
            .await
    }

    /// DDL-boundary guard: superusers and users owning a subscription cannot
    /// be dropped.
    pub fn ensure_user_droppable(&self, user: &User) -> Result<(), PrivilegeError> {
        auth::ensure_droppable(user)?;
        let subscriptions = self.store.subscriptions();
        if let Some((name, _)) = subscriptions
            .subscriptions()
            .iter()
            .find(|(_, subscription)| subscription.owner == user.name())
        {
            return Err(PrivilegeError::OwnsSubscription {
                user: user.name().to_string(),
                subscription: name.clone(),
            });
        }
        Ok(())
    }

    /// Record a cluster-wide failure reason; losing the update itself is
    /// only logged, the original error is what the caller sees.
    async fn record_failure(&self, subscription_name: &str, reason: &str) {
        if let Err(err) = self
            .state_machine
            .update_all(subscription_name, RelationState::failed(reason))
            .await
        {
            tracing::warn!(
                "failed to mark subscription '{subscription_name}' as failed: {err:#}"
            );
        }
    }

    fn repositories(&self) -> Arc<dyn RepositoriesService> {
        self.repositories
            .lock()
            .clone()
            .expect("repositories service must be installed before subscription events are processed")
    }

    fn subscription_added(&self, name: &str, subscription: &Subscription) {
        tracing::debug!("adding logical replication repository for subscription '{name}'");
        self.repositories()
            .register_internal_repository(&repository_name(name), REPOSITORY_TYPE);

        // Dial off the applier thread; tracking starts only once connected
        // and only on the elected master.
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("no async runtime available; not connecting subscription '{name}'");
            return;
        }
        let registry = self.registry.clone();
        let tracker = self.tracker.clone();
        let is_master = self.cluster.is_local_node_elected_master();
        let name = name.to_string();
        let info = subscription.connection_info.clone();
        tokio::spawn(async move {
            match registry.connect(&name, &info).await {
                Ok(_) if is_master => tracker.start_tracking(&name),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("connect to publisher of subscription '{name}' failed: {err}");
                }
            }
        });
    }

    fn subscription_removed(&self, name: &str) {
        tracing::debug!("removing logical replication repository of dropped subscription '{name}'");
        self.repositories()
            .unregister_internal_repository(&repository_name(name));
        self.tracker.stop_tracking(name);
        self.registry.remove(name);
    }
}

impl<C: PollClock> ClusterStateListener for LogicalReplicationService<C> {
    fn cluster_changed(&self, event: &ClusterChangedEvent) {
        let diff = self.store.apply(event);
        if !diff.is_empty() {
            let current = self.store.subscriptions();
            for name in &diff.added {
                if let Some(subscription) = current.get(name) {
                    self.subscription_added(name, subscription);
                }
            }
            for name in &diff.removed {
                self.subscription_removed(name);
            }
        }

        if event.master_node_changed() {
            if event.is_local_node_elected_master() {
                self.tracker.maybe_start();
            } else {
                self.tracker.close();
            }
        }
    }
}
