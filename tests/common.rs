//! Shared mock collaborators and cluster-state builders for the
//! integration tests.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lodestone::cluster::{
    ClusterMetadata, ClusterState, DiscoveryNodes, RestoreInProgressEntry, RestoresInProgress,
};
use lodestone::core::ReplicationSettings;
use lodestone::metadata::{
    ConnectionInfo, PublicationsMetadata, RelationName, RelationState, Subscription,
    SubscriptionsMetadata,
};
use lodestone::remote::{RemoteClusterClient, RemoteClusterError, RemoteConnectionFactory};
use lodestone::replication::repository::RepositoriesService;
use lodestone::replication::{
    RestoreCompletionResponse, RestoreInfo, RestoreRequest, RestoreService,
    SubscriptionUpdateClient,
};
use lodestone::rpc::{
    AcknowledgedResponse, PublicationsStateRequest, PublicationsStateResponse, RelationDescriptor,
    RelationSchema, UpdateSubscriptionRequest,
};

/// Settings with a tick interval short enough for tests.
pub fn test_settings() -> ReplicationSettings {
    ReplicationSettings {
        tracker_poll_interval_ms: 25,
        restore_queue_depth: 2,
        master_node_timeout_secs: 5,
    }
}

pub fn connection(url: &str) -> ConnectionInfo {
    ConnectionInfo::from_url(url).expect("valid test connection string")
}

pub fn relation(fqn: &str) -> RelationName {
    RelationName::from_index_name(fqn)
}

pub fn subscription(owner: &str, url: &str, publications: &[&str]) -> Subscription {
    Subscription::new(
        owner,
        connection(url),
        publications.iter().map(|name| (*name).to_string()).collect(),
    )
}

/// Publications-state response exposing the given relations, each backed by
/// a concrete index of the same name.
pub fn publications_response(relations: &[&str]) -> PublicationsStateResponse {
    PublicationsStateResponse {
        concrete_indices: relations.iter().map(|name| (*name).to_string()).collect(),
        concrete_templates: Vec::new(),
        relations: relations
            .iter()
            .map(|name| RelationDescriptor {
                name: relation(name),
                schema: RelationSchema::default(),
            })
            .collect(),
    }
}

// -----------------------------------------------------------------------------
// Mock collaborators
// -----------------------------------------------------------------------------

/// Publisher client returning a scripted publications-state response.
#[derive(Default)]
pub struct StubRemoteClient {
    pub response: Mutex<PublicationsStateResponse>,
    pub fail_requests: AtomicBool,
    pub requests: Mutex<Vec<PublicationsStateRequest>>,
}

impl StubRemoteClient {
    pub fn set_response(&self, response: PublicationsStateResponse) {
        *self.response.lock() = response;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl RemoteClusterClient for StubRemoteClient {
    async fn publications_state(
        &self,
        request: PublicationsStateRequest,
    ) -> Result<PublicationsStateResponse, RemoteClusterError> {
        self.requests.lock().push(request);
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(RemoteClusterError::RequestFailed {
                cluster: "publisher".to_string(),
                reason: "request refused".to_string(),
            });
        }
        Ok(self.response.lock().clone())
    }
}

/// Connection factory handing out one shared stub client.
pub struct StubConnectionFactory {
    pub client: Arc<StubRemoteClient>,
    pub fail_connects: AtomicBool,
    pub connects: AtomicUsize,
}

impl Default for StubConnectionFactory {
    fn default() -> Self {
        Self {
            client: Arc::new(StubRemoteClient::default()),
            fail_connects: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteConnectionFactory for StubConnectionFactory {
    async fn connect(
        &self,
        name: &str,
        _info: &ConnectionInfo,
    ) -> Result<Arc<dyn RemoteClusterClient>, RemoteClusterError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(RemoteClusterError::ConnectFailed {
                cluster: name.to_string(),
                reason: "dial refused".to_string(),
            });
        }
        Ok(self.client.clone())
    }
}

/// Update client recording every subscription replacement it acknowledges.
pub struct RecordingUpdateClient {
    pub requests: Mutex<Vec<UpdateSubscriptionRequest>>,
    pub acknowledge: AtomicBool,
    pub fail: AtomicBool,
}

impl Default for RecordingUpdateClient {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            acknowledge: AtomicBool::new(true),
            fail: AtomicBool::new(false),
        }
    }
}

impl RecordingUpdateClient {
    /// States recorded for one relation, in submission order.
    pub fn states_of(&self, relation: &RelationName) -> Vec<RelationState> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| request.subscription.relations.get(relation).cloned())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl SubscriptionUpdateClient for RecordingUpdateClient {
    async fn update_subscription(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> anyhow::Result<AcknowledgedResponse> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("metadata update pipeline unavailable");
        }
        self.requests.lock().push(request);
        if self.acknowledge.load(Ordering::SeqCst) {
            Ok(AcknowledgedResponse::acknowledged())
        } else {
            Ok(AcknowledgedResponse::unacknowledged())
        }
    }
}

/// Restore service with scripted completions. With an empty script every
/// submission completes synchronously with one clean shard; `block` parks
/// the snapshot worker forever.
#[derive(Default)]
pub struct ScriptedRestoreService {
    pub responses: Mutex<VecDeque<anyhow::Result<RestoreCompletionResponse>>>,
    pub requests: Mutex<Vec<RestoreRequest>>,
    pub block: AtomicBool,
}

impl ScriptedRestoreService {
    /// Queue a synchronous completion with the given shard counts.
    pub fn push_info(&self, total_shards: u32, failed_shards: u32) {
        self.responses
            .lock()
            .push_back(Ok(RestoreCompletionResponse {
                restore_id: format!("restore-{total_shards}-{failed_shards}"),
                restore_info: Some(RestoreInfo {
                    total_shards,
                    failed_shards,
                }),
            }));
    }

    /// Queue an acceptance whose completion must be observed via the
    /// cluster state under `restore_id`.
    pub fn push_deferred(&self, restore_id: &str) {
        self.responses
            .lock()
            .push_back(Ok(RestoreCompletionResponse {
                restore_id: restore_id.to_string(),
                restore_info: None,
            }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(anyhow::anyhow!("{message}")));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl RestoreService for ScriptedRestoreService {
    async fn restore_snapshot(
        &self,
        request: RestoreRequest,
    ) -> anyhow::Result<RestoreCompletionResponse> {
        self.requests.lock().push(request);
        if self.block.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.responses.lock().pop_front() {
            Some(result) => result,
            None => Ok(RestoreCompletionResponse {
                restore_id: "restore-default".to_string(),
                restore_info: Some(RestoreInfo {
                    total_shards: 1,
                    failed_shards: 0,
                }),
            }),
        }
    }
}

/// Records repository handle registrations.
#[derive(Default)]
pub struct RecordingRepositories {
    pub registered: Mutex<Vec<(String, String)>>,
    pub unregistered: Mutex<Vec<String>>,
}

impl RepositoriesService for RecordingRepositories {
    fn register_internal_repository(&self, name: &str, repository_type: &str) {
        self.registered
            .lock()
            .push((name.to_string(), repository_type.to_string()));
    }

    fn unregister_internal_repository(&self, name: &str) {
        self.unregistered.lock().push(name.to_string());
    }
}

// -----------------------------------------------------------------------------
// Cluster-state builders
// -----------------------------------------------------------------------------

/// Builder for the cluster snapshots a test feeds through the applier.
pub struct ClusterStateBuilder {
    version: u64,
    local_node: String,
    master_node: Option<String>,
    subscriptions: Option<SubscriptionsMetadata>,
    publications: Option<PublicationsMetadata>,
    indices: BTreeSet<String>,
    templates: BTreeSet<String>,
    restores: RestoresInProgress,
}

impl ClusterStateBuilder {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            local_node: "n1".to_string(),
            master_node: None,
            subscriptions: None,
            publications: None,
            indices: BTreeSet::new(),
            templates: BTreeSet::new(),
            restores: RestoresInProgress::default(),
        }
    }

    pub fn local_node(mut self, node: &str) -> Self {
        self.local_node = node.to_string();
        self
    }

    pub fn master(mut self, node: &str) -> Self {
        self.master_node = Some(node.to_string());
        self
    }

    pub fn subscriptions(mut self, metadata: SubscriptionsMetadata) -> Self {
        self.subscriptions = Some(metadata);
        self
    }

    pub fn publications(mut self, metadata: PublicationsMetadata) -> Self {
        self.publications = Some(metadata);
        self
    }

    pub fn index(mut self, name: &str) -> Self {
        self.indices.insert(name.to_string());
        self
    }

    pub fn template(mut self, name: &str) -> Self {
        self.templates.insert(name.to_string());
        self
    }

    pub fn restore_entry(mut self, restore_id: &str, total_shards: u32, failed_shards: u32) -> Self {
        self.restores = self.restores.with_entry(
            restore_id,
            RestoreInProgressEntry {
                total_shards,
                failed_shards,
            },
        );
        self
    }

    pub fn build(self) -> ClusterState {
        ClusterState {
            version: self.version,
            nodes: DiscoveryNodes::new(self.local_node, self.master_node),
            metadata: ClusterMetadata {
                subscriptions: self.subscriptions.map(Arc::new),
                publications: self.publications.map(Arc::new),
                indices: self.indices,
                templates: self.templates,
                restores_in_progress: self.restores,
            },
        }
    }
}

/// One subscription under its usual test name.
pub fn metadata_with(name: &str, subscription: Subscription) -> SubscriptionsMetadata {
    SubscriptionsMetadata::default().with_subscription(name, subscription)
}

/// Map of restore settings for restore calls.
pub fn no_settings() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Poll until `condition` holds or a generous deadline passes.
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
