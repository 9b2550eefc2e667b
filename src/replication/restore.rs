//! Initial snapshot restore orchestration.
//!
//! The restore itself runs in an external restore service; this module
//! drives it: submission on a dedicated snapshot worker with a bounded
//! queue, the `Restoring` transition once the submission is accepted,
//! completion observation either synchronously or through the
//! in-progress-restores table of the cluster snapshot, and the shard-failure
//! classification of the outcome. Relation state is always updated before
//! the caller observes the result.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::cluster::ClusterService;
use crate::core::ReplicationSettings;
use crate::metadata::{RelationName, RelationState};

use super::repository::{repository_name, LATEST_SNAPSHOT};
use super::state_machine::SubscriptionStateMachine;
use super::ReplicationError;

/// Reason recorded for every non-partial restore failure.
pub const RESTORE_FAILED_REASON: &str =
    "Error while initial restoring the subscription relations";

/// How the restore service expands the requested index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicesOptions {
    /// Every requested index must exist and be open.
    #[default]
    Strict,
    /// Missing indices are skipped, open ones expanded.
    LenientExpandOpen,
}

/// Restore submission handed to the external restore service.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub repository: String,
    pub snapshot: String,
    pub indices: Vec<String>,
    pub templates: Vec<String>,
    pub indices_options: IndicesOptions,
    pub settings: BTreeMap<String, String>,
    pub master_node_timeout: Duration,
    pub description: String,
}

/// Final shard accounting of a finished restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreInfo {
    pub total_shards: u32,
    pub failed_shards: u32,
}

/// Acceptance of a restore submission. `restore_info` is present when the
/// restore completed synchronously; otherwise completion is observed through
/// the cluster state under `restore_id`.
#[derive(Debug, Clone)]
pub struct RestoreCompletionResponse {
    pub restore_id: String,
    pub restore_info: Option<RestoreInfo>,
}

/// External service executing snapshot restores.
#[async_trait]
pub trait RestoreService: Send + Sync {
    async fn restore_snapshot(
        &self,
        request: RestoreRequest,
    ) -> anyhow::Result<RestoreCompletionResponse>;
}

struct RestoreJob {
    request: RestoreRequest,
    reply: oneshot::Sender<anyhow::Result<RestoreCompletionResponse>>,
}

/// Drives the initial restore of subscribed relations.
pub struct RestoreCoordinator {
    cluster: Arc<ClusterService>,
    state_machine: Arc<SubscriptionStateMachine>,
    master_node_timeout: Duration,
    snapshot_queue: mpsc::Sender<RestoreJob>,
}

impl RestoreCoordinator {
    /// Spawns the snapshot worker; must be called within an async runtime.
    pub fn new(
        restore_service: Arc<dyn RestoreService>,
        cluster: Arc<ClusterService>,
        state_machine: Arc<SubscriptionStateMachine>,
        settings: &ReplicationSettings,
    ) -> Self {
        let (snapshot_queue, mut jobs) = mpsc::channel::<RestoreJob>(settings.restore_queue_depth);
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                let result = restore_service.restore_snapshot(job.request).await;
                let _ = job.reply.send(result);
            }
        });
        Self {
            cluster,
            state_machine,
            master_node_timeout: settings.master_node_timeout(),
            snapshot_queue,
        }
    }

    /// Restore the given relations of a subscription from the publisher's
    /// latest snapshot and record the outcome in their relation state.
    ///
    /// Resolves to `Ok(true)` on a clean restore, `Ok(false)` when the
    /// restore finished with failed shards or a master failover, and an
    /// error when the submission was rejected or the restore service failed
    /// outright (in which case no relation state was touched yet).
    pub async fn restore(
        &self,
        subscription_name: &str,
        restore_settings: BTreeMap<String, String>,
        relation_names: Vec<RelationName>,
        indices: Vec<String>,
        templates: Vec<String>,
    ) -> anyhow::Result<bool> {
        tracing::info!(
            "restoring subscription={subscription_name} indices={indices:?} templates={templates:?}"
        );
        let request = RestoreRequest {
            repository: repository_name(subscription_name),
            snapshot: LATEST_SNAPSHOT.to_string(),
            indices,
            templates,
            indices_options: IndicesOptions::LenientExpandOpen,
            settings: restore_settings,
            master_node_timeout: self.master_node_timeout,
            description: format!("restore_logical_replication_snapshot[{subscription_name}]"),
        };

        let (reply, accepted) = oneshot::channel();
        self.snapshot_queue
            .try_send(RestoreJob { request, reply })
            .map_err(|err| {
                let reason = match err {
                    TrySendError::Full(_) => "snapshot queue is full",
                    TrySendError::Closed(_) => "snapshot worker is shut down",
                };
                ReplicationError::RestoreRejected {
                    subscription: subscription_name.to_string(),
                    reason: reason.to_string(),
                }
            })?;

        let response = match accepted.await {
            Ok(result) => result?,
            Err(_) => anyhow::bail!(
                "snapshot worker dropped the restore of subscription '{subscription_name}'"
            ),
        };

        self.state_machine
            .update(subscription_name, &relation_names, RelationState::Restoring)
            .await?;
        self.after_replication_started(subscription_name, response, &relation_names)
            .await
    }

    async fn after_replication_started(
        &self,
        subscription_name: &str,
        response: RestoreCompletionResponse,
        relation_names: &[RelationName],
    ) -> anyhow::Result<bool> {
        let restore_info = match response.restore_info {
            Some(info) => Some(info),
            None => match self.await_restore_completion(&response.restore_id).await {
                Ok(info) => info,
                Err(err) => {
                    self.fail_relations(subscription_name, relation_names, RESTORE_FAILED_REASON)
                        .await;
                    return Err(err);
                }
            },
        };

        match restore_info {
            None => {
                tracing::error!(
                    "restore of subscription '{subscription_name}' yielded no restore info, \
                     assuming a master failure happened while restoring"
                );
                self.fail_relations(subscription_name, relation_names, RESTORE_FAILED_REASON)
                    .await;
                Ok(false)
            }
            Some(info) if info.failed_shards == 0 => {
                tracing::debug!(
                    "restore of subscription '{subscription_name}' succeeded, \
                     following starts once shards are active"
                );
                if let Err(err) = self
                    .state_machine
                    .update(subscription_name, relation_names, RelationState::Synchronized)
                    .await
                {
                    tracing::warn!(
                        "failed to mark subscription '{subscription_name}' synchronized: {err:#}"
                    );
                }
                Ok(true)
            }
            Some(info) => {
                tracing::error!(
                    "failed to restore {}/{} shards of subscription '{subscription_name}'",
                    info.failed_shards,
                    info.total_shards
                );
                let reason = if info.failed_shards == info.total_shards {
                    RESTORE_FAILED_REASON.to_string()
                } else {
                    format!(
                        "Restoring the subscription relations failed partially. \
                         Failed to restore {}/{} shards",
                        info.failed_shards, info.total_shards
                    )
                };
                self.fail_relations(subscription_name, relation_names, &reason)
                    .await;
                Ok(false)
            }
        }
    }

    /// Wait until the restore's entry leaves the in-progress table of the
    /// cluster snapshot, yielding the last observed shard counts. An entry
    /// that was never observed means the restore vanished with the master.
    async fn await_restore_completion(
        &self,
        restore_id: &str,
    ) -> anyhow::Result<Option<RestoreInfo>> {
        let mut watcher = self.cluster.watch_state();
        let mut last_seen = None;
        loop {
            let finished = {
                let state = watcher.borrow_and_update();
                match state.metadata.restores_in_progress.get(restore_id) {
                    Some(entry) => {
                        last_seen = Some(RestoreInfo {
                            total_shards: entry.total_shards,
                            failed_shards: entry.failed_shards,
                        });
                        false
                    }
                    None => true,
                }
            };
            if finished {
                return Ok(last_seen);
            }
            if watcher.changed().await.is_err() {
                anyhow::bail!(
                    "cluster-state stream closed while waiting for restore '{restore_id}'"
                );
            }
        }
    }

    async fn fail_relations(&self, subscription_name: &str, relations: &[RelationName], reason: &str) {
        if let Err(err) = self
            .state_machine
            .update(subscription_name, relations, RelationState::failed(reason))
            .await
        {
            tracing::warn!(
                "failed to record restore failure of subscription '{subscription_name}': {err:#}"
            );
        }
    }
}
