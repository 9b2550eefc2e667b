//! Per-relation state transitions, persisted through the elected master.
//!
//! ```text
//! INITIALIZING --> RESTORING --> SYNCHRONIZED
//!      |              |              |
//!      +------+-------+--------------+
//!             v
//!           FAILED  (terminal unless the subscription is dropped)
//! ```
//!
//! The control plane never moves a `Synchronized` relation back to
//! `Restoring` on its own; only an explicit operator reset could.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::metadata::{RelationName, RelationState, Subscription};
use crate::rpc::{AcknowledgedResponse, UpdateSubscriptionRequest};

use super::store::SubscriptionStore;

/// RPC seam to the master's metadata-update pipeline.
#[async_trait]
pub trait SubscriptionUpdateClient: Send + Sync {
    async fn update_subscription(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> anyhow::Result<AcknowledgedResponse>;
}

/// Applies relation-state transitions by replacing the subscription value at
/// the master. Concurrent local callers may race; the master serializes them
/// and the last writer wins, each caller observing its own acknowledgement.
pub struct SubscriptionStateMachine {
    store: Arc<SubscriptionStore>,
    client: Arc<dyn SubscriptionUpdateClient>,
}

impl SubscriptionStateMachine {
    pub fn new(store: Arc<SubscriptionStore>, client: Arc<dyn SubscriptionUpdateClient>) -> Self {
        Self { store, client }
    }

    /// Scoped update: merge `state` over the given relations only.
    ///
    /// Returns whether the master acknowledged, or `Ok(false)` without an
    /// RPC when the subscription no longer exists.
    pub async fn update(
        &self,
        name: &str,
        relations: &[RelationName],
        state: RelationState,
    ) -> anyhow::Result<bool> {
        let Some(subscription) = self.store.get(name) else {
            tracing::info!(
                "aborting relation state update to {state}, subscription '{name}' no longer exists"
            );
            return Ok(false);
        };
        let updates: BTreeMap<RelationName, RelationState> = relations
            .iter()
            .map(|relation| (relation.clone(), state.clone()))
            .collect();
        self.submit(name, subscription.with_updated_relations(updates), &state)
            .await
    }

    /// Cluster-wide update: every relation of the subscription moves to
    /// `state`.
    pub async fn update_all(&self, name: &str, state: RelationState) -> anyhow::Result<bool> {
        let Some(subscription) = self.store.get(name) else {
            tracing::info!(
                "aborting subscription state update to {state}, subscription '{name}' no longer exists"
            );
            return Ok(false);
        };
        let updates: BTreeMap<RelationName, RelationState> = subscription
            .relations
            .keys()
            .map(|relation| (relation.clone(), state.clone()))
            .collect();
        self.submit(name, subscription.with_updated_relations(updates), &state)
            .await
    }

    async fn submit(
        &self,
        name: &str,
        subscription: Subscription,
        state: &RelationState,
    ) -> anyhow::Result<bool> {
        tracing::debug!("updating relation state of subscription '{name}' to {state}");
        let response = self
            .client
            .update_subscription(UpdateSubscriptionRequest {
                name: name.to_string(),
                subscription,
            })
            .await?;
        Ok(response.acknowledged)
    }
}
