//! Master-only reconciliation of publisher metadata into subscriptions.
//!
//! One cooperative task per tracked subscription polls the publisher for the
//! current publication state and reconciles it locally: newly published
//! relations get an initial restore, relations dropped from a publication
//! are marked failed (never auto-dropped, preserving operator agency), and
//! connect or request failures are recorded in the subscription state. A
//! tick runs to completion before the next sleep, so ticks for the same
//! subscription never overlap.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::cluster::ClusterService;
use crate::core::ReplicationSettings;
use crate::metadata::{RelationName, RelationState, Subscription};
use crate::remote::RemoteClusters;
use crate::rpc::{PublicationsStateRequest, PublicationsStateResponse};

use super::restore::RestoreCoordinator;
use super::state_machine::SubscriptionStateMachine;
use super::store::SubscriptionStore;

/// Failure reason recorded when the publisher cannot be reached.
pub const REASON_CONNECT_FAILED: &str = "Failed to connect to the remote cluster";

/// Failure reason recorded when the publisher rejected the state request.
pub const REASON_PUBLICATIONS_STATE_FAILED: &str = "Failed to request the publications state";

/// Failure reason recorded for relations that left the publication.
pub const REASON_RELATION_UNPUBLISHED: &str =
    "Relation is no longer part of the subscribed publications";

/// Timing seam of the poll loop.
///
/// The loop parks between ticks and accounts for how long each tick took;
/// injecting the seam lets tests drive the cadence without touching the
/// reconciliation logic.
pub trait PollClock: Clone + Send + Sync + 'static {
    /// Park the task until the next tick is due.
    fn next_tick(&self, interval: Duration) -> tokio::time::Sleep;
    /// Stopwatch start for tick-duration accounting.
    fn tick_started(&self) -> Instant;
    /// Time spent since `started`.
    fn tick_elapsed(&self, started: Instant) -> Duration;
}

/// Poll clock backed by the runtime.
#[derive(Clone, Default)]
pub struct RuntimePollClock;

impl PollClock for RuntimePollClock {
    fn next_tick(&self, interval: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(interval)
    }

    fn tick_started(&self) -> Instant {
        Instant::now()
    }

    fn tick_elapsed(&self, started: Instant) -> Duration {
        started.elapsed()
    }
}

#[derive(Default)]
struct TrackerInner {
    active: bool,
    tracked: BTreeSet<String>,
    tasks: HashMap<String, JoinHandle<()>>,
}

/// Periodic publisher poller, gated on master election.
pub struct MetadataTracker<C: PollClock = RuntimePollClock> {
    settings: ReplicationSettings,
    clock: C,
    cluster: Arc<ClusterService>,
    store: Arc<SubscriptionStore>,
    registry: Arc<RemoteClusters>,
    state_machine: Arc<SubscriptionStateMachine>,
    coordinator: Arc<RestoreCoordinator>,
    inner: Mutex<TrackerInner>,
}

impl<C: PollClock> MetadataTracker<C> {
    pub fn new(
        settings: ReplicationSettings,
        clock: C,
        cluster: Arc<ClusterService>,
        store: Arc<SubscriptionStore>,
        registry: Arc<RemoteClusters>,
        state_machine: Arc<SubscriptionStateMachine>,
        coordinator: Arc<RestoreCoordinator>,
    ) -> Self {
        Self {
            settings,
            clock,
            cluster,
            store,
            registry,
            state_machine,
            coordinator,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    /// Start ticking for every tracked subscription. Idempotent; a no-op
    /// unless the local node is the elected master.
    pub fn maybe_start(self: &Arc<Self>) {
        if !self.cluster.is_local_node_elected_master() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.active {
            return;
        }
        inner.active = true;
        let tracked: Vec<String> = inner.tracked.iter().cloned().collect();
        for name in tracked {
            self.spawn_task(&mut inner, name);
        }
        tracing::debug!("metadata tracker started with {} subscription(s)", inner.tasks.len());
    }

    /// Register interest in a subscription; its task starts immediately when
    /// the tracker is active.
    pub fn start_tracking(self: &Arc<Self>, name: &str) {
        let mut inner = self.inner.lock();
        inner.tracked.insert(name.to_string());
        if inner.active && !inner.tasks.contains_key(name) {
            self.spawn_task(&mut inner, name.to_string());
        }
    }

    /// Deregister interest and stop the subscription's task.
    pub fn stop_tracking(&self, name: &str) {
        let mut inner = self.inner.lock();
        inner.tracked.remove(name);
        if let Some(task) = inner.tasks.remove(name) {
            task.abort();
        }
    }

    /// Stop all tracking. Idempotent and safe to call when not master; a
    /// tick in flight finishes, its side effects are permitted.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.active = false;
        for (_, task) in inner.tasks.drain() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn is_tracking(&self, name: &str) -> bool {
        self.inner.lock().tasks.contains_key(name)
    }

    fn spawn_task(self: &Arc<Self>, inner: &mut TrackerInner, name: String) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("no async runtime available; not tracking subscription '{name}'");
            return;
        }
        let tracker = Arc::clone(self);
        let subscription_name = name.clone();
        let handle = tokio::spawn(async move {
            let interval = tracker.settings.tracker_poll_interval();
            loop {
                tracker.clock.next_tick(interval).await;
                let started = tracker.clock.tick_started();
                tracker.tick(&subscription_name).await;
                tracing::trace!(
                    "metadata tick for '{subscription_name}' took {:?}",
                    tracker.clock.tick_elapsed(started)
                );
            }
        });
        inner.tasks.insert(name, handle);
    }

    async fn tick(&self, name: &str) {
        let Some(subscription) = self.store.get(name) else {
            tracing::debug!("subscription '{name}' vanished from the cluster state, skipping tick");
            return;
        };

        // Idempotent for an unchanged connection info; re-dials after an
        // ALTER SUBSCRIPTION changed the publisher address.
        let client = match self
            .registry
            .connect(name, &subscription.connection_info)
            .await
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    "metadata tick could not reach the publisher of subscription '{name}': {err}"
                );
                self.fail_subscription(name, REASON_CONNECT_FAILED).await;
                return;
            }
        };

        let request = PublicationsStateRequest {
            publications: subscription.publications.clone(),
            user: subscription
                .connection_info
                .user()
                .unwrap_or_default()
                .to_string(),
        };
        let response = match client.publications_state(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    "publications state request of subscription '{name}' failed: {err}"
                );
                self.fail_subscription(name, REASON_PUBLICATIONS_STATE_FAILED)
                    .await;
                return;
            }
        };

        self.reconcile(name, &subscription, &response).await;
    }

    /// Compare the publisher's relation set against the local subscription.
    async fn reconcile(
        &self,
        name: &str,
        subscription: &Subscription,
        response: &PublicationsStateResponse,
    ) {
        let published = response.relation_names();

        let missing: BTreeSet<RelationName> = published
            .iter()
            .filter(|relation| !subscription.relations.contains_key(*relation))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let indices = response.indices_for(&missing);
            let templates = response.templates_for(&missing);
            tracing::info!(
                "subscription '{name}' gained {} newly published relation(s)",
                missing.len()
            );
            let relations: Vec<RelationName> = missing.into_iter().collect();
            if let Err(err) = self
                .coordinator
                .restore(
                    name,
                    BTreeMap::new(),
                    relations,
                    indices,
                    templates,
                )
                .await
            {
                tracing::warn!(
                    "restore of newly published relations of subscription '{name}' failed: {err:#}"
                );
            }
        }

        let unpublished: Vec<RelationName> = subscription
            .relations
            .iter()
            .filter(|&(relation, state)| !published.contains(relation) && !state.is_failed())
            .map(|(relation, _)| relation.clone())
            .collect();
        if !unpublished.is_empty() {
            for relation in &unpublished {
                tracing::warn!(
                    "relation '{relation}' left the publications of subscription '{name}'"
                );
            }
            if let Err(err) = self
                .state_machine
                .update(
                    name,
                    &unpublished,
                    RelationState::failed(REASON_RELATION_UNPUBLISHED),
                )
                .await
            {
                tracing::warn!(
                    "failed to mark unpublished relations of subscription '{name}': {err:#}"
                );
            }
        }
    }

    async fn fail_subscription(&self, name: &str, reason: &str) {
        if let Err(err) = self
            .state_machine
            .update_all(name, RelationState::failed(reason))
            .await
        {
            tracing::warn!("failed to mark subscription '{name}' as failed: {err:#}");
        }
    }
}
