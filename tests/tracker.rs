//! Metadata-tracker reconciliation: master gating, newly published
//! relations, unpublished relations, and failure reasons.

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lodestone::cluster::ClusterService;
use lodestone::replication::RuntimePollClock;
use lodestone::metadata::RelationState;
use lodestone::replication::tracker::{
    REASON_CONNECT_FAILED, REASON_PUBLICATIONS_STATE_FAILED, REASON_RELATION_UNPUBLISHED,
};
use lodestone::replication::LogicalReplicationService;

struct Fixture {
    cluster: Arc<ClusterService>,
    service: Arc<LogicalReplicationService>,
    factory: Arc<StubConnectionFactory>,
    updates: Arc<RecordingUpdateClient>,
    restores: Arc<ScriptedRestoreService>,
}

impl Fixture {
    fn new() -> Self {
        let cluster = Arc::new(ClusterService::default());
        let factory = Arc::new(StubConnectionFactory::default());
        let updates = Arc::new(RecordingUpdateClient::default());
        let restores = Arc::new(ScriptedRestoreService::default());
        let repositories = Arc::new(RecordingRepositories::default());
        let service = LogicalReplicationService::new(
            test_settings(),
            RuntimePollClock,
            cluster.clone(),
            factory.clone(),
            updates.clone(),
            restores.clone(),
        );
        service.set_repositories_service(repositories);
        Self {
            cluster,
            service,
            factory,
            updates,
            restores,
        }
    }

    /// Add `sub1` with the given synchronized relations while `master` is
    /// elected.
    fn add_subscription(&self, master: &str, synchronized: &[&str]) {
        let mut sub = subscription("alice", "crate://pub?user=alice", &["p1"]);
        for name in synchronized {
            sub = sub.with_relation(relation(name), RelationState::Synchronized);
        }
        self.cluster.apply_state(
            ClusterStateBuilder::new(1)
                .master(master)
                .subscriptions(metadata_with("sub1", sub))
                .build(),
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn no_tick_runs_while_not_master() {
    let fixture = Fixture::new();
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.add_subscription("n2", &["doc.t1"]);

    let factory = fixture.factory.clone();
    wait_for("publisher connect", move || {
        factory.connects.load(Ordering::SeqCst) > 0
    })
    .await;
    // several poll intervals worth of silence
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fixture.factory.client.request_count(), 0);
    assert!(!fixture.service.is_tracker_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn ticks_poll_the_publisher_on_the_master() {
    let fixture = Fixture::new();
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.add_subscription("n1", &["doc.t1"]);

    let client = fixture.factory.client.clone();
    wait_for("publication state polls", move || client.request_count() >= 2).await;
    // a settled subscription triggers no state traffic
    assert_eq!(fixture.updates.request_count(), 0);
    assert_eq!(fixture.restores.request_count(), 0);
    // the configured user travels with every poll
    assert_eq!(
        fixture.factory.client.requests.lock().first().unwrap().user,
        "alice"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn newly_published_relations_are_restored() {
    let fixture = Fixture::new();
    fixture
        .factory
        .client
        .set_response(publications_response(&["doc.t1", "doc.t2"]));
    fixture.add_subscription("n1", &["doc.t1"]);

    let updates = fixture.updates.clone();
    wait_for("doc.t2 to synchronize", move || {
        let states = updates.states_of(&relation("doc.t2"));
        states.len() >= 2
            && states[0] == RelationState::Restoring
            && states[1] == RelationState::Synchronized
    })
    .await;

    // scoped restore: only the new relation's physical names are requested
    let requests = fixture.restores.requests.lock();
    assert!(!requests.is_empty());
    assert_eq!(requests[0].indices, vec!["doc.t2".to_string()]);

    // the synchronized relation was never disturbed (state monotonicity)
    for request in fixture.updates.requests.lock().iter() {
        assert_eq!(
            request.subscription.relations.get(&relation("doc.t1")),
            Some(&RelationState::Synchronized)
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unpublished_relations_are_failed_not_dropped() {
    let fixture = Fixture::new();
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.add_subscription("n1", &["doc.t1", "doc.t2"]);

    let updates = fixture.updates.clone();
    wait_for("doc.t2 to be marked failed", move || {
        updates
            .states_of(&relation("doc.t2"))
            .last()
            .map(|state| state.failure_reason() == Some(REASON_RELATION_UNPUBLISHED))
            .unwrap_or(false)
    })
    .await;

    // the subscription itself survives; nothing was dropped
    assert!(fixture.service.subscriptions().contains("sub1"));
    let requests = fixture.updates.requests.lock();
    let last = requests.last().unwrap();
    assert!(last.subscription.relations.contains_key(&relation("doc.t2")));
    assert_eq!(
        last.subscription.relations.get(&relation("doc.t1")),
        Some(&RelationState::Synchronized)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_publisher_fails_the_subscription() {
    let fixture = Fixture::new();
    fixture.factory.fail_connects.store(true, Ordering::SeqCst);
    fixture.add_subscription("n1", &["doc.t1"]);

    // the supervisor's connect failed, so tracking never started
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!fixture.service.is_tracking("sub1"));
    assert_eq!(fixture.factory.client.request_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_publisher_connection_records_the_connect_reason() {
    let fixture = Fixture::new();
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.add_subscription("n1", &["doc.t1"]);

    let client = fixture.factory.client.clone();
    wait_for("ticking to begin", move || client.request_count() >= 1).await;

    // sever the pooled handle and refuse re-dials
    fixture.factory.fail_connects.store(true, Ordering::SeqCst);
    fixture.cluster.apply_state(
        ClusterStateBuilder::new(2)
            .master("n1")
            .subscriptions(metadata_with(
                "sub1",
                subscription("alice", "crate://pub-moved?user=alice", &["p1"])
                    .with_relation(relation("doc.t1"), RelationState::Synchronized),
            ))
            .build(),
    );

    let updates = fixture.updates.clone();
    wait_for("the connect failure to be recorded", move || {
        updates
            .states_of(&relation("doc.t1"))
            .last()
            .map(|state| state.failure_reason() == Some(REASON_CONNECT_FAILED))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_state_request_records_the_request_reason() {
    let fixture = Fixture::new();
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.factory.client.fail_requests.store(true, Ordering::SeqCst);
    fixture.add_subscription("n1", &["doc.t1"]);

    let updates = fixture.updates.clone();
    wait_for("the request failure to be recorded", move || {
        updates
            .states_of(&relation("doc.t1"))
            .last()
            .map(|state| state.failure_reason() == Some(REASON_PUBLICATIONS_STATE_FAILED))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_state_updates_are_logged_and_the_loop_keeps_ticking() {
    let fixture = Fixture::new();
    // the publisher dropped doc.t2, so every tick tries to mark it failed
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.updates.fail.store(true, Ordering::SeqCst);
    fixture.add_subscription("n1", &["doc.t1", "doc.t2"]);

    // the update RPC keeps erroring, yet polling continues across ticks
    let client = fixture.factory.client.clone();
    wait_for("polling to survive failed updates", move || {
        client.request_count() >= 3
    })
    .await;
    // nothing was recorded at the master, the relation map is untouched
    assert_eq!(fixture.updates.request_count(), 0);
    let subscriptions = fixture.service.subscriptions();
    assert_eq!(
        subscriptions.get("sub1").unwrap().relations.get(&relation("doc.t2")),
        Some(&RelationState::Synchronized)
    );

    // once the update pipeline recovers the next tick records the failure
    fixture.updates.fail.store(false, Ordering::SeqCst);
    let updates = fixture.updates.clone();
    wait_for("the unpublished relation to be recorded", move || {
        updates
            .states_of(&relation("doc.t2"))
            .last()
            .map(|state| state.failure_reason() == Some(REASON_RELATION_UNPUBLISHED))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn removed_subscription_stops_its_task() {
    let fixture = Fixture::new();
    fixture.factory.client.set_response(publications_response(&["doc.t1"]));
    fixture.add_subscription("n1", &["doc.t1"]);

    let service = fixture.service.clone();
    wait_for("tracking to start", move || service.is_tracking("sub1")).await;

    fixture.cluster.apply_state(
        ClusterStateBuilder::new(2)
            .master("n1")
            .subscriptions(lodestone::metadata::SubscriptionsMetadata::default())
            .build(),
    );
    assert!(!fixture.service.is_tracking("sub1"));
}
