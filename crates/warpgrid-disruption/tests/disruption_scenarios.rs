//! End-to-end disruption scenarios.
//!
//! Each test drives `DisruptionController::reconcile` against a real
//! `StateStore` with a fake clock, the way a host process would between
//! requeues. Restart safety uses an on-disk store in a temp directory.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use warpgrid_disruption::policy::BoxFuture;
use warpgrid_disruption::*;
use warpgrid_metrics::{render_prometheus, TerminationMetrics, TerminationReason};
use warpgrid_state::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Backend stub whose answer can be flipped mid-test.
#[derive(Default)]
struct SwitchableCloud {
    drifted: AtomicBool,
    calls: AtomicUsize,
}

impl CloudProvider for SwitchableCloud {
    fn is_node_drifted<'a>(
        &'a self,
        _node: &'a Node,
        _provisioner: &'a ProvisionerSpec,
    ) -> BoxFuture<'a, DisruptionResult<bool>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.drifted.load(Ordering::SeqCst))
        })
    }
}

struct Cluster {
    store: StateStore,
    clock: Arc<FakeClock>,
    nominations: Arc<NominationCache>,
    cloud: Arc<SwitchableCloud>,
    metrics: Arc<TerminationMetrics>,
    controller: DisruptionController,
}

impl Cluster {
    fn new(store: StateStore, start: DateTime<Utc>) -> Self {
        let config = DisruptionConfig::default();
        let clock = Arc::new(FakeClock::new(start));
        let nominations = Arc::new(NominationCache::from_config(&config, clock.clone()).unwrap());
        let cloud = Arc::new(SwitchableCloud::default());
        let metrics = Arc::new(TerminationMetrics::new());
        let controller = DisruptionController::with_standard_policies(
            &config,
            Arc::new(store.clone()),
            clock.clone(),
            nominations.clone(),
            cloud.clone(),
            metrics.clone(),
        )
        .unwrap();
        Self {
            store,
            clock,
            nominations,
            cloud,
            metrics,
            controller,
        }
    }

    fn in_memory() -> Self {
        Self::new(StateStore::open_in_memory().unwrap(), t0())
    }

    async fn pass(&self, node: &str) -> DisruptionResult<Outcome> {
        self.controller
            .reconcile(node, &CancellationToken::new())
            .await
    }

    fn advance_to(&self, secs: i64) {
        self.clock.set(t0() + TimeDelta::seconds(secs));
    }

    fn node(&self, name: &str) -> Option<Node> {
        self.store.get_node(name).unwrap()
    }
}

fn provisioner(empty: Option<u64>, expire: Option<u64>) -> ProvisionerSpec {
    ProvisionerSpec {
        name: "default".to_string(),
        ttl_seconds_after_empty: empty,
        ttl_seconds_until_expired: expire,
    }
}

fn register_node(store: &StateStore, name: &str) {
    let mut node = Node::new(&format!("uid-{name}"), name, t0());
    node.labels
        .insert(LABEL_PROVISIONER_NAME.to_string(), "default".to_string());
    node.labels
        .insert(LABEL_NODE_INITIALIZED.to_string(), "true".to_string());
    store.put_node(&node).unwrap();
}

fn running_pod(name: &str, node: &str) -> Pod {
    Pod {
        namespace: "default".to_string(),
        name: name.to_string(),
        node_name: Some(node.to_string()),
        phase: PodPhase::Running,
        owner_references: vec![OwnerReference {
            kind: "ReplicaSet".to_string(),
            name: "web-7d9f".to_string(),
        }],
    }
}

#[tokio::test]
async fn empty_node_is_deleted_after_ttl() {
    let c = Cluster::in_memory();
    c.store.put_provisioner(&provisioner(Some(600), None)).unwrap();
    register_node(&c.store, "node-a");
    let pod = running_pod("web-1", "node-a");
    c.store.put_pod(&pod).unwrap();

    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome, Outcome::done());
    assert!(c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP).is_none());

    // Workload leaves at T0+10s.
    c.store.delete_pod(&pod.table_key()).unwrap();
    c.advance_to(10);
    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(600)));
    assert_eq!(
        c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP),
        Some("2024-01-01T00:00:10Z")
    );

    c.advance_to(609);
    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(1)));
    assert!(c.node("node-a").is_some());

    c.advance_to(610);
    let outcome = c.pass("node-a").await.unwrap();
    assert!(outcome.is_deleted());
    assert!(c.node("node-a").is_none());
    assert_eq!(c.metrics.count(TerminationReason::Emptiness), 1);
    assert!(render_prometheus(&c.metrics)
        .contains("warpgrid_nodes_terminated_total{reason=\"emptiness\"} 1"));

    // Node is gone: further passes are no-ops and do not count again.
    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome, Outcome::done());
    assert_eq!(c.metrics.count(TerminationReason::Emptiness), 1);
}

#[tokio::test]
async fn returning_workload_resets_the_countdown() {
    let c = Cluster::in_memory();
    c.store.put_provisioner(&provisioner(Some(600), None)).unwrap();
    register_node(&c.store, "node-a");

    c.pass("node-a").await.unwrap();
    assert!(c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP).is_some());

    let pod = running_pod("web-1", "node-a");
    c.store.put_pod(&pod).unwrap();
    c.advance_to(500);
    c.pass("node-a").await.unwrap();
    assert!(c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP).is_none());

    // Stays absent while the pod runs.
    c.advance_to(900);
    c.pass("node-a").await.unwrap();
    assert!(c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP).is_none());

    c.store.delete_pod(&pod.table_key()).unwrap();
    c.advance_to(1000);
    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(600)));
    assert_eq!(
        c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP),
        Some("2024-01-01T00:16:40Z")
    );

    // The old start time does not carry over.
    c.advance_to(1599);
    assert!(!c.pass("node-a").await.unwrap().is_deleted());
    c.advance_to(1600);
    assert!(c.pass("node-a").await.unwrap().is_deleted());
}

#[tokio::test]
async fn nominated_node_survives_until_claim_lapses() {
    let c = Cluster::in_memory();
    c.store.put_provisioner(&provisioner(Some(60), None)).unwrap();
    register_node(&c.store, "node-a");

    c.pass("node-a").await.unwrap();
    c.advance_to(100);
    c.nominations.nominate("node-a");

    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome, Outcome::done());
    assert!(c.node("node-a").is_some());
    // Annotation is left alone while nominated.
    assert_eq!(
        c.node("node-a").unwrap().annotation(ANNOTATION_EMPTINESS_TIMESTAMP),
        Some("2024-01-01T00:00:00Z")
    );

    c.advance_to(121);
    assert!(c.pass("node-a").await.unwrap().is_deleted());
    assert_eq!(c.metrics.count(TerminationReason::Emptiness), 1);
}

#[tokio::test]
async fn old_node_is_deleted_at_expiry() {
    let c = Cluster::in_memory();
    c.store.put_provisioner(&provisioner(None, Some(3600))).unwrap();
    register_node(&c.store, "node-a");
    c.store.put_pod(&running_pod("web-1", "node-a")).unwrap();

    c.advance_to(3599);
    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome, Outcome::requeue(Duration::from_secs(1)));
    assert!(c.node("node-a").is_some());

    c.advance_to(3601);
    let outcome = c.pass("node-a").await.unwrap();
    assert!(outcome.is_deleted());
    assert_eq!(outcome.requeue_after, Some(Duration::ZERO));
    assert!(c.node("node-a").is_none());
    assert_eq!(c.metrics.count(TerminationReason::Expiration), 1);
}

#[tokio::test]
async fn drift_mark_is_never_removed() {
    let c = Cluster::in_memory();
    c.store.put_provisioner(&provisioner(None, None)).unwrap();
    register_node(&c.store, "node-a");
    register_node(&c.store, "node-b");
    let mut node = c.node("node-a").unwrap();
    node.annotations
        .insert(ANNOTATION_IMAGE_ID.to_string(), "img-2024-01".to_string());
    c.store.put_node(&node).unwrap();

    c.pass("node-a").await.unwrap();
    assert!(c.node("node-a").unwrap().annotation(ANNOTATION_DRIFTED).is_none());

    c.cloud.drifted.store(true, Ordering::SeqCst);
    c.pass("node-a").await.unwrap();
    assert_eq!(c.node("node-a").unwrap().annotation(ANNOTATION_DRIFTED), Some("true"));

    c.cloud.drifted.store(false, Ordering::SeqCst);
    c.pass("node-a").await.unwrap();
    assert_eq!(c.node("node-a").unwrap().annotation(ANNOTATION_DRIFTED), Some("true"));

    // node-b has no image marker: the backend is never asked about it.
    let before = c.cloud.calls.load(Ordering::SeqCst);
    c.cloud.drifted.store(true, Ordering::SeqCst);
    c.pass("node-b").await.unwrap();
    assert_eq!(c.cloud.calls.load(Ordering::SeqCst), before);
    assert!(c.node("node-b").unwrap().annotation(ANNOTATION_DRIFTED).is_none());
}

#[tokio::test]
async fn countdown_survives_controller_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.redb");

    {
        let c = Cluster::new(StateStore::open(&path).unwrap(), t0());
        c.store.put_provisioner(&provisioner(Some(600), None)).unwrap();
        register_node(&c.store, "node-a");
        c.advance_to(10);
        c.pass("node-a").await.unwrap();
    }

    // A fresh process with no memory of the first one.
    let c = Cluster::new(StateStore::open(&path).unwrap(), t0() + TimeDelta::seconds(300));
    let outcome = c.pass("node-a").await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(310)));

    c.advance_to(610);
    assert!(c.pass("node-a").await.unwrap().is_deleted());
    assert!(c.node("node-a").is_none());
}

/// Client that lets another writer touch the node right after every read.
struct RacingClient {
    inner: StateStore,
}

impl NodeClient for RacingClient {
    fn get_node<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DisruptionResult<Option<Node>>> {
        Box::pin(async move {
            let node = self.inner.get_node(name)?;
            if let Some(n) = &node {
                self.inner.update_node(n)?;
            }
            Ok(node)
        })
    }

    fn list_nodes(&self) -> BoxFuture<'_, DisruptionResult<Vec<Node>>> {
        NodeClient::list_nodes(&self.inner)
    }

    fn get_provisioner<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, DisruptionResult<Option<ProvisionerSpec>>> {
        NodeClient::get_provisioner(&self.inner, name)
    }

    fn list_pods_for_node<'a>(
        &'a self,
        node_name: &'a str,
    ) -> BoxFuture<'a, DisruptionResult<Vec<Pod>>> {
        NodeClient::list_pods_for_node(&self.inner, node_name)
    }

    fn update_node<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, DisruptionResult<Node>> {
        NodeClient::update_node(&self.inner, node)
    }

    fn delete_node<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DisruptionResult<bool>> {
        NodeClient::delete_node(&self.inner, name)
    }
}

#[tokio::test]
async fn concurrent_write_is_not_overwritten() {
    let store = StateStore::open_in_memory().unwrap();
    store.put_provisioner(&provisioner(Some(600), None)).unwrap();
    register_node(&store, "node-a");
    let clock = Arc::new(FakeClock::new(t0()));
    let policies: Vec<Arc<dyn Policy>> = vec![Arc::new(Emptiness::new(
        Arc::new(store.clone()),
        clock.clone(),
        Arc::new(NominationCache::new(clock, Duration::from_secs(20))),
        Arc::new(TerminationMetrics::new()),
    ))];
    let controller = DisruptionController::new(
        &DisruptionConfig::default(),
        Arc::new(RacingClient {
            inner: store.clone(),
        }),
        policies,
    )
    .unwrap();

    let err = controller
        .reconcile("node-a", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DisruptionError::State(StateError::Conflict { .. })
    ));
    assert!(err.is_retryable());
    // The stamp was not written over the other writer's version.
    let stored = store.get_node("node-a").unwrap().unwrap();
    assert_eq!(stored.resource_version, 1);
    assert!(stored.annotation(ANNOTATION_EMPTINESS_TIMESTAMP).is_none());
}

#[tokio::test]
async fn policy_error_outranks_failed_write() {
    let store = StateStore::open_in_memory().unwrap();
    store.put_provisioner(&provisioner(Some(600), None)).unwrap();
    let mut node = Node::new("uid-a", "node-a", t0());
    node.labels
        .insert(LABEL_PROVISIONER_NAME.to_string(), "default".to_string());
    node.labels
        .insert(LABEL_NODE_INITIALIZED.to_string(), "true".to_string());
    node.annotations
        .insert(ANNOTATION_EMPTINESS_TIMESTAMP.to_string(), "garbage".to_string());
    node.annotations
        .insert(ANNOTATION_IMAGE_ID.to_string(), "img-1".to_string());
    store.put_node(&node).unwrap();

    let cloud = Arc::new(SwitchableCloud::default());
    cloud.drifted.store(true, Ordering::SeqCst);
    let clock = Arc::new(FakeClock::new(t0()));
    let controller = DisruptionController::with_standard_policies(
        &DisruptionConfig::default(),
        Arc::new(RacingClient {
            inner: store.clone(),
        }),
        clock.clone(),
        Arc::new(NominationCache::new(clock, Duration::from_secs(20))),
        cloud,
        Arc::new(TerminationMetrics::new()),
    )
    .unwrap();

    // Emptiness trips on the stamp, drift marks the node, and the write of
    // that mark loses the race. The caller hears about the stamp.
    let err = controller
        .reconcile("node-a", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DisruptionError::InvalidTimestamp { .. }));
    assert!(!err.is_retryable());
    let stored = store.get_node("node-a").unwrap().unwrap();
    assert!(stored.annotation(ANNOTATION_DRIFTED).is_none());
}

#[test]
fn reporter_rate_limits_per_node() {
    let clock = Arc::new(FakeClock::new(t0()));
    let recorder = Arc::new(BufferedRecorder::new());
    let reporter =
        Reporter::from_config(&DisruptionConfig::default(), recorder.clone(), clock.clone()).unwrap();
    let node = Node::new("uid-a", "node-a", t0());
    let other = Node::new("uid-b", "node-b", t0());

    assert!(reporter.record_unconsolidatable_reason(&node, "pdb prevents eviction"));
    clock.step(TimeDelta::seconds(30));
    assert!(!reporter.record_unconsolidatable_reason(&node, "pdb prevents eviction"));
    assert_eq!(recorder.events().len(), 1);

    // Separate nodes have separate windows.
    assert!(reporter.record_unconsolidatable_reason(&other, "in use"));

    clock.step(TimeDelta::minutes(15));
    assert!(reporter.record_unconsolidatable_reason(&node, "pdb prevents eviction"));

    let events: Vec<Event> = recorder
        .drain()
        .into_iter()
        .filter(|e| e.node_uid == "uid-a")
        .collect();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.reason == "Unconsolidatable"));
    assert_eq!(events[0].message, "pdb prevents eviction");
}
