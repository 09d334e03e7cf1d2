//! Integration tests for steward-engine.
//!
//! Drives the full loop against the mock cluster backend: apply a spec,
//! observe, reconcile, and assert the cluster converges. Rollout clocks are
//! steered by passing synthetic times into `reconcile_at`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use steward_cluster::mock::MockCluster;
use steward_cluster::ClusterApi;
use steward_cluster::HealthState;
use steward_core::{DeploymentSpec, HealthCheckSpec, RolloutPolicy};
use steward_engine::test_utils::create_test_db;
use steward_engine::{
    ActionExecutor, ClusterObserver, DeploymentFilters, DeploymentStore, Reconciler, RetryPolicy,
    RolloutPhase,
};

struct Harness {
    store: DeploymentStore,
    cluster: Arc<MockCluster>,
    observer: ClusterObserver,
    reconciler: Reconciler,
}

async fn harness() -> Harness {
    let pool = create_test_db().await;
    let store = DeploymentStore::new(pool);
    let cluster = Arc::new(MockCluster::new());
    let observer = ClusterObserver::new(cluster.clone());

    let executor = ActionExecutor::new(cluster.clone(), store.clone()).with_retry(RetryPolicy {
        max_attempts: 2,
        base_delay: StdDuration::from_millis(1),
        max_delay: StdDuration::from_millis(2),
    });

    // Tests jump the reconcile clock forward, so never call a snapshot stale.
    let reconciler = Reconciler::new(store.clone(), observer.handle(), executor)
        .with_max_snapshot_age(Duration::days(365));

    Harness {
        store,
        cluster,
        observer,
        reconciler,
    }
}

/// A spec whose rollout gates pass as soon as instances look healthy.
fn fast_spec(app: &str, image: &str, replicas: u32) -> DeploymentSpec {
    DeploymentSpec {
        app: app.to_string(),
        image: image.to_string(),
        replicas,
        health_check: HealthCheckSpec::default(),
        rollout: RolloutPolicy {
            canary_replicas: 1,
            observe_secs: 0,
            healthy_fraction: 1.0,
            timeout_secs: 3600,
        },
    }
}

impl Harness {
    /// Poll-then-reconcile until nothing changes, bounded.
    async fn settle(&mut self, now: DateTime<Utc>, rounds: usize) {
        for _ in 0..rounds {
            self.observer.poll_once().await.expect("poll should work");
            self.reconciler
                .reconcile_at(now)
                .await
                .expect("reconcile should work");
        }
    }
}

#[tokio::test]
async fn scales_up_to_desired_and_holds() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 2), "alice")
        .await
        .expect("apply should work");

    h.settle(now, 4).await;

    assert_eq!(h.cluster.instance_count("shop"), 2);

    // Steady state plans nothing new: exactly the two start actions exist.
    let actions = h.store.list_actions(Some("shop"), 50).await.unwrap();
    assert_eq!(actions.len(), 2);
    assert!(h.store.active_rollout("shop").await.unwrap().is_none());
}

#[tokio::test]
async fn image_change_rolls_out_to_completion() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 2), "alice")
        .await
        .unwrap();
    h.settle(now, 4).await;
    assert_eq!(h.cluster.instance_count("shop"), 2);

    h.store
        .apply(fast_spec("shop", "shop:2", 2), "alice")
        .await
        .unwrap();
    h.settle(now, 14).await;

    let images = h.cluster.images_of("shop");
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(|i| i == "shop:2"));

    let rollouts = h.store.list_rollouts(Some("shop"), 10).await.unwrap();
    assert_eq!(rollouts.len(), 1);
    assert_eq!(rollouts[0].phase, RolloutPhase::Completed);
    assert_eq!(rollouts[0].from_image, "shop:1");
    assert_eq!(rollouts[0].to_image, "shop:2");
    assert!(rollouts[0].finished_at.is_some());
}

#[tokio::test]
async fn unhealthy_canary_times_out_and_rolls_back() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 2), "alice")
        .await
        .unwrap();
    h.settle(now, 4).await;

    // Every new instance from here on reports unhealthy.
    h.cluster.set_spawn_health(HealthState::Unhealthy);

    let mut spec = fast_spec("shop", "shop:2", 2);
    spec.rollout.timeout_secs = 5;
    h.store.apply(spec, "alice").await.unwrap();

    // Begin the rollout and start the canary; the gate never opens.
    h.settle(now, 4).await;
    assert!(h
        .cluster
        .images_of("shop")
        .iter()
        .any(|i| i == "shop:2"));

    // Jump past the phase deadline: revert, drain, finish.
    h.cluster.set_spawn_health(HealthState::Healthy);
    h.settle(now + Duration::seconds(10), 6).await;

    let deployment = h.store.get("shop").await.unwrap();
    assert_eq!(deployment.image, "shop:1");
    assert_eq!(deployment.applied_by, "steward");
    assert_eq!(deployment.revision, 3);

    let images = h.cluster.images_of("shop");
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(|i| i == "shop:1"));

    let rollouts = h.store.list_rollouts(Some("shop"), 10).await.unwrap();
    assert_eq!(rollouts.len(), 1);
    assert_eq!(rollouts[0].phase, RolloutPhase::RolledBack);
}

#[tokio::test]
async fn newer_apply_supersedes_running_rollout() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 2), "alice")
        .await
        .unwrap();
    h.settle(now, 4).await;

    h.store
        .apply(fast_spec("shop", "shop:2", 2), "alice")
        .await
        .unwrap();
    // Just far enough to open a rollout toward shop:2.
    h.settle(now, 2).await;
    assert!(h.store.active_rollout("shop").await.unwrap().is_some());

    h.store
        .apply(fast_spec("shop", "shop:3", 2), "alice")
        .await
        .unwrap();
    h.settle(now, 16).await;

    let images = h.cluster.images_of("shop");
    assert!(images.iter().all(|i| i == "shop:3"));

    let rollouts = h.store.list_rollouts(Some("shop"), 10).await.unwrap();
    let failed = rollouts
        .iter()
        .filter(|r| r.phase == RolloutPhase::Failed)
        .count();
    let completed: Vec<_> = rollouts
        .iter()
        .filter(|r| r.phase == RolloutPhase::Completed)
        .collect();
    assert_eq!(failed, 1);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].to_image, "shop:3");
}

#[tokio::test]
async fn paused_deployment_is_left_alone() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 1), "alice")
        .await
        .unwrap();
    h.settle(now, 3).await;
    assert_eq!(h.cluster.instance_count("shop"), 1);

    h.store.set_paused("shop", true).await.unwrap();

    // Kill the only instance behind the orchestrator's back.
    let id = h.cluster.list_instances().await.unwrap()[0].id.clone();
    h.cluster.stop_instance(&id).await.unwrap();

    h.settle(now, 3).await;
    assert_eq!(h.cluster.instance_count("shop"), 0);

    h.store.set_paused("shop", false).await.unwrap();
    h.settle(now, 3).await;
    assert_eq!(h.cluster.instance_count("shop"), 1);
}

#[tokio::test]
async fn scale_to_zero_drains_the_app() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 3), "alice")
        .await
        .unwrap();
    h.settle(now, 4).await;
    assert_eq!(h.cluster.instance_count("shop"), 3);

    h.store
        .apply(fast_spec("shop", "shop:1", 0), "alice")
        .await
        .unwrap();
    h.settle(now, 4).await;
    assert_eq!(h.cluster.instance_count("shop"), 0);
}

#[tokio::test]
async fn reapplying_identical_spec_is_a_noop() {
    let h = harness().await;

    let first = h
        .store
        .apply(fast_spec("shop", "shop:1", 2), "alice")
        .await
        .unwrap();
    let second = h
        .store
        .apply(fast_spec("shop", "shop:1", 2), "bob")
        .await
        .unwrap();

    assert_eq!(first.revision, 1);
    assert_eq!(second.revision, 1);
    // The original applier stands; nothing was written.
    assert_eq!(second.applied_by, "alice");
}

#[tokio::test]
async fn previous_image_tracks_the_rollback_target() {
    let h = harness().await;

    h.store
        .apply(fast_spec("shop", "shop:1", 2), "alice")
        .await
        .unwrap();
    assert!(h.store.previous_image("shop").await.unwrap().is_none());

    h.store
        .apply(fast_spec("shop", "shop:2", 2), "alice")
        .await
        .unwrap();
    let previous = h.store.previous_image("shop").await.unwrap().unwrap();
    assert_eq!(previous.image, "shop:1");

    // Replica-only changes must not disturb the rollback target.
    h.store
        .apply(fast_spec("shop", "shop:2", 4), "alice")
        .await
        .unwrap();
    let previous = h.store.previous_image("shop").await.unwrap().unwrap();
    assert_eq!(previous.image, "shop:1");
}

#[tokio::test]
async fn delete_cascades_history() {
    let mut h = harness().await;
    let now = Utc::now();

    h.store
        .apply(fast_spec("shop", "shop:1", 1), "alice")
        .await
        .unwrap();
    h.settle(now, 3).await;
    assert!(!h.store.list_actions(Some("shop"), 10).await.unwrap().is_empty());

    h.store.delete("shop").await.unwrap();

    assert!(h.store.get("shop").await.is_err());
    assert!(h.store.list_actions(Some("shop"), 10).await.unwrap().is_empty());
    assert!(h.store.list_rollouts(Some("shop"), 10).await.unwrap().is_empty());

    let all = h.store.list(DeploymentFilters::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn invalid_specs_are_rejected_before_any_write() {
    let h = harness().await;

    let mut bad = fast_spec("Shop", "shop:1", 1);
    assert!(h.store.apply(bad.clone(), "alice").await.is_err());

    bad.app = "shop".to_string();
    bad.image = "shop".to_string(); // missing tag
    assert!(h.store.apply(bad, "alice").await.is_err());

    assert!(h.store.list(DeploymentFilters::default()).await.unwrap().is_empty());
}
