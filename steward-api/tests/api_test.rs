//! HTTP API tests for steward-api.
//!
//! Uses axum-test against an app wired to an in-memory database and the
//! mock cluster backend; no network or real cluster involved.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use steward_api::create_app;
use steward_cluster::mock::MockCluster;
use steward_cluster::ClusterApi;
use steward_engine::test_utils::create_test_db;
use steward_engine::{ClusterObserver, Deployment, DeploymentStore};

struct TestSetup {
    server: TestServer,
    store: DeploymentStore,
    cluster: Arc<MockCluster>,
    observer: ClusterObserver,
}

async fn setup() -> TestSetup {
    let pool = create_test_db().await;
    let store = DeploymentStore::new(pool);
    let cluster = Arc::new(MockCluster::new());
    let observer = ClusterObserver::new(cluster.clone());

    let app = create_app(store.clone(), observer.handle());
    let server = TestServer::new(app).expect("Failed to create test server");

    TestSetup {
        server,
        store,
        cluster,
        observer,
    }
}

fn user() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user"),
        HeaderValue::from_static("alice"),
    )
}

fn spec_json(app: &str, image: &str, replicas: u32) -> Value {
    json!({
        "app": app,
        "image": image,
        "replicas": replicas,
    })
}

#[tokio::test]
async fn health_works_without_identity() {
    let t = setup().await;

    let response = t.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "steward-api");
}

#[tokio::test]
async fn readiness_waits_for_first_snapshot() {
    let t = setup().await;

    let response = t.server.get("/health/ready").await;
    let body: Value = response.json();
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["observer"], "waiting");

    t.observer.poll_once().await.expect("poll should work");

    let response = t.server.get("/health/ready").await;
    let body: Value = response.json();
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn mutating_routes_require_identity() {
    let t = setup().await;

    let response = t
        .server
        .put("/api/v1/deployments")
        .json(&spec_json("shop", "shop:1", 2))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn apply_get_list_roundtrip() {
    let t = setup().await;
    let (name, value) = user();

    let response = t
        .server
        .put("/api/v1/deployments")
        .add_header(name.clone(), value.clone())
        .json(&spec_json("shop", "registry.local/shop:1.0", 2))
        .await;
    response.assert_status_ok();

    let deployment: Deployment = response.json();
    assert_eq!(deployment.app, "shop");
    assert_eq!(deployment.replicas, 2);
    assert_eq!(deployment.revision, 1);
    assert_eq!(deployment.applied_by, "alice");
    // Spec defaults are filled in server-side.
    assert_eq!(deployment.health_check.path, "/health");

    let response = t
        .server
        .get("/api/v1/deployments/shop")
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();

    let response = t
        .server
        .get("/api/v1/deployments")
        .add_header(name, value)
        .await;
    let listed: Vec<Deployment> = response.json();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn invalid_spec_is_a_bad_request() {
    let t = setup().await;
    let (name, value) = user();

    let response = t
        .server
        .put("/api/v1/deployments")
        .add_header(name, value)
        .json(&spec_json("shop", "no-tag-image", 2))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap_or_default().contains("tag"));
}

#[tokio::test]
async fn status_reports_observed_instances() {
    let t = setup().await;
    let (name, value) = user();

    t.server
        .put("/api/v1/deployments")
        .add_header(name.clone(), value.clone())
        .json(&spec_json("shop", "shop:1", 2))
        .await
        .assert_status_ok();

    // Cluster catches up out-of-band, then the observer sees it.
    t.cluster.start_instance("shop", "shop:1").await.unwrap();
    t.cluster.start_instance("shop", "shop:1").await.unwrap();
    t.observer.poll_once().await.unwrap();

    let response = t
        .server
        .get("/api/v1/deployments/shop/status")
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    let status: Value = response.json();
    assert_eq!(status["running"], 2);
    assert_eq!(status["healthy"], 2);
    assert_eq!(status["ready"], true);
    assert!(status["observed_at"].is_string());
    assert!(status["rollout"].is_null());
}

#[tokio::test]
async fn rollback_reapplies_the_previous_image() {
    let t = setup().await;
    let (name, value) = user();

    // No history yet: nothing to roll back to.
    t.server
        .put("/api/v1/deployments")
        .add_header(name.clone(), value.clone())
        .json(&spec_json("shop", "shop:1", 2))
        .await
        .assert_status_ok();

    let response = t
        .server
        .post("/api/v1/deployments/shop/rollback")
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    t.server
        .put("/api/v1/deployments")
        .add_header(name.clone(), value.clone())
        .json(&spec_json("shop", "shop:2", 2))
        .await
        .assert_status_ok();

    let response = t
        .server
        .post("/api/v1/deployments/shop/rollback")
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    let deployment: Deployment = response.json();
    assert_eq!(deployment.image, "shop:1");
    assert_eq!(deployment.revision, 3);
}

#[tokio::test]
async fn pause_resume_and_delete() {
    let t = setup().await;
    let (name, value) = user();

    t.server
        .put("/api/v1/deployments")
        .add_header(name.clone(), value.clone())
        .json(&spec_json("shop", "shop:1", 1))
        .await
        .assert_status_ok();

    let response = t
        .server
        .post("/api/v1/deployments/shop/pause")
        .add_header(name.clone(), value.clone())
        .await;
    let deployment: Deployment = response.json();
    assert!(deployment.paused);

    let response = t
        .server
        .post("/api/v1/deployments/shop/resume")
        .add_header(name.clone(), value.clone())
        .await;
    let deployment: Deployment = response.json();
    assert!(!deployment.paused);

    t.server
        .delete("/api/v1/deployments/shop")
        .add_header(name.clone(), value.clone())
        .await
        .assert_status_ok();

    let response = t
        .server
        .get("/api/v1/deployments/shop")
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    // Store agrees with the API view.
    assert!(t.store.get("shop").await.is_err());
}
