use crate::{error::ApiResult, identity::Identity, state::AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_cluster::{HealthState, Instance};
use steward_core::DeploymentSpec;
use steward_engine::{Deployment, DeploymentFilters, Rollout};

use crate::error::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/deployments",
            get(list_deployments).put(apply_deployment),
        )
        .route(
            "/api/v1/deployments/{app}",
            get(get_deployment).delete(delete_deployment),
        )
        .route("/api/v1/deployments/{app}/status", get(deployment_status))
        .route("/api/v1/deployments/{app}/pause", post(pause_deployment))
        .route("/api/v1/deployments/{app}/resume", post(resume_deployment))
        .route(
            "/api/v1/deployments/{app}/rollback",
            post(rollback_deployment),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    paused: Option<bool>,
    applied_by: Option<String>,
}

/// Desired state next to what the cluster is actually running.
#[derive(Debug, Serialize)]
pub struct DeploymentStatus {
    pub deployment: Deployment,
    pub rollout: Option<Rollout>,
    pub instances: Vec<Instance>,
    pub running: usize,
    pub healthy: usize,
    pub ready: bool,
    pub observed_at: Option<DateTime<Utc>>,
}

async fn apply_deployment(
    State(state): State<AppState>,
    axum::Extension(identity): axum::Extension<Identity>,
    Json(spec): Json<DeploymentSpec>,
) -> ApiResult<Json<Deployment>> {
    let deployment = state.store.apply(spec, &identity.username).await?;

    Ok(Json(deployment))
}

async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Deployment>>> {
    let filters = DeploymentFilters {
        paused: query.paused,
        applied_by: query.applied_by,
    };

    let deployments = state.store.list(filters).await?;

    Ok(Json(deployments))
}

async fn get_deployment(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<Json<Deployment>> {
    let deployment = state.store.get(&app).await?;

    Ok(Json(deployment))
}

async fn delete_deployment(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete(&app).await?;

    Ok(Json(serde_json::json!({ "message": "Deployment deleted" })))
}

async fn deployment_status(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<Json<DeploymentStatus>> {
    let deployment = state.store.get(&app).await?;
    let rollout = state.store.active_rollout(&app).await?;
    let snapshot = state.observer.latest().await;

    let (instances, observed_at) = match snapshot {
        Some(snapshot) => {
            let instances: Vec<Instance> =
                snapshot.app(&app).into_iter().cloned().collect();
            (instances, Some(snapshot.taken_at))
        }
        None => (Vec::new(), None),
    };

    let running = instances.iter().filter(|i| i.is_active()).count();
    let healthy = instances
        .iter()
        .filter(|i| i.is_active() && i.health == HealthState::Healthy)
        .count();
    let ready = rollout.is_none() && healthy >= deployment.replicas as usize;

    Ok(Json(DeploymentStatus {
        deployment,
        rollout,
        instances,
        running,
        healthy,
        ready,
        observed_at,
    }))
}

async fn pause_deployment(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<Json<Deployment>> {
    let deployment = state.store.set_paused(&app, true).await?;
    Ok(Json(deployment))
}

async fn resume_deployment(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<Json<Deployment>> {
    let deployment = state.store.set_paused(&app, false).await?;
    Ok(Json(deployment))
}

/// Re-apply the previous image as a fresh revision; the reconciler rolls
/// it out health-gated like any other change.
async fn rollback_deployment(
    State(state): State<AppState>,
    axum::Extension(identity): axum::Extension<Identity>,
    Path(app): Path<String>,
) -> ApiResult<Json<Deployment>> {
    let deployment = state.store.get(&app).await?;

    let previous = state.store.previous_image(&app).await?.ok_or_else(|| {
        ApiError::BadRequest(format!("No previous image recorded for {}", app))
    })?;

    let mut spec = deployment.spec();
    spec.image = previous.image;

    let deployment = state.store.apply(spec, &identity.username).await?;

    Ok(Json(deployment))
}
